//! Ambient traffic: seeded fleet generation and per-tick advance

use std::collections::HashMap;

use rand::Rng;

use crate::game::constants::*;
use crate::game::state::TrafficVehicle;
use crate::ws::protocol::TrafficClass;

/// Cruise speed for a traffic tier in km/h
pub fn tier_speed_kmh(class: TrafficClass) -> f32 {
    match class {
        TrafficClass::Car => TRAFFIC_FAST_KMH,
        TrafficClass::Motorbike => TRAFFIC_MEDIUM_KMH,
        TrafficClass::Slow => TRAFFIC_SLOW_KMH,
    }
}

/// Roll one vehicle class. Cars are the most common sight on the road,
/// slow three-wheelers the rarest.
fn roll_class<R: Rng>(rng: &mut R) -> TrafficClass {
    if rng.gen::<f32>() < 0.4 {
        TrafficClass::Car
    } else if rng.gen::<f32>() < 0.7 {
        TrafficClass::Motorbike
    } else {
        TrafficClass::Slow
    }
}

/// Generate a room's traffic fleet from a seeded RNG. Vehicles are
/// scattered across the three lanes and spread along the full track so
/// the road is busy from the first tick.
pub fn spawn_fleet<R: Rng>(rng: &mut R, count: usize) -> HashMap<u32, TrafficVehicle> {
    (0..count as u32)
        .map(|id| {
            let class = roll_class(rng);
            let lane = TRAFFIC_LANES[rng.gen_range(0..TRAFFIC_LANES.len())];
            let z = -(rng.gen::<f32>() * TRACK_LENGTH);
            let vehicle = TrafficVehicle {
                id,
                class,
                x: lane,
                y: 0.0,
                z,
                heading: 0.0,
                speed: tier_speed_kmh(class),
            };
            (id, vehicle)
        })
        .collect()
}

/// Advance every vehicle one tick down-track. A vehicle that passes the
/// finish line wraps back toward the start, keeping its overshoot.
pub fn advance(traffic: &mut HashMap<u32, TrafficVehicle>) {
    for v in traffic.values_mut() {
        v.z -= kmh_to_mps(v.speed) * TICK_DT;
        if v.z < -TRACK_LENGTH {
            v.z += TRACK_LENGTH;
        }
    }
}
