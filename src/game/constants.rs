//! Shared race tunables, mirrored by the client build

/// Simulation tick rate in ticks per second
pub const TICK_RATE: u32 = 20;
/// Delta time per simulation tick in seconds
pub const TICK_DT: f32 = 1.0 / TICK_RATE as f32;

/// Top scooter speed in km/h at full throttle and full balance
pub const MAX_SPEED_KMH: f32 = 50.0;
/// Throttle floor; negative throttle brakes rather than reverses
pub const MIN_THROTTLE: f32 = -0.5;
/// Throttle ceiling
pub const MAX_THROTTLE: f32 = 1.0;
/// Blend factor pulling current speed toward target, applied once per input message
pub const SPEED_BLEND: f32 = 0.2;
/// Turn responsiveness at full steer, radians per second
pub const HANDLING: f32 = 0.8;
/// Heading change per input message at full steer
pub const STEER_STEP: f32 = HANDLING * TICK_DT;
/// Fraction of forward travel that bleeds into lateral drift while steering
pub const LATERAL_RESPONSE: f32 = 0.4;
/// Forward acceleration reference in units/s^2; the client force model uses this
#[allow(dead_code)]
pub const ACCELERATION: f32 = 10.0;

/// Balance riders spawn with
pub const BALANCE_START: f32 = 50.0;
/// Recovery stops once balance climbs back to this value
pub const BALANCE_BASELINE: f32 = 50.0;
/// Balance regained per second once the post-kick delay has passed
pub const BALANCE_RECOVERY: f32 = 10.0;
/// Seconds after taking a kick before balance starts recovering
pub const BALANCE_RECOVERY_DELAY: f32 = 3.0;

/// Balance lost by a kick target
pub const KICK_BALANCE_DAMAGE: f32 = 20.0;
/// Planar reach of a kick in meters
pub const KICK_RANGE: f32 = 5.0;
/// Backward shove applied to a kick target in meters
pub const KICK_PUSHBACK: f32 = 3.0;
/// Kick cooldown in seconds; enforced by the client, every kick edge resolves here
#[allow(dead_code)]
pub const KICK_COOLDOWN: f32 = 2.0;

/// Race distance from start line to finish line in meters
pub const TRACK_LENGTH: f32 = 2000.0;
/// Riders are clamped to x within this bound on either side of the center line
pub const TRACK_HALF_WIDTH: f32 = 12.0;
/// Spawn height of the scooter model
pub const SPAWN_Y: f32 = 2.0;
/// First lateral spawn offset from the center line
pub const SPAWN_LATERAL_BASE: f32 = 2.0;
/// Additional lateral offset per spawn pair
pub const SPAWN_LATERAL_STEP: f32 = 2.0;
/// Depth between consecutive spawn rows
pub const SPAWN_DEPTH_STEP: f32 = 3.0;

/// Riders required before the countdown arms
pub const MIN_PLAYERS: usize = 4;
/// Room occupancy cap
pub const MAX_PLAYERS: usize = 30;
/// Pre-race countdown length in seconds
pub const COUNTDOWN_SECS: u32 = 30;
/// Hard race cutoff in seconds
pub const RACE_DURATION_SECS: u64 = 180;

/// Ambient vehicles per room
pub const TRAFFIC_COUNT: usize = 50;
/// Traffic lane center lines (x)
pub const TRAFFIC_LANES: [f32; 3] = [-6.0, 0.0, 6.0];
/// Slow traffic tier speed in km/h
pub const TRAFFIC_SLOW_KMH: f32 = 15.0;
/// Medium traffic tier speed in km/h
pub const TRAFFIC_MEDIUM_KMH: f32 = 25.0;
/// Fast traffic tier speed in km/h
pub const TRAFFIC_FAST_KMH: f32 = 35.0;

/// Convert a km/h speed to m/s for displacement math
#[inline]
pub fn kmh_to_mps(kmh: f32) -> f32 {
    kmh / 3.6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_timing_is_consistent() {
        assert_eq!(TICK_RATE, 20);
        assert!((TICK_DT - 0.05).abs() < f32::EPSILON);
    }

    #[test]
    fn throttle_bounds_allow_braking_but_cap_forward() {
        assert!(MIN_THROTTLE < 0.0);
        assert!(MIN_THROTTLE > -1.0);
        assert_eq!(MAX_THROTTLE, 1.0);
    }

    #[test]
    fn traffic_tiers_are_ordered_and_slower_than_riders() {
        assert!(TRAFFIC_SLOW_KMH < TRAFFIC_MEDIUM_KMH);
        assert!(TRAFFIC_MEDIUM_KMH < TRAFFIC_FAST_KMH);
        assert!(TRAFFIC_FAST_KMH < MAX_SPEED_KMH);
    }

    #[test]
    fn kmh_conversion_matches_known_value() {
        // 36 km/h is exactly 10 m/s
        assert!((kmh_to_mps(36.0) - 10.0).abs() < 0.0001);
    }
}
