//! Authoritative room state: riders, traffic, and race bookkeeping

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::game::constants::*;
use crate::game::traffic;
use crate::ws::protocol::{RoomPhase, TrafficClass};

/// Longest display name the server will store
const MAX_NAME_LEN: usize = 32;

/// One rider in the race
#[derive(Debug, Clone)]
pub struct Player {
    pub session_id: Uuid,
    pub display_name: String,
    /// Zero-based arrival order, drives the spawn slot and tie-breaks standings
    pub join_index: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Heading in radians, zero faces down-track
    pub heading: f32,
    /// Current speed in km/h
    pub speed: f32,
    /// Ride stability in [0, 100]; scales attainable speed
    pub balance: f32,
    pub kicks_landed: u32,
    pub kicks_received: u32,
    pub finished: bool,
    /// Race clock at the moment the finish line was crossed, in seconds
    pub finish_time: Option<f32>,
    /// Race clock when this rider last took a kick; gates balance recovery
    pub last_kicked_at: Option<f32>,
}

impl Player {
    pub fn new(session_id: Uuid, display_name: String, join_index: u32) -> Self {
        let (x, z) = spawn_slot(join_index);
        Self {
            session_id,
            display_name,
            join_index,
            x,
            y: SPAWN_Y,
            z,
            heading: 0.0,
            speed: 0.0,
            balance: BALANCE_START,
            kicks_landed: 0,
            kicks_received: 0,
            finished: false,
            finish_time: None,
            last_kicked_at: None,
        }
    }
}

/// Staggered grid slot for the n-th rider to join.
///
/// Slots alternate right/left of the center line and widen every pair,
/// with each rider one row behind the previous one.
fn spawn_slot(join_index: u32) -> (f32, f32) {
    let side = if join_index % 2 == 0 { 1.0 } else { -1.0 };
    let x = side * (SPAWN_LATERAL_BASE + (join_index / 2) as f32 * SPAWN_LATERAL_STEP);
    let z = -(join_index as f32) * SPAWN_DEPTH_STEP;
    (x, z)
}

/// One ambient traffic vehicle
#[derive(Debug, Clone)]
pub struct TrafficVehicle {
    pub id: u32,
    pub class: TrafficClass,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Always faces down-track
    pub heading: f32,
    /// Constant cruise speed in km/h
    pub speed: f32,
}

/// Everything the room simulates, owned by a single task
#[derive(Debug)]
pub struct RaceState {
    pub phase: RoomPhase,
    pub players: HashMap<Uuid, Player>,
    pub traffic: HashMap<u32, TrafficVehicle>,
    /// Simulation ticks elapsed since the race started
    pub tick: u64,
    /// Seconds left on the pre-race countdown
    pub countdown: u32,
    /// Seconds since the race started; frozen once the race ends
    pub race_time: f32,
    /// Join code for private rooms, fixed at creation
    pub room_code: Option<String>,
    /// Seed the traffic fleet was generated from
    pub seed: u64,
    next_join_index: u32,
}

impl RaceState {
    pub fn new(seed: u64, room_code: Option<String>, traffic_count: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self {
            phase: RoomPhase::Waiting,
            players: HashMap::new(),
            traffic: traffic::spawn_fleet(&mut rng, traffic_count),
            tick: 0,
            countdown: COUNTDOWN_SECS,
            race_time: 0.0,
            room_code,
            seed,
            next_join_index: 0,
        }
    }

    /// Admit a rider at the next spawn slot. Callers must reject
    /// duplicates and full rooms first.
    pub fn add_player(&mut self, session_id: Uuid, display_name: Option<String>) -> &Player {
        let join_index = self.next_join_index;
        self.next_join_index += 1;
        let name = display_name
            .map(|n| n.trim().chars().take(MAX_NAME_LEN).collect::<String>())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Player {}", join_index + 1));
        self.players
            .entry(session_id)
            .or_insert_with(|| Player::new(session_id, name, join_index))
    }

    /// True only when the room has riders and every one has finished.
    /// An empty room never counts as finished.
    pub fn all_finished(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.finished)
    }
}
