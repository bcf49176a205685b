//! Race simulation modules

pub mod constants;
pub mod kick;
pub mod physics;
pub mod room;
pub mod snapshot;
pub mod standings;
pub mod state;
pub mod traffic;

pub use room::{RaceRoom, RoomConfig, RoomHandle, RoomRegistry};
pub use state::{Player, RaceState, TrafficVehicle};

use crate::ws::protocol::ClientMsg;
use uuid::Uuid;

/// Player message received from a WebSocket session, stamped on arrival
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub session_id: Uuid,
    pub msg: ClientMsg,
    pub received_at: u64,
}
