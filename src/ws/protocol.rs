//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Room lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    /// Collecting riders until the start threshold is met
    Waiting,
    /// Pre-race countdown is running
    Starting,
    /// Simulation is live
    Racing,
    /// Terminal; standings have been broadcast
    Finished,
}

impl RoomPhase {
    /// Encoding for the lock-free phase mirror on room handles
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Starting => 1,
            Self::Racing => 2,
            Self::Finished => 3,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Waiting,
            1 => Self::Starting,
            2 => Self::Racing,
            _ => Self::Finished,
        }
    }
}

/// Ambient traffic tiers, fastest to slowest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficClass {
    /// Fast lane hog
    Car,
    /// Weaves at medium pace
    Motorbike,
    /// Slow three-wheeler
    Slow,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Request to join the room; the session layer synthesizes this from
    /// the connection query, a duplicate from the client is ignored
    Join {
        /// Preferred display name, defaulted server-side when absent
        display_name: Option<String>,
    },

    /// Rider input, applied the moment it arrives
    Input {
        /// Throttle input (negative = brake, 1.0 = full forward)
        throttle: f32,
        /// Steering input (-1.0 = full left, 1.0 = full right)
        steering: f32,
        /// Kick everyone in reach this message
        kick: bool,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the room
    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        session_id: Uuid,
        server_time: u64,
    },

    /// Confirmation of room admission
    RoomJoined {
        room_id: Uuid,
        /// Join code when the room is private
        room_code: Option<String>,
        /// All riders in the room at join time
        players: Vec<PlayerInfo>,
    },

    /// Rider joined the room
    PlayerJoined {
        player: PlayerInfo,
    },

    /// Rider left the room
    PlayerLeft {
        session_id: Uuid,
    },

    /// Pre-race countdown has begun
    CountdownStarted {
        seconds: u32,
    },

    /// The race is live
    RaceStarted {
        tick: u64,
    },

    /// Room state snapshot, sent after every mutation
    Snapshot {
        /// Server tick number
        tick: u64,
        phase: RoomPhase,
        /// Seconds since the race started
        race_time: f32,
        /// Seconds left on the countdown
        countdown: u32,
        players: Vec<PlayerSnapshot>,
        traffic: Vec<TrafficSnapshot>,
    },

    /// The race is over; carries the final standings
    RaceFinished {
        results: RaceResults,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Rider identity for rosters and join broadcasts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub session_id: Uuid,
    pub display_name: String,
}

/// Rider state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub session_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Heading in radians
    pub heading: f32,
    /// Speed in km/h
    pub speed: f32,
    /// Ride stability (0-100)
    pub balance: f32,
    pub finished: bool,
}

/// Traffic vehicle state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficSnapshot {
    pub id: u32,
    pub class: TrafficClass,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub heading: f32,
    /// Cruise speed in km/h
    pub speed: f32,
}

/// Why the race ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceEndReason {
    /// Every rider crossed the finish line
    AllFinished,
    /// The max-duration cutoff fired
    TimeLimit,
}

/// Final race report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResults {
    /// Race clock at the end, in seconds
    pub duration_secs: f32,
    pub total_players: u32,
    pub reason: RaceEndReason,
    pub finished_at: DateTime<Utc>,
    /// Best rank first
    pub standings: Vec<StandingEntry>,
}

/// One rider's final placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingEntry {
    pub rank: u32,
    pub session_id: Uuid,
    pub display_name: String,
    pub finished: bool,
    /// Race clock at the finish line, absent for riders who never finished
    pub finish_time: Option<f32>,
    pub kicks_landed: u32,
    pub kicks_received: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_message_parses_from_client_json() {
        let json = r#"{"type":"input","throttle":0.8,"steering":-0.25,"kick":true}"#;
        let msg: ClientMsg = serde_json::from_str(json).unwrap();
        match msg {
            ClientMsg::Input { throttle, steering, kick } => {
                assert_eq!(throttle, 0.8);
                assert_eq!(steering, -0.25);
                assert!(kick);
            }
            other => panic!("parsed wrong variant: {other:?}"),
        }
    }

    #[test]
    fn phases_and_classes_use_snake_case_wire_names() {
        assert_eq!(serde_json::to_value(RoomPhase::Waiting).unwrap(), "waiting");
        assert_eq!(serde_json::to_value(RoomPhase::Starting).unwrap(), "starting");
        assert_eq!(serde_json::to_value(TrafficClass::Motorbike).unwrap(), "motorbike");
        assert_eq!(serde_json::to_value(TrafficClass::Slow).unwrap(), "slow");
        assert_eq!(
            serde_json::to_value(RaceEndReason::AllFinished).unwrap(),
            "all_finished"
        );
    }

    #[test]
    fn server_messages_carry_a_type_tag() {
        let msg = ServerMsg::CountdownStarted { seconds: 30 };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "countdown_started");
        assert_eq!(value["seconds"], 30);
    }

    #[test]
    fn phase_round_trips_through_the_atomic_encoding() {
        for phase in [
            RoomPhase::Waiting,
            RoomPhase::Starting,
            RoomPhase::Racing,
            RoomPhase::Finished,
        ] {
            assert_eq!(RoomPhase::from_u8(phase.as_u8()), phase);
        }
    }
}
