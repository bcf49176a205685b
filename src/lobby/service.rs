//! Lobby service - resolves connecting sessions into rooms

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use uuid::Uuid;

use crate::game::room::{generate_room_code, RaceRoom, RoomConfig, RoomHandle, RoomRegistry};
use crate::game::PlayerInput;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, RoomPhase, ServerMsg};

/// How a session wants to enter a room
#[derive(Debug, Clone, Default)]
pub struct JoinOptions {
    pub display_name: Option<String>,
    /// Create a fresh code-gated room instead of public matchmaking
    pub private: bool,
    /// Join the room with this code instead of public matchmaking
    pub code: Option<String>,
}

/// Channels a joined session talks to its room through
pub struct JoinedRoom {
    pub room_id: Uuid,
    pub room_code: Option<String>,
    pub event_tx: mpsc::Sender<PlayerInput>,
    pub broadcast_rx: broadcast::Receiver<ServerMsg>,
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("room is full")]
    RoomFull,
    #[error("no room with that code")]
    RoomNotFound,
    #[error("the race in that room is already over")]
    RaceOver,
    #[error("the room shut down while joining")]
    RoomClosed,
}

impl JoinError {
    /// Stable machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            JoinError::RoomFull => "room_full",
            JoinError::RoomNotFound => "room_not_found",
            JoinError::RaceOver => "race_over",
            JoinError::RoomClosed => "room_closed",
        }
    }
}

/// Join-or-create room allocation. Capacity and phase checks here are
/// advisory reads of the room's published counters; the room task makes
/// the authoritative call when the join event lands.
pub struct LobbyService {
    registry: Arc<RoomRegistry>,
    config: RoomConfig,
}

impl LobbyService {
    pub fn new(registry: Arc<RoomRegistry>, config: RoomConfig) -> Self {
        Self { registry, config }
    }

    /// Resolve a session into a room and forward its join event
    pub async fn join(&self, session_id: Uuid, opts: JoinOptions) -> Result<JoinedRoom, JoinError> {
        let handle = self.resolve_room(&opts)?;

        // Subscribe before sending the join so the roster reply cannot
        // slip past this session
        let broadcast_rx = handle.broadcast_tx.subscribe();

        let join = PlayerInput {
            session_id,
            msg: ClientMsg::Join {
                display_name: opts.display_name,
            },
            received_at: unix_millis(),
        };
        handle
            .event_tx
            .send(join)
            .await
            .map_err(|_| JoinError::RoomClosed)?;

        info!(
            session_id = %session_id,
            room_id = %handle.id,
            "Session routed to room"
        );

        Ok(JoinedRoom {
            room_id: handle.id,
            room_code: handle.code.clone(),
            event_tx: handle.event_tx.clone(),
            broadcast_rx,
        })
    }

    fn resolve_room(&self, opts: &JoinOptions) -> Result<RoomHandle, JoinError> {
        if let Some(code) = &opts.code {
            let code = code.trim().to_ascii_uppercase();
            let handle = self
                .registry
                .get_by_code(&code)
                .ok_or(JoinError::RoomNotFound)?;
            if handle.phase() == RoomPhase::Finished {
                return Err(JoinError::RaceOver);
            }
            if handle.player_count() >= handle.max_players {
                return Err(JoinError::RoomFull);
            }
            return Ok(handle);
        }

        if opts.private {
            return Ok(self.create_room(true));
        }

        match self.registry.find_open_public() {
            Some(handle) => Ok(handle),
            None => Ok(self.create_room(false)),
        }
    }

    /// Spawn a new room task, register it, and supervise its exit
    fn create_room(&self, private: bool) -> RoomHandle {
        let room_id = Uuid::new_v4();
        let seed = rand::random::<u64>();
        let code = private.then(|| self.unique_code());

        let (room, handle) = RaceRoom::new(room_id, seed, code, self.config.clone());
        self.registry.insert(handle.clone());

        info!(room_id = %room_id, code = ?handle.code, "Created new room");

        let registry = self.registry.clone();
        let task = tokio::spawn(room.run());
        tokio::spawn(async move {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(room_id = %room_id, "Room task panicked");
                }
            }
            registry.remove(&room_id);
            info!(room_id = %room_id, "Room removed from registry");
        });

        handle
    }

    fn unique_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code = generate_room_code(&mut rng);
            if self.registry.get_by_code(&code).is_none() {
                return code;
            }
        }
    }
}
