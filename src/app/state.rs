//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::RoomRegistry;
use crate::lobby::LobbyService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomRegistry>,
    pub lobby: Arc<LobbyService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Initialize room registry
        let rooms = Arc::new(RoomRegistry::new());

        // Initialize the lobby (Arc for sharing across cloned AppState)
        let lobby = Arc::new(LobbyService::new(rooms.clone(), config.room_config()));

        Self {
            config,
            rooms,
            lobby,
        }
    }
}
