//! Room allocation for connecting sessions

pub mod service;

pub use service::{JoinError, JoinOptions, JoinedRoom, LobbyService};
