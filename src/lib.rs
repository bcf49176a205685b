//! Scooter Rush Server - authoritative multiplayer race server
//!
//! Rooms run the whole simulation server-side: riders steer by sending
//! inputs, the server integrates movement, resolves kicks, drives the
//! ambient traffic, and broadcasts snapshots every change. Clients
//! render and predict; they never decide.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod util;
pub mod ws;
