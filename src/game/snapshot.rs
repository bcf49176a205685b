//! Snapshot building for continuous state sync

use crate::game::state::RaceState;
use crate::ws::protocol::{PlayerSnapshot, ServerMsg, TrafficSnapshot};

/// Serialize the whole room into one wire snapshot.
///
/// The room broadcasts one of these after every mutation, so clients
/// always see fully applied state. Entries are sorted on stable keys to
/// keep the wire order steady across ticks.
pub fn build_snapshot(state: &RaceState) -> ServerMsg {
    let mut riders: Vec<_> = state.players.values().collect();
    riders.sort_by_key(|p| p.join_index);
    let players = riders
        .into_iter()
        .map(|p| PlayerSnapshot {
            session_id: p.session_id,
            x: p.x,
            y: p.y,
            z: p.z,
            heading: p.heading,
            speed: p.speed,
            balance: p.balance,
            finished: p.finished,
        })
        .collect();

    let mut vehicles: Vec<_> = state.traffic.values().collect();
    vehicles.sort_by_key(|v| v.id);
    let traffic = vehicles
        .into_iter()
        .map(|v| TrafficSnapshot {
            id: v.id,
            class: v.class,
            x: v.x,
            y: v.y,
            z: v.z,
            heading: v.heading,
            speed: v.speed,
        })
        .collect();

    ServerMsg::Snapshot {
        tick: state.tick,
        phase: state.phase,
        race_time: state.race_time,
        countdown: state.countdown,
        players,
        traffic,
    }
}
