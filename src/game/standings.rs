//! Final standings: finishers by time, the rest by distance covered

use std::cmp::Ordering;

use chrono::Utc;

use crate::game::state::RaceState;
use crate::ws::protocol::{RaceEndReason, RaceResults, StandingEntry};

/// Rank every rider at race end.
///
/// Finishers come first, ordered by finish time. Everyone still on the
/// road follows, ordered by how far down the track they made it (more
/// negative z is further along). Ties fall back to join order so the
/// ordering is total and deterministic.
pub fn build_results(state: &RaceState, reason: RaceEndReason) -> RaceResults {
    let mut riders: Vec<_> = state.players.values().collect();
    riders.sort_by(|a, b| {
        let primary = match (a.finished, b.finished) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => {
                let ta = a.finish_time.unwrap_or(f32::MAX);
                let tb = b.finish_time.unwrap_or(f32::MAX);
                ta.total_cmp(&tb)
            }
            (false, false) => a.z.total_cmp(&b.z),
        };
        primary.then_with(|| a.join_index.cmp(&b.join_index))
    });

    let standings = riders
        .iter()
        .enumerate()
        .map(|(i, p)| StandingEntry {
            rank: (i + 1) as u32,
            session_id: p.session_id,
            display_name: p.display_name.clone(),
            finished: p.finished,
            finish_time: p.finish_time,
            kicks_landed: p.kicks_landed,
            kicks_received: p.kicks_received,
        })
        .collect();

    RaceResults {
        duration_secs: state.race_time,
        total_players: riders.len() as u32,
        reason,
        finished_at: Utc::now(),
        standings,
    }
}
