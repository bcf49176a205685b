//! Kick resolution - reach checks, balance damage, pushback

use std::collections::HashMap;

use uuid::Uuid;

use crate::game::constants::*;
use crate::game::state::Player;

/// One landed kick, resolved against a single target
#[derive(Debug, Clone, Copy)]
pub struct KickHit {
    pub kicker_id: Uuid,
    pub target_id: Uuid,
}

/// Kick system for resolving melee shoves between riders
pub struct KickSystem;

impl KickSystem {
    /// Check whether a target is within kick reach of the kicker.
    /// Reach is measured in the track plane only.
    pub fn in_range(kicker: &Player, target: &Player) -> bool {
        let dx = kicker.x - target.x;
        let dz = kicker.z - target.z;
        let dist_sq = dx * dx + dz * dz;
        dist_sq <= KICK_RANGE * KICK_RANGE
    }

    /// Find every rider the kicker connects with. A kick has no aim, it
    /// hits everyone in reach at once; only distance decides.
    pub fn resolve(kicker_id: Uuid, players: &HashMap<Uuid, Player>) -> Vec<KickHit> {
        let Some(kicker) = players.get(&kicker_id) else {
            return Vec::new();
        };
        let mut hits = Vec::new();
        for target in players.values() {
            if target.session_id == kicker_id {
                continue;
            }
            if Self::in_range(kicker, target) {
                hits.push(KickHit {
                    kicker_id,
                    target_id: target.session_id,
                });
            }
        }
        hits
    }

    /// Apply one landed kick to the target: balance damage plus a
    /// backward shove, stamped with the race clock for recovery gating.
    pub fn apply_kick(target: &mut Player, race_time: f32) {
        target.balance = (target.balance - KICK_BALANCE_DAMAGE).max(0.0);
        target.z += KICK_PUSHBACK;
        target.kicks_received += 1;
        target.last_kicked_at = Some(race_time);
    }
}
