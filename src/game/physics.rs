//! Scooter movement model, applied per input message at point of arrival

use crate::game::constants::*;
use crate::game::state::Player;

/// Physics system for advancing riders
pub struct ScooterPhysics;

impl ScooterPhysics {
    /// Advance one rider by a single input message.
    ///
    /// Each message is worth one tick of movement: speed blends toward
    /// the throttle target, heading turns by the steer step, and the
    /// rider travels along the new heading. Balance scales the
    /// attainable top speed, so a shaky rider cannot hold full pace.
    pub fn apply_input(player: &mut Player, throttle: f32, steering: f32) {
        // Clamp inputs
        let throttle = throttle.clamp(MIN_THROTTLE, MAX_THROTTLE);
        let steering = steering.clamp(-1.0, 1.0);

        // Blend speed toward the balance-scaled target
        let target = throttle * MAX_SPEED_KMH * (player.balance / 100.0);
        player.speed =
            (player.speed + (target - player.speed) * SPEED_BLEND).clamp(0.0, MAX_SPEED_KMH);

        // Update heading
        player.heading =
            (player.heading + steering * STEER_STEP).rem_euclid(std::f32::consts::TAU);

        // Update position; forward is -z, drift bleeds into x while steering
        let travel = kmh_to_mps(player.speed) * TICK_DT;
        player.z -= travel * player.heading.cos();
        player.x += travel * LATERAL_RESPONSE * player.heading.sin() * steering;
        player.x = player.x.clamp(-TRACK_HALF_WIDTH, TRACK_HALF_WIDTH);
    }

    /// Tick balance back toward the baseline once the post-kick delay
    /// has passed. Runs on every simulation tick while racing.
    pub fn recover_balance(player: &mut Player, race_time: f32) {
        if player.balance >= BALANCE_BASELINE {
            return;
        }
        let ready = match player.last_kicked_at {
            Some(at) => race_time - at >= BALANCE_RECOVERY_DELAY,
            None => true,
        };
        if ready {
            player.balance = (player.balance + BALANCE_RECOVERY * TICK_DT).min(BALANCE_BASELINE);
        }
    }
}
