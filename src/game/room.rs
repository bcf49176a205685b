//! Race room state machine and authoritative event loop

use std::future::pending;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::constants::*;
use crate::game::kick::KickSystem;
use crate::game::physics::ScooterPhysics;
use crate::game::snapshot::build_snapshot;
use crate::game::standings;
use crate::game::state::RaceState;
use crate::game::traffic;
use crate::ws::protocol::{ClientMsg, PlayerInfo, RaceEndReason, RoomPhase, ServerMsg};

use super::PlayerInput;

/// Characters a join code is drawn from
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Join code length
pub const ROOM_CODE_LEN: usize = 6;

/// Generate a join code for a private room
pub fn generate_room_code<R: Rng>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Tunables a room is created with. Defaults mirror the shared
/// constants; tests and env overrides adjust them per room.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub min_players: usize,
    pub max_players: usize,
    pub countdown_secs: u32,
    pub tick_rate: u32,
    pub race_duration: Duration,
    pub traffic_count: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_players: MIN_PLAYERS,
            max_players: MAX_PLAYERS,
            countdown_secs: COUNTDOWN_SECS,
            tick_rate: TICK_RATE,
            race_duration: Duration::from_secs(RACE_DURATION_SECS),
            traffic_count: TRAFFIC_COUNT,
        }
    }
}

impl RoomConfig {
    fn tick_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_rate as u64)
    }
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Uuid,
    /// Join code when the room is private
    pub code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub max_players: usize,
    pub event_tx: mpsc::Sender<PlayerInput>,
    pub broadcast_tx: broadcast::Sender<ServerMsg>,
    pub player_count: Arc<AtomicUsize>,
    phase: Arc<AtomicU8>,
}

impl RoomHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> RoomPhase {
        RoomPhase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    /// True when the room can still admit a rider
    pub fn is_open(&self) -> bool {
        self.phase() != RoomPhase::Finished && self.player_count() < self.max_players
    }
}

/// Registry of all active rooms
pub struct RoomRegistry {
    rooms: DashMap<Uuid, RoomHandle>,
    codes: DashMap<String, Uuid>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            codes: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    pub fn get_by_code(&self, code: &str) -> Option<RoomHandle> {
        let id = self.codes.get(code).map(|entry| *entry.value())?;
        self.get(&id)
    }

    pub fn insert(&self, handle: RoomHandle) {
        if let Some(code) = &handle.code {
            self.codes.insert(code.clone(), handle.id);
        }
        self.rooms.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<RoomHandle> {
        let handle = self.rooms.remove(id).map(|(_, h)| h);
        if let Some(h) = &handle {
            if let Some(code) = &h.code {
                self.codes.remove(code);
            }
        }
        handle
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    /// First public room that can still admit a rider
    pub fn find_open_public(&self) -> Option<RoomHandle> {
        self.rooms
            .iter()
            .find(|r| r.value().code.is_none() && r.value().is_open())
            .map(|r| r.value().clone())
    }

    pub fn list(&self) -> Vec<RoomHandle> {
        self.rooms.iter().map(|r| r.value().clone()).collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Timers owned by the room task. Phase transitions arm and disarm
/// them; disposal clears them all, so a dead room can never fire a
/// stale timer.
struct RoomTimers {
    tick: Option<Interval>,
    countdown: Option<Interval>,
    cutoff: Option<Pin<Box<Sleep>>>,
}

impl RoomTimers {
    fn idle() -> Self {
        Self {
            tick: None,
            countdown: None,
            cutoff: None,
        }
    }

    fn clear(&mut self) {
        self.tick = None;
        self.countdown = None;
        self.cutoff = None;
    }
}

/// Await the next firing of an optional interval; pends forever while
/// the timer is unarmed so its select branch never wins.
async fn interval_fired(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

/// Await an optional one-shot sleep; pends forever while unarmed.
async fn sleep_elapsed(sleep: Option<&mut Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

/// What woke the room loop
enum Wake {
    Event(Option<PlayerInput>),
    Tick,
    Countdown,
    Cutoff,
}

/// The authoritative race room. Owns its state outright; every
/// mutation goes through the task loop in `run`.
pub struct RaceRoom {
    id: Uuid,
    config: RoomConfig,
    state: RaceState,
    events_rx: mpsc::Receiver<PlayerInput>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    timers: RoomTimers,
    /// Monotonic anchor for the race clock
    race_started_at: Option<Instant>,
    player_count: Arc<AtomicUsize>,
    phase_mirror: Arc<AtomicU8>,
    ever_joined: bool,
    disposed: bool,
    results_sent: bool,
}

impl RaceRoom {
    /// Create a new room and its shared handle
    pub fn new(id: Uuid, seed: u64, code: Option<String>, config: RoomConfig) -> (Self, RoomHandle) {
        let (event_tx, events_rx) = mpsc::channel(256);
        let (broadcast_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));
        let phase = Arc::new(AtomicU8::new(RoomPhase::Waiting.as_u8()));

        let handle = RoomHandle {
            id,
            code: code.clone(),
            created_at: Utc::now(),
            max_players: config.max_players,
            event_tx,
            broadcast_tx: broadcast_tx.clone(),
            player_count: player_count.clone(),
            phase: phase.clone(),
        };

        let room = Self {
            id,
            state: RaceState::new(seed, code, config.traffic_count),
            config,
            events_rx,
            broadcast_tx,
            timers: RoomTimers::idle(),
            race_started_at: None,
            player_count,
            phase_mirror: phase,
            ever_joined: false,
            disposed: false,
            results_sent: false,
        };

        (room, handle)
    }

    /// Run the room until it disposes itself. Every event is applied at
    /// the moment it arrives; the timers drive everything time-based.
    pub async fn run(mut self) {
        info!(room_id = %self.id, seed = self.state.seed, "Room task running");

        loop {
            let wake = tokio::select! {
                event = self.events_rx.recv() => Wake::Event(event),
                _ = interval_fired(self.timers.tick.as_mut()) => Wake::Tick,
                _ = interval_fired(self.timers.countdown.as_mut()) => Wake::Countdown,
                _ = sleep_elapsed(self.timers.cutoff.as_mut()) => Wake::Cutoff,
            };

            match wake {
                Wake::Event(Some(event)) => self.handle_event(event),
                Wake::Event(None) => {
                    info!(room_id = %self.id, "Event channel closed, shutting down room");
                    break;
                }
                Wake::Tick => self.on_tick(),
                Wake::Countdown => self.on_countdown(),
                Wake::Cutoff => self.on_cutoff(),
            }

            if self.disposed {
                break;
            }
        }

        info!(room_id = %self.id, "Room task exited");
    }

    fn handle_event(&mut self, event: PlayerInput) {
        match event.msg {
            ClientMsg::Join { display_name } => self.handle_join(event.session_id, display_name),
            ClientMsg::Input {
                throttle,
                steering,
                kick,
            } => self.handle_input(event.session_id, throttle, steering, kick),
            ClientMsg::Ping { t } => {
                let _ = self.broadcast_tx.send(ServerMsg::Pong { t });
            }
            ClientMsg::Leave => self.handle_leave(event.session_id),
        }
    }

    /// Admit a rider, broadcast the roster, and arm the countdown when
    /// the start threshold is first reached.
    fn handle_join(&mut self, session_id: Uuid, display_name: Option<String>) {
        if self.state.phase == RoomPhase::Finished {
            warn!(room_id = %self.id, session_id = %session_id, "Join after race end ignored");
            return;
        }
        if self.state.players.contains_key(&session_id) {
            warn!(room_id = %self.id, session_id = %session_id, "Player already in room");
            return;
        }
        if self.state.players.len() >= self.config.max_players {
            let _ = self.broadcast_tx.send(ServerMsg::Error {
                code: "room_full".to_string(),
                message: "Room is full".to_string(),
            });
            return;
        }

        let player = self.state.add_player(session_id, display_name);
        let info = PlayerInfo {
            session_id: player.session_id,
            display_name: player.display_name.clone(),
        };
        self.ever_joined = true;
        self.sync_player_count();

        let _ = self.broadcast_tx.send(ServerMsg::PlayerJoined { player: info });

        let mut roster: Vec<_> = self.state.players.values().collect();
        roster.sort_by_key(|p| p.join_index);
        let players = roster
            .into_iter()
            .map(|p| PlayerInfo {
                session_id: p.session_id,
                display_name: p.display_name.clone(),
            })
            .collect();
        let _ = self.broadcast_tx.send(ServerMsg::RoomJoined {
            room_id: self.id,
            room_code: self.state.room_code.clone(),
            players,
        });

        info!(
            room_id = %self.id,
            session_id = %session_id,
            player_count = self.state.players.len(),
            "Player joined room"
        );

        if self.state.phase == RoomPhase::Waiting
            && self.state.players.len() >= self.config.min_players
        {
            self.begin_countdown();
        }

        self.broadcast_snapshot();
    }

    /// Apply rider input the moment it arrives. Unknown sessions and
    /// finished riders are silent no-ops; a leave can race an in-flight
    /// input and that is expected.
    fn handle_input(&mut self, session_id: Uuid, throttle: f32, steering: f32, kick: bool) {
        let Some(player) = self.state.players.get_mut(&session_id) else {
            return;
        };
        if player.finished {
            return;
        }

        ScooterPhysics::apply_input(player, throttle, steering);

        if kick {
            let race_time = self.state.race_time;
            let hits = KickSystem::resolve(session_id, &self.state.players);
            for hit in &hits {
                if let Some(target) = self.state.players.get_mut(&hit.target_id) {
                    KickSystem::apply_kick(target, race_time);
                }
            }
            if !hits.is_empty() {
                if let Some(kicker) = self.state.players.get_mut(&session_id) {
                    kicker.kicks_landed += hits.len() as u32;
                }
                debug!(
                    room_id = %self.id,
                    kicker = %session_id,
                    targets = hits.len(),
                    "Kick landed"
                );
            }
        }

        self.broadcast_snapshot();
    }

    /// Remove a rider. The all-finished check re-runs because the
    /// departing rider may have been the last unfinished one; the last
    /// departure disposes the room.
    fn handle_leave(&mut self, session_id: Uuid) {
        if self.state.players.remove(&session_id).is_none() {
            return;
        }
        self.sync_player_count();

        let _ = self.broadcast_tx.send(ServerMsg::PlayerLeft { session_id });
        info!(
            room_id = %self.id,
            session_id = %session_id,
            player_count = self.state.players.len(),
            "Player left room"
        );

        if self.state.phase == RoomPhase::Racing && self.state.all_finished() {
            self.end_race(RaceEndReason::AllFinished);
        }

        if self.ever_joined && self.state.players.is_empty() {
            self.dispose("last player left");
            return;
        }

        self.broadcast_snapshot();
    }

    /// Waiting -> Starting. Runs once; later joins never re-arm it and
    /// dropping below the threshold never reverses it.
    fn begin_countdown(&mut self) {
        self.set_phase(RoomPhase::Starting);
        self.state.countdown = self.config.countdown_secs;

        let period = Duration::from_secs(1);
        let mut countdown = interval_at(Instant::now() + period, period);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timers.countdown = Some(countdown);

        let _ = self.broadcast_tx.send(ServerMsg::CountdownStarted {
            seconds: self.state.countdown,
        });
        info!(room_id = %self.id, seconds = self.state.countdown, "Countdown started");
    }

    fn on_countdown(&mut self) {
        self.state.countdown = self.state.countdown.saturating_sub(1);
        if self.state.countdown == 0 {
            self.start_race();
        } else {
            self.broadcast_snapshot();
        }
    }

    /// Starting -> Racing. Arms the simulation tick and the
    /// max-duration cutoff.
    fn start_race(&mut self) {
        self.timers.countdown = None;
        self.set_phase(RoomPhase::Racing);
        self.race_started_at = Some(Instant::now());
        self.state.race_time = 0.0;

        let period = self.config.tick_period();
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timers.tick = Some(tick);
        self.timers.cutoff = Some(Box::pin(tokio::time::sleep(self.config.race_duration)));

        let _ = self.broadcast_tx.send(ServerMsg::RaceStarted {
            tick: self.state.tick,
        });
        info!(
            room_id = %self.id,
            players = self.state.players.len(),
            "Race started"
        );
        self.broadcast_snapshot();
    }

    /// One simulation tick: advance the race clock and traffic, recover
    /// balance, detect finishers, and end the race once everyone is in.
    fn on_tick(&mut self) {
        if self.state.phase != RoomPhase::Racing {
            return;
        }

        self.state.tick += 1;
        if let Some(started) = self.race_started_at {
            self.state.race_time = started.elapsed().as_secs_f32();
        }

        traffic::advance(&mut self.state.traffic);

        let race_time = self.state.race_time;
        for player in self.state.players.values_mut() {
            ScooterPhysics::recover_balance(player, race_time);
        }

        self.detect_finishes();

        if self.state.all_finished() {
            self.end_race(RaceEndReason::AllFinished);
            return;
        }

        self.broadcast_snapshot();
    }

    fn detect_finishes(&mut self) {
        let race_time = self.state.race_time;
        for player in self.state.players.values_mut() {
            if !player.finished && player.z <= -TRACK_LENGTH {
                player.finished = true;
                player.finish_time = Some(race_time);
                info!(
                    room_id = %self.id,
                    session_id = %player.session_id,
                    finish_time = race_time,
                    "Rider crossed the finish line"
                );
            }
        }
    }

    fn on_cutoff(&mut self) {
        // Disarm first; a completed sleep must never be polled again
        self.timers.cutoff = None;
        if self.state.phase != RoomPhase::Racing {
            return;
        }

        if let Some(started) = self.race_started_at {
            self.state.race_time = started.elapsed().as_secs_f32();
        }
        info!(room_id = %self.id, "Race hit the time limit");
        self.end_race(RaceEndReason::TimeLimit);
    }

    /// Racing -> Finished. Disarms every timer and broadcasts the final
    /// standings exactly once.
    fn end_race(&mut self, reason: RaceEndReason) {
        if self.state.phase == RoomPhase::Finished {
            return;
        }
        self.timers.clear();
        self.set_phase(RoomPhase::Finished);

        let results = standings::build_results(&self.state, reason);
        info!(
            room_id = %self.id,
            reason = ?reason,
            duration_secs = results.duration_secs,
            players = results.total_players,
            "Race finished"
        );

        self.broadcast_snapshot();
        if !self.results_sent {
            self.results_sent = true;
            let _ = self.broadcast_tx.send(ServerMsg::RaceFinished { results });
        }
    }

    fn dispose(&mut self, reason: &str) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.timers.clear();
        info!(room_id = %self.id, reason, "Room disposed");
    }

    fn set_phase(&mut self, phase: RoomPhase) {
        self.state.phase = phase;
        self.phase_mirror.store(phase.as_u8(), Ordering::Relaxed);
    }

    fn sync_player_count(&self) {
        self.player_count
            .store(self.state.players.len(), Ordering::Relaxed);
    }

    fn broadcast_snapshot(&self) {
        let _ = self.broadcast_tx.send(build_snapshot(&self.state));
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn test_config() -> RoomConfig {
        RoomConfig {
            min_players: 2,
            max_players: 3,
            countdown_secs: 3,
            traffic_count: 5,
            ..Default::default()
        }
    }

    fn new_room() -> (RaceRoom, RoomHandle) {
        RaceRoom::new(Uuid::new_v4(), 7, None, test_config())
    }

    fn join(room: &mut RaceRoom, session_id: Uuid) {
        room.handle_join(session_id, None);
    }

    /// Drive a fresh room to Racing with two riders
    fn racing_room() -> (RaceRoom, RoomHandle, Uuid, Uuid) {
        let (mut room, handle) = new_room();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        join(&mut room, a);
        join(&mut room, b);
        for _ in 0..3 {
            room.on_countdown();
        }
        assert_eq!(room.state.phase, RoomPhase::Racing);
        (room, handle, a, b)
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut msgs = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    #[test]
    fn room_codes_are_six_uppercase_alphanumerics() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            let code = generate_room_code(&mut rng);
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn tick_period_follows_the_configured_rate() {
        assert_eq!(
            RoomConfig::default().tick_period(),
            Duration::from_millis(50)
        );
        let doubled = RoomConfig {
            tick_rate: 40,
            ..Default::default()
        };
        assert_eq!(doubled.tick_period(), Duration::from_millis(25));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_arms_once_at_min_players() {
        let (mut room, handle) = new_room();
        join(&mut room, Uuid::new_v4());
        assert_eq!(room.state.phase, RoomPhase::Waiting);
        assert!(room.timers.countdown.is_none());

        join(&mut room, Uuid::new_v4());
        assert_eq!(room.state.phase, RoomPhase::Starting);
        assert_eq!(handle.phase(), RoomPhase::Starting);
        assert_eq!(room.state.countdown, 3);
        assert!(room.timers.countdown.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn extra_join_does_not_restart_countdown() {
        let (mut room, _handle) = new_room();
        join(&mut room, Uuid::new_v4());
        join(&mut room, Uuid::new_v4());
        room.on_countdown();
        assert_eq!(room.state.countdown, 2);

        join(&mut room, Uuid::new_v4());
        assert_eq!(room.state.phase, RoomPhase::Starting);
        assert_eq!(room.state.countdown, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn join_when_full_broadcasts_error_without_a_record() {
        let (mut room, handle) = new_room();
        let mut rx = handle.broadcast_tx.subscribe();
        for _ in 0..4 {
            join(&mut room, Uuid::new_v4());
        }
        assert_eq!(room.state.players.len(), 3);
        assert_eq!(handle.player_count(), 3);

        let errors: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, ServerMsg::Error { code, .. } if code == "room_full"))
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_reaching_zero_starts_the_race() {
        let (mut room, handle) = new_room();
        let mut rx = handle.broadcast_tx.subscribe();
        join(&mut room, Uuid::new_v4());
        join(&mut room, Uuid::new_v4());

        let mut seen = Vec::new();
        for _ in 0..3 {
            room.on_countdown();
            seen.push(room.state.countdown);
        }
        assert_eq!(seen, vec![2, 1, 0]);
        assert_eq!(room.state.phase, RoomPhase::Racing);
        assert_eq!(handle.phase(), RoomPhase::Racing);
        assert!(room.race_started_at.is_some());
        assert!(room.timers.countdown.is_none());
        assert!(room.timers.tick.is_some());
        assert!(room.timers.cutoff.is_some());

        let started = drain(&mut rx)
            .into_iter()
            .any(|m| matches!(m, ServerMsg::RaceStarted { .. }));
        assert!(started);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_line_latches_exactly_once() {
        let (mut room, _handle, a, _b) = racing_room();
        room.state.players.get_mut(&a).unwrap().z = -(TRACK_LENGTH + 1.0);
        room.on_tick();

        let first = room.state.players[&a].finish_time;
        assert!(room.state.players[&a].finished);
        assert!(first.is_some());
        assert_eq!(room.state.phase, RoomPhase::Racing);

        room.on_tick();
        assert_eq!(room.state.players[&a].finish_time, first);
    }

    #[tokio::test(start_paused = true)]
    async fn race_ends_when_every_rider_finishes() {
        let (mut room, handle, a, b) = racing_room();
        let mut rx = handle.broadcast_tx.subscribe();
        room.state.players.get_mut(&a).unwrap().z = -(TRACK_LENGTH + 1.0);
        room.on_tick();
        room.state.players.get_mut(&b).unwrap().z = -(TRACK_LENGTH + 2.0);
        room.on_tick();

        assert_eq!(room.state.phase, RoomPhase::Finished);
        assert_eq!(handle.phase(), RoomPhase::Finished);
        assert!(room.timers.tick.is_none());
        assert!(room.timers.cutoff.is_none());

        let results: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                ServerMsg::RaceFinished { results } => Some(results),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].reason, RaceEndReason::AllFinished);
        assert_eq!(results[0].standings.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn race_finished_broadcast_fires_exactly_once() {
        let (mut room, handle, a, b) = racing_room();
        let mut rx = handle.broadcast_tx.subscribe();
        for id in [a, b] {
            room.state.players.get_mut(&id).unwrap().z = -(TRACK_LENGTH + 1.0);
        }
        room.on_tick();
        assert_eq!(room.state.phase, RoomPhase::Finished);

        // A stray later end is swallowed
        room.end_race(RaceEndReason::TimeLimit);
        let count = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, ServerMsg::RaceFinished { .. }))
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_after_the_finish_do_nothing() {
        let (mut room, _handle, a, b) = racing_room();
        for id in [a, b] {
            room.state.players.get_mut(&id).unwrap().z = -(TRACK_LENGTH + 1.0);
        }
        room.on_tick();
        assert_eq!(room.state.phase, RoomPhase::Finished);

        let tick = room.state.tick;
        let traffic_z: Vec<f32> = room.state.traffic.values().map(|v| v.z).collect();
        room.on_tick();
        assert_eq!(room.state.tick, tick);
        let after: Vec<f32> = room.state.traffic.values().map(|v| v.z).collect();
        assert_eq!(traffic_z, after);
    }

    #[tokio::test(start_paused = true)]
    async fn cutoff_ends_the_race_on_time_limit() {
        let (mut room, handle, _a, _b) = racing_room();
        let mut rx = handle.broadcast_tx.subscribe();
        room.on_cutoff();

        assert_eq!(room.state.phase, RoomPhase::Finished);
        let results: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                ServerMsg::RaceFinished { results } => Some(results),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].reason, RaceEndReason::TimeLimit);
        assert!(results[0].standings.iter().all(|e| !e.finished));
    }

    #[tokio::test(start_paused = true)]
    async fn input_for_an_unknown_session_is_a_noop() {
        let (mut room, _handle) = new_room();
        room.handle_input(Uuid::new_v4(), 1.0, 0.5, true);
        assert!(room.state.players.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_riders_input_is_ignored() {
        let (mut room, _handle, a, _b) = racing_room();
        {
            let p = room.state.players.get_mut(&a).unwrap();
            p.finished = true;
            p.finish_time = Some(10.0);
        }
        let z = room.state.players[&a].z;
        room.handle_input(a, 1.0, 0.0, false);
        assert_eq!(room.state.players[&a].z, z);
        assert_eq!(room.state.players[&a].speed, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_two_spawn_slots_are_within_kick_reach() {
        // Slots 0 and 1 sit at (2, 0) and (-2, -3), exactly the kick
        // reach apart, so an opening kick connects
        let (mut room, _handle) = new_room();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        join(&mut room, a);
        join(&mut room, b);

        room.handle_input(a, 0.0, 0.0, true);

        let target = &room.state.players[&b];
        assert_eq!(target.balance, BALANCE_START - KICK_BALANCE_DAMAGE);
        assert_eq!(target.z, -3.0 + KICK_PUSHBACK);
        assert_eq!(target.kicks_received, 1);
        assert_eq!(room.state.players[&a].kicks_landed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_mid_countdown_never_reverses_the_start() {
        let (mut room, _handle) = new_room();
        let a = Uuid::new_v4();
        join(&mut room, a);
        join(&mut room, Uuid::new_v4());
        assert_eq!(room.state.phase, RoomPhase::Starting);

        room.handle_leave(a);
        assert_eq!(room.state.phase, RoomPhase::Starting);
        assert!(room.timers.countdown.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn leave_of_the_last_unfinished_rider_ends_the_race() {
        let (mut room, _handle, a, b) = racing_room();
        {
            let p = room.state.players.get_mut(&a).unwrap();
            p.finished = true;
            p.finish_time = Some(30.0);
        }
        room.handle_leave(b);
        assert_eq!(room.state.phase, RoomPhase::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn an_emptied_racing_room_disposes_without_finishing() {
        let (mut room, _handle, a, b) = racing_room();
        room.handle_leave(a);
        assert_eq!(room.state.phase, RoomPhase::Racing);
        room.handle_leave(b);

        // Nobody left: the room winds down instead of declaring a result
        assert!(room.disposed);
        assert_ne!(room.state.phase, RoomPhase::Finished);
        assert!(room.timers.tick.is_none());
        assert!(room.timers.countdown.is_none());
        assert!(room.timers.cutoff.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn join_after_finish_is_ignored() {
        let (mut room, handle, a, b) = racing_room();
        for id in [a, b] {
            room.state.players.get_mut(&id).unwrap().z = -(TRACK_LENGTH + 1.0);
        }
        room.on_tick();
        assert_eq!(room.state.phase, RoomPhase::Finished);

        join(&mut room, Uuid::new_v4());
        assert_eq!(room.state.players.len(), 2);
        assert!(!handle.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn registry_tracks_codes_and_open_rooms() {
        let registry = RoomRegistry::new();
        let (_public, public_handle) = new_room();
        let (_private, private_handle) =
            RaceRoom::new(Uuid::new_v4(), 9, Some("AB12CD".to_string()), test_config());
        registry.insert(public_handle.clone());
        registry.insert(private_handle.clone());

        assert_eq!(registry.active_rooms(), 2);
        assert_eq!(
            registry.get_by_code("AB12CD").map(|h| h.id),
            Some(private_handle.id)
        );
        // Public allocation skips private rooms
        assert_eq!(
            registry.find_open_public().map(|h| h.id),
            Some(public_handle.id)
        );

        registry.remove(&private_handle.id);
        assert!(registry.get_by_code("AB12CD").is_none());
        assert_eq!(registry.active_rooms(), 1);
    }
}
