//! Connection lifecycle bookkeeping, free of any I/O
//!
//! The async driver in `network` owns the socket and the timers; this module
//! decides what an event means: how long to wait before the next attempt,
//! whether a snapshot is fresh enough to apply, and what an inbound frame is.

use log::debug;
use shared::{
    Activities, Effect, Event, GameState, ProtocolError, MAX_RECONNECT_DELAY_MS,
    RECONNECT_STEP_MS,
};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Linear reconnect backoff
///
/// The first retry is immediate; each further failure adds one step up to
/// the cap. A successful open resets it.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    delay: Duration,
    step: Duration,
    max: Duration,
}

impl ReconnectBackoff {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self {
            delay: Duration::ZERO,
            step,
            max,
        }
    }

    /// Returns the wait before the next attempt and advances the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = (self.delay + self.step).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.delay = Duration::ZERO;
    }

    pub fn current(&self) -> Duration {
        self.delay
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(RECONNECT_STEP_MS),
            Duration::from_millis(MAX_RECONNECT_DELAY_MS),
        )
    }
}

/// Drops snapshots older than the newest one applied
///
/// Survives reconnects, so a delayed frame from an old socket can never roll
/// the view back.
#[derive(Debug, Clone, Default)]
pub struct SnapshotGuard {
    last_time: u64,
}

impl SnapshotGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `time` if it is not older than the last accepted snapshot
    pub fn accept(&mut self, time: u64) -> bool {
        if time < self.last_time {
            return false;
        }
        self.last_time = time;
        true
    }

    pub fn last_time(&self) -> u64 {
        self.last_time
    }
}

/// What an inbound frame means to the connection
#[derive(Debug)]
pub enum Inbound {
    /// Re-arm the heartbeat timeout
    Heartbeat,
    State(GameState),
    Activities(Activities),
    Effect(Effect),
    /// Snapshot older than the last one applied
    Stale { time: u64, last: u64 },
    Malformed(ProtocolError),
}

/// Lifecycle state of one connection manager
#[derive(Debug, Clone)]
pub struct ConnectionState {
    status: ConnectionStatus,
    backoff: ReconnectBackoff,
    guard: SnapshotGuard,
}

impl ConnectionState {
    pub fn new(backoff: ReconnectBackoff) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            backoff,
            guard: SnapshotGuard::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn begin_attempt(&mut self) {
        self.status = ConnectionStatus::Connecting;
    }

    pub fn opened(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.backoff.reset();
    }

    /// Marks the connection lost and returns how long to wait before retrying
    pub fn lost(&mut self) -> Duration {
        self.status = ConnectionStatus::Disconnected;
        let delay = self.backoff.next_delay();
        debug!("Reconnecting in {}ms", delay.as_millis());
        delay
    }

    pub fn receive(&mut self, text: &str) -> Inbound {
        match Event::decode(text) {
            Ok(Event::Heartbeat { .. }) => Inbound::Heartbeat,
            Ok(Event::GameState { time, state }) => {
                if self.guard.accept(time) {
                    Inbound::State(state)
                } else {
                    Inbound::Stale {
                        time,
                        last: self.guard.last_time(),
                    }
                }
            }
            Ok(Event::Activities { activities, .. }) => Inbound::Activities(activities),
            Ok(Event::Effect { effect, .. }) => Inbound::Effect(effect),
            Err(e) => Inbound::Malformed(e),
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(ReconnectBackoff::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(time: u64, enabled: bool) -> String {
        json!({
            "type": "GameState",
            "time": time,
            "state": { "players": {}, "buzzers": { "enabled": enabled }, "active": {} }
        })
        .to_string()
    }

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = ReconnectBackoff::default();
        let delays: Vec<u128> = (0..8).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![0, 1000, 2000, 3000, 4000, 5000, 5000, 5000]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::ZERO);
    }

    #[test]
    fn test_open_resets_backoff() {
        let mut state = ConnectionState::default();
        state.begin_attempt();
        assert_eq!(state.lost(), Duration::ZERO);
        state.begin_attempt();
        assert_eq!(state.lost(), Duration::from_millis(1000));

        state.begin_attempt();
        state.opened();
        assert_eq!(state.status(), ConnectionStatus::Connected);
        assert_eq!(state.lost(), Duration::ZERO);
        assert_eq!(state.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_guard_accepts_equal_and_newer() {
        let mut guard = SnapshotGuard::new();
        assert!(guard.accept(0));
        assert!(guard.accept(100));
        assert!(guard.accept(100));
        assert!(!guard.accept(50));
        assert_eq!(guard.last_time(), 100);
    }

    #[test]
    fn test_stale_snapshot_is_not_applied() {
        let mut state = ConnectionState::default();

        match state.receive(&snapshot(100, true)) {
            Inbound::State(game) => assert!(game.buzzers.enabled),
            other => panic!("Unexpected inbound {:?}", other),
        }
        match state.receive(&snapshot(50, false)) {
            Inbound::Stale { time, last } => {
                assert_eq!(time, 50);
                assert_eq!(last, 100);
            }
            other => panic!("Unexpected inbound {:?}", other),
        }
    }

    #[test]
    fn test_guard_survives_reconnect() {
        let mut state = ConnectionState::default();
        state.opened();
        state.receive(&snapshot(100, true));
        state.lost();
        state.opened();

        assert!(matches!(
            state.receive(&snapshot(99, true)),
            Inbound::Stale { .. }
        ));
    }

    #[test]
    fn test_classify_other_events() {
        let mut state = ConnectionState::default();

        assert!(matches!(
            state.receive(r#"{"type":"Heartbeat","time":1}"#),
            Inbound::Heartbeat
        ));
        assert!(matches!(
            state.receive(r#"{"type":"Activities","time":1,"activities":{}}"#),
            Inbound::Activities(_)
        ));
        assert!(matches!(
            state.receive(
                r#"{"type":"Effect","time":1,"effect":{"type":"PlaybackEffect","action":"Restart","targetActivityId":"x"}}"#
            ),
            Inbound::Effect(_)
        ));
        assert!(matches!(state.receive("{oops"), Inbound::Malformed(_)));
        assert!(matches!(
            state.receive(r#"{"type":"Unknown","time":1}"#),
            Inbound::Malformed(_)
        ));
    }
}
