//! Types shared by the trivia server and its clients
//!
//! Everything that crosses the WebSocket lives here: the activity catalog,
//! the game state snapshot, one-shot effects and the command/event envelopes.
//! All messages are JSON text frames.

pub mod activity;
pub mod effect;
pub mod protocol;
pub mod state;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use activity::{
    Activities, Activity, ActivityContent, ActivityId, ActivityNode, ActivityType, CatalogError,
    Media, MediaFit, MediaType, NodeKind, PauseAt,
};
pub use effect::{Effect, PlaybackAction, PlaybackEffect};
pub use protocol::{Command, Event, ProtocolError};
pub use state::{
    active_state_equals, ActiveFourChoice, ActiveMediaList, ActiveReveal, ActiveSelection,
    ActiveState, BuzzEntry, Buzzers, ChoiceState, GameState, Player, PlayerId,
};

/// Interval between server heartbeats
pub const HEARTBEAT_INTERVAL_MS: u64 = 1500;
/// Silence after which a client treats its connection as dead
pub const HEARTBEAT_TIMEOUT_MS: u64 = 5000;
/// Reconnect delay grows by this much per failed attempt
pub const RECONNECT_STEP_MS: u64 = 1000;
pub const MAX_RECONNECT_DELAY_MS: u64 = 5000;

/// The only path that accepts WebSocket upgrades
pub const WS_PATH: &str = "/ws";
pub const DEFAULT_PORT: u16 = 8334;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
