//! Wire protocol: commands (client to server) and events (server to client)
//!
//! Decoding only establishes that a message carries a known tag and a
//! routable shape. Payloads that need game knowledge to check, the
//! interaction state of `SetActivity` and the effect of `SendEffect`, are
//! kept as raw JSON and validated by the server.

use crate::activity::{Activities, ActivityId};
use crate::effect::Effect;
use crate::state::{ActiveState, GameState, PlayerId};
use crate::now_millis;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Command sent by a client, encoded as `{"command": <tag>, "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "data")]
pub enum Command {
    Buzz {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
    /// Host only
    ResetBuzzers,
    /// Host only
    EnableBuzzers { enabled: bool },
    /// Host only. A `null` activity clears the selection.
    SetActivity {
        #[serde(rename = "activityId", default)]
        activity_id: Option<ActivityId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<Value>,
    },
    SendEffect { effect: Value },
}

impl Command {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Builds a `SetActivity` command from a typed interaction state
    pub fn set_activity(
        activity_id: Option<ActivityId>,
        state: Option<&ActiveState>,
    ) -> Result<Self, ProtocolError> {
        let state = state.map(serde_json::to_value).transpose()?;
        Ok(Command::SetActivity { activity_id, state })
    }

    pub fn send_effect(effect: &Effect) -> Result<Self, ProtocolError> {
        Ok(Command::SendEffect {
            effect: serde_json::to_value(effect)?,
        })
    }

    /// Commands only the host console may issue
    pub fn requires_host(&self) -> bool {
        matches!(
            self,
            Command::ResetBuzzers | Command::EnableBuzzers { .. } | Command::SetActivity { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Buzz { .. } => "Buzz",
            Command::ResetBuzzers => "ResetBuzzers",
            Command::EnableBuzzers { .. } => "EnableBuzzers",
            Command::SetActivity { .. } => "SetActivity",
            Command::SendEffect { .. } => "SendEffect",
        }
    }
}

/// Event pushed by the server; `time` is the sender's epoch milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    GameState { time: u64, state: GameState },
    Heartbeat { time: u64 },
    Activities { time: u64, activities: Activities },
    Effect { time: u64, effect: Effect },
}

impl Event {
    pub fn game_state(state: GameState) -> Self {
        Event::GameState {
            time: now_millis(),
            state,
        }
    }

    pub fn heartbeat() -> Self {
        Event::Heartbeat { time: now_millis() }
    }

    pub fn activities(activities: Activities) -> Self {
        Event::Activities {
            time: now_millis(),
            activities,
        }
    }

    pub fn effect(effect: Effect) -> Self {
        Event::Effect {
            time: now_millis(),
            effect,
        }
    }

    pub fn time(&self) -> u64 {
        match self {
            Event::GameState { time, .. }
            | Event::Heartbeat { time }
            | Event::Activities { time, .. }
            | Event::Effect { time, .. } => *time,
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
