//! One-shot effects relayed to every connection and never stored

use crate::activity::ActivityId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackAction {
    Play,
    Pause,
    Restart,
}

/// Controls media playback on the display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackEffect {
    pub action: PlaybackAction,
    #[serde(rename = "targetActivityId")]
    pub target_activity_id: ActivityId,
    #[serde(
        rename = "parentActivityId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_activity_id: Option<ActivityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Effect {
    #[serde(rename = "PlaybackEffect")]
    Playback(PlaybackEffect),
}

impl Effect {
    pub fn playback(
        action: PlaybackAction,
        target: impl Into<ActivityId>,
        parent: Option<ActivityId>,
    ) -> Self {
        Effect::Playback(PlaybackEffect {
            action,
            target_activity_id: target.into(),
            parent_activity_id: parent,
        })
    }

    /// Catalog entry the effect must resolve against: the parent when given,
    /// otherwise the target itself
    pub fn catalog_key(&self) -> &ActivityId {
        match self {
            Effect::Playback(playback) => playback
                .parent_activity_id
                .as_ref()
                .unwrap_or(&playback.target_activity_id),
        }
    }
}
