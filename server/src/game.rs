//! Authoritative game engine
//!
//! The engine owns the player roster, the buzzer queue and the active
//! activity selection. Every mutation that changes observable state publishes
//! a fresh `GameState` snapshot on the engine's state channel; mutations that
//! change nothing stay silent.

use crate::validation::{validate_active_state, ValidationError};
use log::{debug, info, warn};
use shared::{
    active_state_equals, now_millis, Activities, ActiveSelection, ActiveState, ActivityId,
    BuzzEntry, Buzzers, Command, GameState, Player, PlayerId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of the state channel; slow subscribers skip to newer snapshots
const STATE_CHANNEL_CAPACITY: usize = 64;

/// Privilege a connection asserts when issuing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Player,
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("unknown activity {0}")]
    UnknownActivity(ActivityId),
    #[error("state type {state} does not match activity type {activity}")]
    StateTypeMismatch { activity: String, state: String },
    #[error("{command} requires the host role")]
    NotHost { command: &'static str },
    #[error(transparent)]
    InvalidState(#[from] ValidationError),
}

pub struct GameEngine {
    activities: Arc<Activities>,

    next_player_id: u32,
    players: BTreeMap<PlayerId, Player>,
    scores: HashMap<PlayerId, i64>,

    buzzers_enabled: bool,
    buzzed_in: HashSet<PlayerId>,
    buzzes: Vec<BuzzEntry>,

    current_activity: Option<ActivityId>,
    activity_state: Option<ActiveState>,

    state_tx: broadcast::Sender<GameState>,
}

impl GameEngine {
    pub fn new(activities: Arc<Activities>) -> Self {
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            activities,
            next_player_id: 0,
            players: BTreeMap::new(),
            scores: HashMap::new(),
            buzzers_enabled: false,
            buzzed_in: HashSet::new(),
            buzzes: Vec::new(),
            current_activity: None,
            activity_state: None,
            state_tx,
        }
    }

    /// Subscribes to snapshots published after each state change
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<GameState> {
        self.state_tx.subscribe()
    }

    pub fn activities(&self) -> &Arc<Activities> {
        &self.activities
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn score(&self, id: PlayerId) -> Option<i64> {
        self.scores.get(&id).copied()
    }

    /// Registers a player under the next sequential id
    pub fn add_player(
        &mut self,
        name: impl Into<String>,
        img_url: impl Into<String>,
        initial_score: Option<i64>,
    ) -> Player {
        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;

        let player = Player {
            id,
            name: name.into(),
            img_url: img_url.into(),
        };
        info!("Added player {} ({})", player.id, player.name);

        self.players.insert(id, player.clone());
        self.scores.insert(id, initial_score.unwrap_or(0));
        player
    }

    /// Appends a buzz for `player_id`
    ///
    /// Ignored while buzzers are disabled, for players who already buzzed
    /// this round and for unknown ids. Returns true if the buzz was recorded.
    pub fn buzz_in(&mut self, player_id: PlayerId) -> bool {
        if !self.buzzers_enabled {
            debug!("Ignoring buzz from {}: buzzers disabled", player_id);
            return false;
        }
        if self.buzzed_in.contains(&player_id) {
            debug!("Ignoring repeated buzz from {}", player_id);
            return false;
        }
        let Some(player) = self.players.get(&player_id) else {
            warn!("Received buzz for unknown player id {}", player_id);
            return false;
        };

        info!("BuzzIn {}", player.name);
        self.buzzes.push(BuzzEntry {
            player_id,
            time: now_millis(),
        });
        self.buzzed_in.insert(player_id);
        self.notify_state_changed();
        true
    }

    /// Turns buzzers on or off; the queue survives either way
    pub fn enable_buzzers(&mut self, enabled: bool) -> bool {
        if self.buzzers_enabled == enabled {
            return false;
        }
        self.buzzers_enabled = enabled;
        self.notify_state_changed();
        true
    }

    /// Clears the buzz queue, if there is anything to clear
    pub fn reset_buzzers(&mut self) -> bool {
        if self.buzzes.is_empty() {
            return false;
        }
        self.buzzes.clear();
        self.buzzed_in.clear();
        self.notify_state_changed();
        true
    }

    /// Selects a catalog activity and its interaction state
    ///
    /// `None` clears the selection. Selecting an activity without a state
    /// clears any stored state. A stored state is only replaced by one that
    /// differs from it. Returns whether anything observable changed.
    pub fn set_activity(
        &mut self,
        activity_id: Option<ActivityId>,
        state: Option<ActiveState>,
    ) -> Result<bool, GameError> {
        let Some(activity_id) = activity_id else {
            if self.current_activity.is_none() {
                return Ok(false);
            }
            self.current_activity = None;
            self.activity_state = None;
            self.notify_state_changed();
            return Ok(true);
        };

        let Some(activity) = self.activities.get(&activity_id) else {
            return Err(GameError::UnknownActivity(activity_id));
        };

        let mut changed = false;
        match state {
            Some(state) => {
                if activity.activity_type() != state.activity_type() {
                    return Err(GameError::StateTypeMismatch {
                        activity: activity.activity_type().to_string(),
                        state: state.activity_type().to_string(),
                    });
                }
                let same = self
                    .activity_state
                    .as_ref()
                    .is_some_and(|current| active_state_equals(current, &state));
                if !same {
                    self.activity_state = Some(state);
                    changed = true;
                }
            }
            None => {
                if self.activity_state.take().is_some() {
                    changed = true;
                }
            }
        }

        if self.current_activity.as_ref() != Some(&activity_id) {
            self.current_activity = Some(activity_id);
            changed = true;
        }

        if changed {
            self.notify_state_changed();
        }
        Ok(changed)
    }

    /// Pure snapshot of the current state
    pub fn get_state(&self) -> GameState {
        GameState {
            players: self.players.clone(),
            buzzers: Buzzers {
                enabled: self.buzzers_enabled,
                state: self.buzzers_enabled.then(|| self.buzzes.clone()),
            },
            active: ActiveSelection {
                activity: self
                    .current_activity
                    .as_ref()
                    .and_then(|id| self.activities.tree(id)),
                state: self.activity_state.clone(),
            },
        }
    }

    fn notify_state_changed(&self) {
        // Err only means there are no subscribers
        let _ = self.state_tx.send(self.get_state());
    }
}

/// Applies a decoded command under the given role
///
/// `SendEffect` is not a game mutation and is ignored here; the hub relays
/// effects itself. Returns whether the engine state changed.
pub fn apply_command(
    engine: &mut GameEngine,
    command: Command,
    role: Role,
) -> Result<bool, GameError> {
    if command.requires_host() && role != Role::Host {
        return Err(GameError::NotHost {
            command: command.name(),
        });
    }

    match command {
        Command::Buzz { player_id } => Ok(engine.buzz_in(player_id)),
        Command::EnableBuzzers { enabled } => Ok(engine.enable_buzzers(enabled)),
        Command::ResetBuzzers => Ok(engine.reset_buzzers()),
        Command::SetActivity { activity_id, state } => {
            let state = match state {
                Some(raw) if !raw.is_null() => Some(validate_active_state(&raw)?),
                _ => None,
            };
            engine.set_activity(activity_id, state)
        }
        Command::SendEffect { .. } => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use shared::{Activity, ActivityContent, ActivityType, Media};
    use tokio::sync::broadcast::error::TryRecvError;

    fn media(id: &str, parent: &str, file: &str) -> Activity {
        Activity {
            id: id.into(),
            parent_id: Some(parent.into()),
            content: ActivityContent::Image(Media::new(file)),
        }
    }

    fn catalog() -> Arc<Activities> {
        let reveal = Activity::new(
            "q1",
            ActivityContent::Reveal {
                question: Box::new(media("q1-q", "q1", "q.png")),
                answer: Box::new(media("q1-ans", "q1", "a.png")),
            },
        );
        let slides = Activity::new(
            "slides",
            ActivityContent::MediaList {
                items: vec![media("slides-0", "slides", "0.png")],
            },
        );
        let intro = Activity::new("intro", ActivityContent::Video(Media::new("intro.mp4")));
        Arc::new(Activities::from_trees(vec![reveal, slides, intro]).unwrap())
    }

    fn engine_with_players(count: usize) -> GameEngine {
        let mut engine = GameEngine::new(catalog());
        for i in 0..count {
            engine.add_player(format!("Player {}", i), format!("p{}.png", i), None);
        }
        engine
    }

    fn drain(rx: &mut broadcast::Receiver<GameState>) -> usize {
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[test]
    fn test_player_ids_are_sequential() {
        let mut engine = GameEngine::new(catalog());
        let first = engine.add_player("Ada", "ada.png", None);
        let second = engine.add_player("Bo", "bo.png", Some(5));

        assert_eq!(first.id, PlayerId(0));
        assert_eq!(second.id, PlayerId(1));
        assert_eq!(engine.score(first.id), Some(0));
        assert_eq!(engine.score(second.id), Some(5));
        assert_eq!(engine.player(PlayerId(1)).unwrap().name, "Bo");
        assert_eq!(engine.get_state().players.len(), 2);
    }

    #[test]
    fn test_buzz_order_follows_call_order() {
        let mut engine = engine_with_players(3);
        engine.enable_buzzers(true);

        assert!(engine.buzz_in(PlayerId(2)));
        assert!(engine.buzz_in(PlayerId(0)));
        assert!(!engine.buzz_in(PlayerId(2)));
        assert!(engine.buzz_in(PlayerId(1)));

        let order: Vec<PlayerId> = engine
            .get_state()
            .buzzers
            .state
            .unwrap()
            .iter()
            .map(|entry| entry.player_id)
            .collect();
        assert_eq!(order, vec![PlayerId(2), PlayerId(0), PlayerId(1)]);
    }

    #[test]
    fn test_buzz_ignored_when_disabled_or_unknown() {
        let mut engine = engine_with_players(1);
        let mut rx = engine.subscribe();

        assert!(!engine.buzz_in(PlayerId(0)));
        engine.enable_buzzers(true);
        drain(&mut rx);

        assert!(!engine.buzz_in(PlayerId(42)));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_enable_buzzers_emits_only_on_flip() {
        let mut engine = engine_with_players(1);
        let mut rx = engine.subscribe();

        assert!(!engine.enable_buzzers(false));
        assert!(engine.enable_buzzers(true));
        assert!(!engine.enable_buzzers(true));
        assert_eq!(drain(&mut rx), 1);
    }

    #[test]
    fn test_reset_empty_queue_is_silent() {
        let mut engine = engine_with_players(2);
        engine.enable_buzzers(true);
        let mut rx = engine.subscribe();

        assert!(!engine.reset_buzzers());
        assert_eq!(drain(&mut rx), 0);

        engine.buzz_in(PlayerId(0));
        drain(&mut rx);
        assert!(engine.reset_buzzers());
        assert_eq!(drain(&mut rx), 1);
        assert_eq!(engine.get_state().buzzers.state, Some(vec![]));

        // A reset round lets the same player buzz again
        assert!(engine.buzz_in(PlayerId(0)));
    }

    #[test]
    fn test_disabled_buzzers_hide_queue() {
        let mut engine = engine_with_players(1);
        engine.enable_buzzers(true);
        engine.buzz_in(PlayerId(0));
        engine.enable_buzzers(false);

        let state = engine.get_state();
        assert!(!state.buzzers.enabled);
        assert!(state.buzzers.state.is_none());

        engine.enable_buzzers(true);
        assert_eq!(engine.get_state().buzzers.state.unwrap().len(), 1);
    }

    #[test]
    fn test_set_activity_type_mismatch_changes_nothing() {
        let mut engine = engine_with_players(0);
        let mut rx = engine.subscribe();
        let before = engine.get_state();

        let result = engine.set_activity(Some("q1".into()), Some(ActiveState::media_list(0)));
        assert!(matches!(result, Err(GameError::StateTypeMismatch { .. })));
        assert_eq!(engine.get_state(), before);
        assert_eq!(drain(&mut rx), 0);
    }

    #[test]
    fn test_set_activity_unknown_id() {
        let mut engine = engine_with_players(0);

        let result = engine.set_activity(Some("q1-q".into()), None);
        assert!(matches!(result, Err(GameError::UnknownActivity(_))));
        assert!(engine.get_state().active.activity.is_none());
    }

    #[test]
    fn test_set_activity_twice_emits_once() {
        let mut engine = engine_with_players(0);
        let mut rx = engine.subscribe();

        let state = Some(ActiveState::reveal(false));
        assert!(engine.set_activity(Some("q1".into()), state.clone()).unwrap());
        assert!(!engine.set_activity(Some("q1".into()), state).unwrap());
        assert_eq!(drain(&mut rx), 1);

        let active = engine.get_state().active;
        assert_eq!(active.activity.unwrap().activity_type(), ActivityType::Reveal);
        assert_eq!(active.state, Some(ActiveState::reveal(false)));
    }

    #[test]
    fn test_set_activity_without_state_clears_state() {
        let mut engine = engine_with_players(0);
        engine
            .set_activity(Some("q1".into()), Some(ActiveState::reveal(true)))
            .unwrap();

        assert!(engine.set_activity(Some("q1".into()), None).unwrap());
        assert!(engine.get_state().active.state.is_none());
        assert!(!engine.set_activity(Some("q1".into()), None).unwrap());
    }

    #[test]
    fn test_clear_activity() {
        let mut engine = engine_with_players(0);
        let mut rx = engine.subscribe();

        assert!(!engine.set_activity(None, None).unwrap());
        engine.set_activity(Some("intro".into()), None).unwrap();
        assert!(engine.set_activity(None, None).unwrap());
        assert_eq!(drain(&mut rx), 2);
        assert_eq!(engine.get_state().active, ActiveSelection::default());
    }

    #[test]
    fn test_snapshot_carries_nested_activity_tree() {
        let mut engine = engine_with_players(0);
        engine.set_activity(Some("q1".into()), None).unwrap();

        let activity = engine.get_state().active.activity.unwrap();
        match activity.content {
            ActivityContent::Reveal { question, answer } => {
                assert_eq!(question.id, ActivityId::from("q1-q"));
                assert_eq!(answer.parent_id, Some(ActivityId::from("q1")));
            }
            other => panic!("Unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_apply_command_validates_raw_state() {
        let mut engine = engine_with_players(0);

        let command = Command::SetActivity {
            activity_id: Some("slides".into()),
            state: Some(json!({ "type": "media list", "activeIndex": 2 })),
        };
        assert!(apply_command(&mut engine, command, Role::Host).unwrap());
        assert_eq!(
            engine.get_state().active.state,
            Some(ActiveState::media_list(2))
        );

        let bad = Command::SetActivity {
            activity_id: Some("slides".into()),
            state: Some(json!({ "type": "media list" })),
        };
        assert!(matches!(
            apply_command(&mut engine, bad, Role::Host),
            Err(GameError::InvalidState(_))
        ));
        assert_eq!(
            engine.get_state().active.state,
            Some(ActiveState::media_list(2))
        );
    }

    #[test]
    fn test_apply_command_requires_host() {
        let mut engine = engine_with_players(1);

        let result = apply_command(
            &mut engine,
            Command::EnableBuzzers { enabled: true },
            Role::Player,
        );
        assert!(matches!(result, Err(GameError::NotHost { .. })));
        assert!(!engine.get_state().buzzers.enabled);

        apply_command(&mut engine, Command::EnableBuzzers { enabled: true }, Role::Host).unwrap();
        let buzzed = apply_command(
            &mut engine,
            Command::Buzz {
                player_id: PlayerId(0),
            },
            Role::Player,
        )
        .unwrap();
        assert!(buzzed);
    }

    #[test]
    fn test_subscribe_receives_snapshot() {
        let mut engine = engine_with_players(1);
        let mut rx = engine.subscribe();

        engine.enable_buzzers(true);
        let snapshot = rx.try_recv().unwrap();
        assert!(snapshot.buzzers.enabled);
        assert_eq!(snapshot.buzzers.state, Some(vec![]));
    }
}
