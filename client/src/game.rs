use crate::connection::ConnectionStatus;
use crate::network::ConnectionEvent;
use log::debug;
use shared::{Activities, Activity, ActiveState, Effect, GameState, Player, PlayerId};

/// Local view of the game, rebuilt from connection events
#[derive(Debug, Clone)]
pub struct ClientGame {
    pub status: ConnectionStatus,
    pub activities: Activities,
    pub state: Option<GameState>,
    pub last_effect: Option<Effect>,
    /// Player this console buzzes for, if any
    pub player_id: Option<PlayerId>,
}

impl ClientGame {
    pub fn new(player_id: Option<PlayerId>) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            activities: Activities::new(),
            state: None,
            last_effect: None,
            player_id,
        }
    }

    /// Folds one event into the view; returns whether anything visible changed
    pub fn apply(&mut self, event: ConnectionEvent) -> bool {
        match event {
            ConnectionEvent::Connecting => self.set_status(ConnectionStatus::Connecting),
            ConnectionEvent::Connected => self.set_status(ConnectionStatus::Connected),
            ConnectionEvent::Disconnected => self.set_status(ConnectionStatus::Disconnected),
            ConnectionEvent::GameState(state) => {
                if self.state.as_ref() == Some(&state) {
                    return false;
                }
                self.state = Some(state);
                true
            }
            ConnectionEvent::Activities(activities) => {
                debug!("Received catalog with {} activities", activities.len());
                self.activities = activities;
                true
            }
            ConnectionEvent::Effect(effect) => {
                self.last_effect = Some(effect);
                true
            }
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) -> bool {
        let changed = self.status != status;
        self.status = status;
        changed
    }

    pub fn buzzers_enabled(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.buzzers.enabled)
    }

    /// 1-based position of a player in the buzz order
    pub fn buzz_position(&self, player_id: PlayerId) -> Option<usize> {
        let buzzes = self.state.as_ref()?.buzzers.state.as_ref()?;
        buzzes
            .iter()
            .position(|entry| entry.player_id == player_id)
            .map(|index| index + 1)
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.state.as_ref()?.players.get(&player_id)
    }

    pub fn me(&self) -> Option<&Player> {
        self.player(self.player_id?)
    }

    pub fn active_activity(&self) -> Option<&Activity> {
        self.state.as_ref()?.active.activity.as_ref()
    }

    pub fn active_state(&self) -> Option<&ActiveState> {
        self.state.as_ref()?.active.state.as_ref()
    }
}

impl Default for ClientGame {
    fn default() -> Self {
        Self::new(None)
    }
}
