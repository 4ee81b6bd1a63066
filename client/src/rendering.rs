use crate::connection::ConnectionStatus;
use crate::game::ClientGame;
use shared::{
    ActiveState, Activities, Activity, ActivityContent, ChoiceState, Effect, GameState,
};
use std::fmt::Write;

/// Renders the client view as plain text for the console
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    pub show_catalog: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self, game: &ClientGame) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[{}]", status_label(game.status));

        if let Some(state) = &game.state {
            self.draw_players(&mut out, game, state);
            self.draw_buzzers(&mut out, state);
            self.draw_active(&mut out, state);
        }

        if let Some(effect) = &game.last_effect {
            let _ = writeln!(out, "Last effect: {}", describe_effect(effect));
        }

        if self.show_catalog {
            self.draw_catalog(&mut out, &game.activities);
        }
        out
    }

    fn draw_players(&self, out: &mut String, game: &ClientGame, state: &GameState) {
        let _ = writeln!(out, "Players:");
        for player in state.players.values() {
            let marker = if Some(player.id) == game.player_id {
                "*"
            } else {
                " "
            };
            let _ = writeln!(out, " {}{:>3} {}", marker, player.id.0, player.name);
        }
    }

    fn draw_buzzers(&self, out: &mut String, state: &GameState) {
        if !state.buzzers.enabled {
            let _ = writeln!(out, "Buzzers: off");
            return;
        }

        let order = state.buzzers.state.as_deref().unwrap_or_default();
        if order.is_empty() {
            let _ = writeln!(out, "Buzzers: on, waiting");
            return;
        }

        let _ = writeln!(out, "Buzzers: on");
        for (position, entry) in order.iter().enumerate() {
            let name = state
                .players
                .get(&entry.player_id)
                .map(|p| p.name.as_str())
                .unwrap_or("?");
            let _ = writeln!(out, "  {}. {}", position + 1, name);
        }
    }

    fn draw_active(&self, out: &mut String, state: &GameState) {
        match &state.active.activity {
            Some(activity) => {
                let _ = writeln!(
                    out,
                    "Active: {} ({})",
                    activity.id,
                    activity.activity_type()
                );
                if let Some(active_state) = &state.active.state {
                    let _ = writeln!(out, "  {}", describe_state(activity, active_state));
                }
            }
            None => {
                let _ = writeln!(out, "Active: none");
            }
        }
    }

    fn draw_catalog(&self, out: &mut String, activities: &Activities) {
        let _ = writeln!(out, "Catalog ({}):", activities.len());
        for id in activities.ids() {
            if let Some(node) = activities.get(id) {
                let _ = writeln!(out, "  {} ({})", id, node.activity_type());
            }
        }
    }
}

fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "disconnected",
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Connected => "connected",
    }
}

fn describe_state(activity: &Activity, state: &ActiveState) -> String {
    match state {
        ActiveState::Reveal(reveal) => describe_reveal(reveal.show_answer),
        ActiveState::MediaList(list) => describe_index(activity, list.active_index),
        ActiveState::FourChoice(choice) => {
            let options = [("a", &choice.a), ("b", &choice.b), ("c", &choice.c), ("d", &choice.d)];
            let parts: Vec<String> = options
                .iter()
                .filter_map(|(label, option)| {
                    option.as_ref().map(|option| {
                        let text = match option {
                            ChoiceState::Reveal(reveal) => describe_reveal(reveal.show_answer),
                            ChoiceState::MediaList(list) => format!("item {}", list.active_index),
                        };
                        format!("{}: {}", label, text)
                    })
                })
                .collect();
            if parts.is_empty() {
                "no option state".to_string()
            } else {
                parts.join(", ")
            }
        }
    }
}

fn describe_reveal(show_answer: bool) -> String {
    if show_answer {
        "answer shown".to_string()
    } else {
        "answer hidden".to_string()
    }
}

fn describe_index(activity: &Activity, index: i64) -> String {
    match &activity.content {
        ActivityContent::MediaList { items } => {
            let current = usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .map(|item| item.id.to_string())
                .unwrap_or_else(|| "out of range".to_string());
            format!("item {} of {} ({})", index, items.len(), current)
        }
        _ => format!("item {}", index),
    }
}

fn describe_effect(effect: &Effect) -> String {
    match effect {
        Effect::Playback(playback) => match &playback.parent_activity_id {
            Some(parent) => format!(
                "{:?} {} in {}",
                playback.action, playback.target_activity_id, parent
            ),
            None => format!("{:?} {}", playback.action, playback.target_activity_id),
        },
    }
}
