//! Game settings and activity catalog loading
//!
//! The media home holds `game-settings.yaml`, which names the activities file
//! and lists the players, and `<name>.yaml`, which describes the activities.
//! Media entries are file paths relative to the media home; they are
//! published to clients prefixed with the media base URL.

use crate::game::GameEngine;
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use shared::{
    Activities, Activity, ActivityContent, ActivityId, Media, MediaFit, MediaType, PauseAt,
};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SETTINGS_FILE: &str = "game-settings.yaml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("must have an \"activities\" entry at the top level")]
    MissingActivities,
    #[error("must have at least one activity")]
    NoActivities,
    #[error("[{id}] {reason}")]
    InvalidEntry { id: ActivityId, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameSettings {
    pub game: GameSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameSection {
    /// Name of the activities file, without extension
    pub activities: String,
    pub players: Vec<PlayerSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSettings {
    pub name: String,
    /// Image path relative to the media home
    pub img: String,
}

/// The media home directory and the URL it is served under
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    home: PathBuf,
    base_url: String,
}

impl MediaLibrary {
    pub fn new(home: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            base_url: base_url.into(),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn media_url(&self, file: &str) -> String {
        format!("{}{}", self.base_url, file)
    }

    pub fn load_settings(&self) -> Result<GameSettings, SettingsError> {
        let path = self.home.join(SETTINGS_FILE);
        info!("Reading {}...", path.display());
        let text = read(&path)?;
        serde_yaml::from_str(&text).map_err(|source| SettingsError::Parse { path, source })
    }

    pub fn load_activities(&self, name: &str) -> Result<Activities, SettingsError> {
        let path = self.home.join(format!("{}.yaml", name));
        info!("Loading activities from {}...", path.display());
        let text = read(&path)?;
        let root: Value = serde_yaml::from_str(&text)
            .map_err(|source| SettingsError::Parse { path, source })?;

        let activities = self.parse_activities(&root)?;
        info!("Loaded {} activities", activities.len());
        Ok(activities)
    }

    /// Builds the catalog from a parsed activities document
    ///
    /// Invalid entries are logged and skipped. Only a missing or empty
    /// `activities` object is fatal.
    pub fn parse_activities(&self, root: &Value) -> Result<Activities, SettingsError> {
        if let Some(name) = root.get("name").and_then(Value::as_str) {
            info!("Activities set: {}", name);
        }

        let entries = root
            .get("activities")
            .and_then(Value::as_object)
            .ok_or(SettingsError::MissingActivities)?;
        if entries.is_empty() {
            return Err(SettingsError::NoActivities);
        }

        let mut activities = Activities::new();
        for (key, entry) in entries {
            let id = ActivityId::new(key.as_str());
            let parsed = self
                .parse_activity(&id, entry, &id)
                .and_then(|activity| {
                    activities
                        .insert(activity)
                        .map_err(|e| invalid(&id, e.to_string()))
                });
            if let Err(e) = parsed {
                warn!("Skipping activity: {}", e);
            }
        }
        Ok(activities)
    }

    fn parse_activity(
        &self,
        id: &ActivityId,
        entry: &Value,
        top_level: &ActivityId,
    ) -> Result<Activity, SettingsError> {
        if let Some(file) = entry.get("file").and_then(Value::as_str) {
            return self.parse_media(id, file, entry);
        }

        let content = match entry.get("type").and_then(Value::as_str) {
            Some("reveal") => {
                let (Some(question), Some(answer)) =
                    (object(entry, "question"), object(entry, "answer"))
                else {
                    return Err(invalid(
                        id,
                        "Reveal questions must have 'question' and 'answer' properties",
                    ));
                };
                let question = self.parse_child(&id.child("q"), question, top_level)?;
                let answer = self.parse_child(&id.child("ans"), answer, top_level)?;
                if question.as_media().is_none() || answer.as_media().is_none() {
                    return Err(invalid(
                        id,
                        "Reveal 'question' and 'answer' activities must be media (link to a file)",
                    ));
                }
                ActivityContent::Reveal {
                    question: Box::new(question),
                    answer: Box::new(answer),
                }
            }
            Some("4 choice") => {
                let (Some(a), Some(b), Some(c), Some(d)) = (
                    object(entry, "a"),
                    object(entry, "b"),
                    object(entry, "c"),
                    object(entry, "d"),
                ) else {
                    return Err(invalid(id, "4 choice questions must have abcd properties"));
                };
                ActivityContent::FourChoice {
                    a: Box::new(self.parse_child(&id.child("a"), a, top_level)?),
                    b: Box::new(self.parse_child(&id.child("b"), b, top_level)?),
                    c: Box::new(self.parse_child(&id.child("c"), c, top_level)?),
                    d: Box::new(self.parse_child(&id.child("d"), d, top_level)?),
                }
            }
            Some("media list") => {
                let files = self.list_items(id, entry)?;
                let mut items = Vec::with_capacity(files.len());
                for (index, file) in files.iter().enumerate() {
                    let mut item = self.parse_media(&id.child(index), file, entry)?;
                    item.parent_id = Some(top_level.clone());
                    items.push(item);
                }
                ActivityContent::MediaList { items }
            }
            other => {
                return Err(invalid(
                    id,
                    format!("Unsupported activity type {}", other.unwrap_or("(none)")),
                ))
            }
        };

        Ok(Activity::new(id.clone(), content))
    }

    fn parse_child(
        &self,
        id: &ActivityId,
        entry: &Value,
        top_level: &ActivityId,
    ) -> Result<Activity, SettingsError> {
        let mut child = self.parse_activity(id, entry, top_level)?;
        child.parent_id = Some(top_level.clone());
        Ok(child)
    }

    /// Collects media list files: the `itemsFolder` listing in natural order,
    /// followed by the explicit `items`
    fn list_items(&self, id: &ActivityId, entry: &Value) -> Result<Vec<String>, SettingsError> {
        let mut files = Vec::new();

        if let Some(folder) = entry.get("itemsFolder").and_then(Value::as_str) {
            let dir = self.home.join(folder);
            let listing = fs::read_dir(&dir)
                .map_err(|e| invalid(id, format!("Cannot read itemsFolder {}: {}", dir.display(), e)))?;
            let mut names: Vec<String> = listing
                .filter_map(|entry| entry.ok())
                .map(|entry| format!("{}/{}", folder, entry.file_name().to_string_lossy()))
                .collect();
            names.sort_by(|a, b| natural_cmp(a, b));
            files.extend(names);
        }

        match entry.get("items").and_then(Value::as_array) {
            Some(items) => {
                for item in items {
                    let Some(file) = item.as_str() else {
                        return Err(invalid(id, "All items in media list activities must be file paths"));
                    };
                    files.push(file.to_string());
                }
            }
            None if files.is_empty() => {
                return Err(invalid(id, "Media list activities must have an array property 'items'"));
            }
            None => {}
        }

        Ok(files)
    }

    fn parse_media(
        &self,
        id: &ActivityId,
        file: &str,
        entry: &Value,
    ) -> Result<Activity, SettingsError> {
        let media_type = media_type_of(file).ok_or_else(|| {
            invalid(id, format!("Unsupported media extension in {}", file))
        })?;

        if !self.home.join(file).exists() {
            warn!("[{}] Media not found ({})", id, file);
        }

        let fit = match entry.get("fit").and_then(Value::as_str) {
            Some("cover") => Some(MediaFit::Cover),
            Some("contain") => Some(MediaFit::Contain),
            _ => None,
        };
        let auto_play = entry.get("autoPlay").and_then(Value::as_bool).unwrap_or(true);
        let pause_at = parse_pause_at(id, entry.get("pauseAt"))?;

        let media = Media {
            file: self.media_url(file),
            fit,
            auto_play: Some(auto_play),
            pause_at,
        };
        Ok(Activity::new(id.clone(), ActivityContent::media(media_type, media)))
    }
}

/// Registers every configured player with its image resolved to a URL
pub fn seed_players(engine: &mut GameEngine, settings: &GameSettings, library: &MediaLibrary) {
    for player in &settings.game.players {
        engine.add_player(&player.name, library.media_url(&player.img), None);
    }
}

fn read(path: &Path) -> Result<String, SettingsError> {
    fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(id: &ActivityId, reason: impl Into<String>) -> SettingsError {
    SettingsError::InvalidEntry {
        id: id.clone(),
        reason: reason.into(),
    }
}

fn object<'a>(entry: &'a Value, key: &str) -> Option<&'a Value> {
    entry.get(key).filter(|value| value.is_object())
}

fn media_type_of(file: &str) -> Option<MediaType> {
    let (_, ext) = file.rsplit_once('.')?;
    match ext.trim().to_lowercase().as_str() {
        "png" | "jpg" | "jpeg" | "svg" | "webp" | "avif" => Some(MediaType::Image),
        "mp4" | "mov" => Some(MediaType::Video),
        "txt" => Some(MediaType::Text),
        "mp3" | "aac" | "wav" => Some(MediaType::Audio),
        _ => None,
    }
}

fn parse_pause_at(id: &ActivityId, raw: Option<&Value>) -> Result<Option<PauseAt>, SettingsError> {
    match raw {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64().map(PauseAt::Single)),
        Some(Value::Array(list)) if list.is_empty() => Ok(None),
        Some(Value::Array(list)) => list
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<f64>>>()
            .map(|points| Some(PauseAt::List(points)))
            .ok_or_else(|| invalid(id, "All pauseAt list elements must be numbers")),
        Some(other) => Err(invalid(
            id,
            format!("Unsupported pauseAt value {}; must be number or list of numbers", other),
        )),
    }
}

/// Orders names the way a person would: digit runs compare by value
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        match (a.chars().next(), b.chars().next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (num_a, rest_a) = split_digits(a);
                let (num_b, rest_b) = split_digits(b);
                let ordering = compare_digits(num_a, num_b);
                if ordering != Ordering::Equal {
                    return ordering;
                }
                a = rest_a;
                b = rest_b;
            }
            (Some(x), Some(y)) => {
                let ordering = x.to_lowercase().cmp(y.to_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                a = &a[x.len_utf8()..];
                b = &b[y.len_utf8()..];
            }
        }
    }
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
