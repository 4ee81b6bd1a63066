//! Activity catalog: the immutable question/media tree loaded at startup
//!
//! On the wire an activity is a nested JSON tree (a reveal embeds its question
//! and answer media, a four-choice embeds its four options). In memory the
//! catalog is a flat arena keyed by node id where composite nodes only hold the
//! ids of their children. Trees are rebuilt from the arena whenever a snapshot
//! or catalog push needs them.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Stable identifier of an activity node
///
/// Ids are strings on the wire. Clients are allowed to send numeric ids, which
/// are coerced to their decimal form so `3` and `"3"` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ActivityId(String);

impl ActivityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the id of a child node, e.g. `q1` + `ans` -> `q1-ans`
    pub fn child(&self, suffix: impl fmt::Display) -> Self {
        Self(format!("{}-{}", self.0, suffix))
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActivityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ActivityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for ActivityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(id) => Self(id),
            RawId::Unsigned(id) => Self(id.to_string()),
            RawId::Signed(id) => Self(id.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "img")]
    Image,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "txt")]
    Text,
}

/// Tag shared by activities and the interaction state overlaid on them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    Media(MediaType),
    Reveal,
    FourChoice,
    MediaList,
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ActivityType::Media(MediaType::Image) => "img",
            ActivityType::Media(MediaType::Audio) => "audio",
            ActivityType::Media(MediaType::Video) => "video",
            ActivityType::Media(MediaType::Text) => "txt",
            ActivityType::Reveal => "reveal",
            ActivityType::FourChoice => "4 choice",
            ActivityType::MediaList => "media list",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFit {
    Cover,
    Contain,
}

/// Playback pause points in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PauseAt {
    Single(f64),
    List(Vec<f64>),
}

/// Leaf payload of a media activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<MediaFit>,
    #[serde(rename = "autoPlay", default, skip_serializing_if = "Option::is_none")]
    pub auto_play: Option<bool>,
    #[serde(rename = "pauseAt", default, skip_serializing_if = "Option::is_none")]
    pub pause_at: Option<PauseAt>,
}

impl Media {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            fit: None,
            auto_play: None,
            pause_at: None,
        }
    }
}

/// Nested wire representation of one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ActivityId>,
    #[serde(flatten)]
    pub content: ActivityContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActivityContent {
    #[serde(rename = "img")]
    Image(Media),
    #[serde(rename = "audio")]
    Audio(Media),
    #[serde(rename = "video")]
    Video(Media),
    #[serde(rename = "txt")]
    Text(Media),
    #[serde(rename = "reveal")]
    Reveal {
        question: Box<Activity>,
        answer: Box<Activity>,
    },
    #[serde(rename = "4 choice")]
    FourChoice {
        a: Box<Activity>,
        b: Box<Activity>,
        c: Box<Activity>,
        d: Box<Activity>,
    },
    #[serde(rename = "media list")]
    MediaList { items: Vec<Activity> },
}

impl ActivityContent {
    pub fn media(media_type: MediaType, media: Media) -> Self {
        match media_type {
            MediaType::Image => ActivityContent::Image(media),
            MediaType::Audio => ActivityContent::Audio(media),
            MediaType::Video => ActivityContent::Video(media),
            MediaType::Text => ActivityContent::Text(media),
        }
    }
}

impl Activity {
    pub fn new(id: impl Into<ActivityId>, content: ActivityContent) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            content,
        }
    }

    pub fn activity_type(&self) -> ActivityType {
        match &self.content {
            ActivityContent::Image(_) => ActivityType::Media(MediaType::Image),
            ActivityContent::Audio(_) => ActivityType::Media(MediaType::Audio),
            ActivityContent::Video(_) => ActivityType::Media(MediaType::Video),
            ActivityContent::Text(_) => ActivityType::Media(MediaType::Text),
            ActivityContent::Reveal { .. } => ActivityType::Reveal,
            ActivityContent::FourChoice { .. } => ActivityType::FourChoice,
            ActivityContent::MediaList { .. } => ActivityType::MediaList,
        }
    }

    /// Returns the media payload when this node is a leaf
    pub fn as_media(&self) -> Option<(MediaType, &Media)> {
        match &self.content {
            ActivityContent::Image(m) => Some((MediaType::Image, m)),
            ActivityContent::Audio(m) => Some((MediaType::Audio, m)),
            ActivityContent::Video(m) => Some((MediaType::Video, m)),
            ActivityContent::Text(m) => Some((MediaType::Text, m)),
            _ => None,
        }
    }
}

/// Arena node: an activity whose children are referenced by id
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityNode {
    pub id: ActivityId,
    pub parent_id: Option<ActivityId>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Media(MediaType, Media),
    Reveal {
        question: ActivityId,
        answer: ActivityId,
    },
    FourChoice {
        choices: [ActivityId; 4],
    },
    MediaList {
        items: Vec<ActivityId>,
    },
}

impl ActivityNode {
    pub fn activity_type(&self) -> ActivityType {
        match &self.kind {
            NodeKind::Media(media_type, _) => ActivityType::Media(*media_type),
            NodeKind::Reveal { .. } => ActivityType::Reveal,
            NodeKind::FourChoice { .. } => ActivityType::FourChoice,
            NodeKind::MediaList { .. } => ActivityType::MediaList,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("duplicate activity id {0}")]
    DuplicateId(ActivityId),
    #[error("catalog key {key} does not match activity id {id}")]
    KeyMismatch { key: ActivityId, id: ActivityId },
}

/// The immutable activity catalog
///
/// Top-level entries keep their insertion order. Every node of every tree is
/// addressable by id, so ids must be unique across the whole catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activities {
    nodes: HashMap<ActivityId, ActivityNode>,
    top_level: Vec<ActivityId>,
}

impl Activities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from top-level trees, failing on the first bad entry
    pub fn from_trees(
        trees: impl IntoIterator<Item = Activity>,
    ) -> Result<Self, CatalogError> {
        let mut activities = Self::new();
        for tree in trees {
            activities.insert(tree)?;
        }
        Ok(activities)
    }

    /// Adds a top-level activity and all of its descendants
    ///
    /// Insertion is all-or-nothing: if any node id is already taken (or
    /// repeated inside the tree) the catalog is left untouched.
    pub fn insert(&mut self, tree: Activity) -> Result<(), CatalogError> {
        let mut flattened = Vec::new();
        flatten(tree, &mut flattened);

        let mut seen = std::collections::HashSet::new();
        for node in &flattened {
            if self.nodes.contains_key(&node.id) || !seen.insert(node.id.clone()) {
                return Err(CatalogError::DuplicateId(node.id.clone()));
            }
        }

        if let Some(root) = flattened.first() {
            self.top_level.push(root.id.clone());
        }
        for node in flattened {
            self.nodes.insert(node.id.clone(), node);
        }
        Ok(())
    }

    /// Looks up a top-level catalog entry
    pub fn get(&self, id: &ActivityId) -> Option<&ActivityNode> {
        self.nodes.get(id).filter(|_| self.contains(id))
    }

    /// True if `id` is a top-level catalog entry
    pub fn contains(&self, id: &ActivityId) -> bool {
        self.top_level.contains(id)
    }

    /// Looks up any node, nested or not
    pub fn node(&self, id: &ActivityId) -> Option<&ActivityNode> {
        self.nodes.get(id)
    }

    /// Rebuilds the nested tree rooted at `id`
    pub fn tree(&self, id: &ActivityId) -> Option<Activity> {
        let node = self.nodes.get(id)?;
        let content = match &node.kind {
            NodeKind::Media(media_type, media) => ActivityContent::media(*media_type, media.clone()),
            NodeKind::Reveal { question, answer } => ActivityContent::Reveal {
                question: Box::new(self.tree(question)?),
                answer: Box::new(self.tree(answer)?),
            },
            NodeKind::FourChoice { choices } => {
                let [a, b, c, d] = choices;
                ActivityContent::FourChoice {
                    a: Box::new(self.tree(a)?),
                    b: Box::new(self.tree(b)?),
                    c: Box::new(self.tree(c)?),
                    d: Box::new(self.tree(d)?),
                }
            }
            NodeKind::MediaList { items } => ActivityContent::MediaList {
                items: items
                    .iter()
                    .map(|item| self.tree(item))
                    .collect::<Option<Vec<_>>>()?,
            },
        };
        Some(Activity {
            id: node.id.clone(),
            parent_id: node.parent_id.clone(),
            content,
        })
    }

    /// Top-level ids in catalog order
    pub fn ids(&self) -> impl Iterator<Item = &ActivityId> {
        self.top_level.iter()
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        self.top_level.len()
    }

    pub fn is_empty(&self) -> bool {
        self.top_level.is_empty()
    }
}

/// Pushes `tree` and its descendants onto `out`, root first
fn flatten(tree: Activity, out: &mut Vec<ActivityNode>) {
    let Activity {
        id,
        parent_id,
        content,
    } = tree;

    let index = out.len();
    out.push(ActivityNode {
        id: id.clone(),
        parent_id,
        kind: NodeKind::MediaList { items: Vec::new() },
    });

    let kind = match content {
        ActivityContent::Image(media) => NodeKind::Media(MediaType::Image, media),
        ActivityContent::Audio(media) => NodeKind::Media(MediaType::Audio, media),
        ActivityContent::Video(media) => NodeKind::Media(MediaType::Video, media),
        ActivityContent::Text(media) => NodeKind::Media(MediaType::Text, media),
        ActivityContent::Reveal { question, answer } => NodeKind::Reveal {
            question: flatten_child(*question, out),
            answer: flatten_child(*answer, out),
        },
        ActivityContent::FourChoice { a, b, c, d } => NodeKind::FourChoice {
            choices: [
                flatten_child(*a, out),
                flatten_child(*b, out),
                flatten_child(*c, out),
                flatten_child(*d, out),
            ],
        },
        ActivityContent::MediaList { items } => NodeKind::MediaList {
            items: items
                .into_iter()
                .map(|item| flatten_child(item, out))
                .collect(),
        },
    };
    out[index].kind = kind;
}

fn flatten_child(child: Activity, out: &mut Vec<ActivityNode>) -> ActivityId {
    let id = child.id.clone();
    flatten(child, out);
    id
}

impl Serialize for Activities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.top_level.len()))?;
        for id in &self.top_level {
            if let Some(tree) = self.tree(id) {
                map.serialize_entry(id, &tree)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Activities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<ActivityId, Activity>::deserialize(deserializer)?;
        let mut activities = Activities::new();
        for (key, tree) in entries {
            if key != tree.id {
                return Err(de::Error::custom(CatalogError::KeyMismatch {
                    key,
                    id: tree.id,
                }));
            }
            activities.insert(tree).map_err(de::Error::custom)?;
        }
        Ok(activities)
    }
}
