//! Game state snapshot and the interaction state overlaid on activities

use crate::activity::{Activity, ActivityType};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Player identifier assigned by the server at roster-load time
///
/// Serialized as a number. Player maps use it as a key, which JSON turns into
/// a string, so decoding accepts both forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u32),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(id) => Ok(PlayerId(id)),
            RawId::Text(text) => text
                .parse()
                .map(PlayerId)
                .map_err(|_| de::Error::custom(format!("invalid player id {:?}", text))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    #[serde(rename = "imgUrl")]
    pub img_url: String,
}

/// One buzz, in the order it was received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuzzEntry {
    #[serde(rename = "playerId")]
    pub player_id: PlayerId,
    pub time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buzzers {
    pub enabled: bool,
    /// Buzz order; only present while buzzers are enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Vec<BuzzEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ActiveState>,
}

/// Full snapshot broadcast on every accepted mutation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub players: BTreeMap<PlayerId, Player>,
    pub buzzers: Buzzers,
    pub active: ActiveSelection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveReveal {
    #[serde(rename = "showAnswer")]
    pub show_answer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMediaList {
    #[serde(rename = "activeIndex")]
    pub active_index: i64,
}

/// Interaction state of the currently selected activity
///
/// Its tag always equals the tag of the activity it is overlaid on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActiveState {
    #[serde(rename = "reveal")]
    Reveal(ActiveReveal),
    #[serde(rename = "4 choice")]
    FourChoice(ActiveFourChoice),
    #[serde(rename = "media list")]
    MediaList(ActiveMediaList),
}

/// State of a single four-choice option
///
/// Options cannot hold another four-choice state, so the depth of an
/// `ActiveState` is bounded at two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChoiceState {
    #[serde(rename = "reveal")]
    Reveal(ActiveReveal),
    #[serde(rename = "media list")]
    MediaList(ActiveMediaList),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFourChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<ChoiceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<ChoiceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<ChoiceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<ChoiceState>,
}

impl ActiveState {
    pub fn activity_type(&self) -> ActivityType {
        match self {
            ActiveState::Reveal(_) => ActivityType::Reveal,
            ActiveState::FourChoice(_) => ActivityType::FourChoice,
            ActiveState::MediaList(_) => ActivityType::MediaList,
        }
    }

    pub fn reveal(show_answer: bool) -> Self {
        ActiveState::Reveal(ActiveReveal { show_answer })
    }

    pub fn media_list(active_index: i64) -> Self {
        ActiveState::MediaList(ActiveMediaList { active_index })
    }
}

impl From<ChoiceState> for ActiveState {
    fn from(choice: ChoiceState) -> Self {
        match choice {
            ChoiceState::Reveal(reveal) => ActiveState::Reveal(reveal),
            ChoiceState::MediaList(list) => ActiveState::MediaList(list),
        }
    }
}

impl TryFrom<ActiveState> for ChoiceState {
    type Error = ActiveFourChoice;

    /// Fails with the nested four-choice state, which options may not hold
    fn try_from(state: ActiveState) -> Result<Self, Self::Error> {
        match state {
            ActiveState::Reveal(reveal) => Ok(ChoiceState::Reveal(reveal)),
            ActiveState::MediaList(list) => Ok(ChoiceState::MediaList(list)),
            ActiveState::FourChoice(nested) => Err(nested),
        }
    }
}

/// Deep structural equality of two interaction states
///
/// Tags must match and every field must be equal; a four-choice option that
/// is present on one side and absent on the other makes the states unequal.
pub fn active_state_equals(a: &ActiveState, b: &ActiveState) -> bool {
    match (a, b) {
        (ActiveState::Reveal(x), ActiveState::Reveal(y)) => x.show_answer == y.show_answer,
        (ActiveState::MediaList(x), ActiveState::MediaList(y)) => x.active_index == y.active_index,
        (ActiveState::FourChoice(x), ActiveState::FourChoice(y)) => {
            choice_equals(&x.a, &y.a)
                && choice_equals(&x.b, &y.b)
                && choice_equals(&x.c, &y.c)
                && choice_equals(&x.d, &y.d)
        }
        _ => false,
    }
}

fn choice_equals(a: &Option<ChoiceState>, b: &Option<ChoiceState>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => active_state_equals(&ActiveState::from(*a), &ActiveState::from(*b)),
        (None, None) => true,
        _ => false,
    }
}
