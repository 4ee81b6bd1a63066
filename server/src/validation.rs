//! Validation of untrusted payloads carried by client commands
//!
//! `SetActivity` states and `SendEffect` effects arrive as raw JSON. They are
//! only turned into typed values here, once the server can check them
//! against what the game actually allows.

use log::debug;
use serde_json::{Map, Value};
use shared::{Activities, ActiveFourChoice, ActiveState, ActivityId, ChoiceState, Effect};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("active state must be a JSON object")]
    NotAnObject,
    #[error("unsupported activity type {0}")]
    UnsupportedActivityType(String),
    #[error("reveal state must include a boolean 'showAnswer'")]
    MissingShowAnswer,
    #[error("media list state must include an integer 'activeIndex'")]
    MissingActiveIndex,
    #[error("malformed effect: {0}")]
    InvalidEffect(#[source] serde_json::Error),
    #[error("no activity found for effect targeting {0}")]
    UnknownActivity(ActivityId),
}

/// Turns an untrusted interaction state into a typed `ActiveState`
///
/// Four-choice branches are validated recursively. A branch that is absent
/// or not an object is omitted, a branch that is itself a four-choice state
/// is dropped, and any other error inside a branch fails the whole state.
pub fn validate_active_state(raw: &Value) -> Result<ActiveState, ValidationError> {
    let object = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    match object.get("type").and_then(Value::as_str) {
        Some("4 choice") => Ok(ActiveState::FourChoice(ActiveFourChoice {
            a: validate_choice(object, "a")?,
            b: validate_choice(object, "b")?,
            c: validate_choice(object, "c")?,
            d: validate_choice(object, "d")?,
        })),
        Some("reveal") => object
            .get("showAnswer")
            .and_then(Value::as_bool)
            .map(ActiveState::reveal)
            .ok_or(ValidationError::MissingShowAnswer),
        Some("media list") => object
            .get("activeIndex")
            .and_then(Value::as_i64)
            .map(ActiveState::media_list)
            .ok_or(ValidationError::MissingActiveIndex),
        Some(other) => Err(ValidationError::UnsupportedActivityType(other.to_string())),
        None => Err(ValidationError::UnsupportedActivityType(
            object.get("type").cloned().unwrap_or(Value::Null).to_string(),
        )),
    }
}

fn validate_choice(
    object: &Map<String, Value>,
    option: &str,
) -> Result<Option<ChoiceState>, ValidationError> {
    let Some(branch) = object.get(option).filter(|value| value.is_object()) else {
        return Ok(None);
    };

    match ChoiceState::try_from(validate_active_state(branch)?) {
        Ok(choice) => Ok(Some(choice)),
        Err(_) => {
            debug!("Dropping nested four-choice state in option {}", option);
            Ok(None)
        }
    }
}

/// Decodes an effect and checks that it resolves against the catalog
///
/// The effect's parent, or its target when no parent is given, must be a
/// top-level catalog entry.
pub fn validate_effect(raw: &Value, activities: &Activities) -> Result<Effect, ValidationError> {
    let effect: Effect =
        serde_json::from_value(raw.clone()).map_err(ValidationError::InvalidEffect)?;

    let key = effect.catalog_key();
    if !activities.contains(key) {
        return Err(ValidationError::UnknownActivity(key.clone()));
    }

    Ok(effect)
}
