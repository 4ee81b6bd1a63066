//! Console input: turns typed lines into protocol commands

use shared::{
    ActiveFourChoice, ActiveMediaList, ActiveReveal, ActiveState, ActivityId, ChoiceState, Command,
    Effect, PlaybackAction, PlayerId, ProtocolError,
};
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  buzz [player]             buzz in (defaults to --player)
  enable | disable          turn buzzers on or off
  reset                     clear the buzz order
  select <activity>         select an activity with no interaction state
  clear                     clear the selection
  reveal <activity> <bool>  select a reveal and show or hide its answer
  index <activity> <n>      select a media list at item n
  choice <activity> <a|b|c|d> <bool|n>
                            select a four-choice with one option revealed
                            (bool) or at media item n
  play|pause|restart <activity> [parent]
                            send a playback effect
  help                      show this text
  quit                      disconnect and exit";

#[derive(Debug, Error)]
pub enum InputError {
    #[error("unknown command '{0}', type 'help' for a list")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("no player given and no --player set")]
    NoPlayer,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Send(Command),
    Help,
    Quit,
    Empty,
}

/// Parses console lines, remembering which player this console buzzes for
#[derive(Debug, Clone, Default)]
pub struct InputParser {
    player_id: Option<PlayerId>,
}

impl InputParser {
    pub fn new(player_id: Option<PlayerId>) -> Self {
        Self { player_id }
    }

    pub fn parse(&self, line: &str) -> Result<Input, InputError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Input::Empty);
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("help" | "?", _) => return Ok(Input::Help),
            ("quit" | "exit", _) => return Ok(Input::Quit),

            ("buzz", []) => Command::Buzz {
                player_id: self.player_id.ok_or(InputError::NoPlayer)?,
            },
            ("buzz", [id]) => Command::Buzz {
                player_id: PlayerId(parse_number(id)?),
            },
            ("buzz", _) => return Err(InputError::Usage("buzz [player]")),

            ("enable", []) => Command::EnableBuzzers { enabled: true },
            ("disable", []) => Command::EnableBuzzers { enabled: false },
            ("reset", []) => Command::ResetBuzzers,

            ("select", [id]) => Command::set_activity(Some(ActivityId::from(*id)), None)?,
            ("select", _) => return Err(InputError::Usage("select <activity>")),
            ("clear", []) => Command::set_activity(None, None)?,

            ("reveal", [id, show]) => {
                let show_answer = match *show {
                    "true" | "yes" | "on" => true,
                    "false" | "no" | "off" => false,
                    _ => return Err(InputError::Usage("reveal <activity> <true|false>")),
                };
                Command::set_activity(
                    Some(ActivityId::from(*id)),
                    Some(&ActiveState::reveal(show_answer)),
                )?
            }
            ("reveal", _) => return Err(InputError::Usage("reveal <activity> <true|false>")),

            ("index", [id, index]) => {
                let index = index
                    .parse::<i64>()
                    .map_err(|_| InputError::InvalidNumber(index.to_string()))?;
                Command::set_activity(
                    Some(ActivityId::from(*id)),
                    Some(&ActiveState::media_list(index)),
                )?
            }
            ("index", _) => return Err(InputError::Usage("index <activity> <n>")),

            ("choice", [id, option, value]) => {
                let state = choice_state(option, value)?;
                Command::set_activity(
                    Some(ActivityId::from(*id)),
                    Some(&ActiveState::FourChoice(state)),
                )?
            }
            ("choice", _) => return Err(InputError::Usage(CHOICE_USAGE)),

            (action @ ("play" | "pause" | "restart"), [target, rest @ ..]) if rest.len() <= 1 => {
                let action = match action {
                    "play" => PlaybackAction::Play,
                    "pause" => PlaybackAction::Pause,
                    _ => PlaybackAction::Restart,
                };
                let parent = rest.first().map(|parent| ActivityId::from(*parent));
                Command::send_effect(&Effect::playback(action, *target, parent))?
            }
            ("play" | "pause" | "restart", _) => {
                return Err(InputError::Usage("play|pause|restart <activity> [parent]"))
            }

            (other, _) => return Err(InputError::Unknown(other.to_string())),
        };

        Ok(Input::Send(command))
    }
}

const CHOICE_USAGE: &str = "choice <activity> <a|b|c|d> <true|false|n>";

/// Four-choice state with a single option set
fn choice_state(option: &str, value: &str) -> Result<ActiveFourChoice, InputError> {
    let inner = match value {
        "true" | "yes" | "on" => ChoiceState::Reveal(ActiveReveal { show_answer: true }),
        "false" | "no" | "off" => ChoiceState::Reveal(ActiveReveal { show_answer: false }),
        _ => ChoiceState::MediaList(ActiveMediaList {
            active_index: value
                .parse()
                .map_err(|_| InputError::InvalidNumber(value.to_string()))?,
        }),
    };

    let mut state = ActiveFourChoice::default();
    let slot = match option.to_ascii_lowercase().as_str() {
        "a" => &mut state.a,
        "b" => &mut state.b,
        "c" => &mut state.c,
        "d" => &mut state.d,
        _ => return Err(InputError::Usage(CHOICE_USAGE)),
    };
    *slot = Some(inner);
    Ok(state)
}

fn parse_number(text: &str) -> Result<u32, InputError> {
    text.parse()
        .map_err(|_| InputError::InvalidNumber(text.to_string()))
}
