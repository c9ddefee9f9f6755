//! Text command router
//!
//! Maps one command line to a typed command for one controller. A line is an
//! action name followed by `key=value` extras:
//!
//! ```text
//! playback.offload idx=1 file=440Hz_mp3.mp3
//! playback.seek idx=1 pos=0.25
//! voip.speaker on=true
//! stall record 8000
//! ```
//!
//! Action names may carry the `audio.htc.com.intent.` broadcast prefix.

use std::collections::HashMap;
use std::time::Duration;

use crate::audio::{CaptureFormat, PlaybackCommand, RecordCommand, VoipCommand};
use crate::constants::{GROUP_PLAYBACK, GROUP_RECORD, GROUP_VOIP};
use crate::error::RouteError;

/// Broadcast action namespace accepted in front of action names
pub const ACTION_PREFIX: &str = "audio.htc.com.intent.";

/// Seek position used when `pos` is absent
pub const DEFAULT_SEEK_FRACTION: f32 = 0.5;

/// A parsed command line
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Playback(PlaybackCommand),
    Record(RecordCommand),
    Voip(VoipCommand),
    /// Print slot and watchdog state
    Status,
    /// Block the next backend call of a subsystem
    Stall { target: String, duration: Duration },
}

/// `key=value` extras of one line
struct Extras<'a> {
    values: HashMap<&'a str, &'a str>,
}

impl<'a> Extras<'a> {
    fn parse<I: Iterator<Item = &'a str>>(tokens: I) -> Result<Self, RouteError> {
        let mut values = HashMap::new();
        for token in tokens {
            let (key, value) = token.split_once('=').ok_or_else(|| RouteError::InvalidValue {
                key: token.to_string(),
                value: String::new(),
            })?;
            values.insert(key, value);
        }
        Ok(Self { values })
    }

    fn invalid(key: &str, value: &str) -> RouteError {
        RouteError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn index(&self, key: &str, default: usize) -> Result<usize, RouteError> {
        match self.values.get(key) {
            Some(v) => v.parse().map_err(|_| Self::invalid(key, v)),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, RouteError> {
        self.values
            .get(key)
            .map(|v| match *v {
                "1" | "true" | "on" => Ok(true),
                "0" | "false" | "off" => Ok(false),
                other => Err(Self::invalid(key, other)),
            })
            .transpose()
    }

    fn number(&self, key: &str) -> Result<Option<i64>, RouteError> {
        self.values
            .get(key)
            .map(|v| v.parse().map_err(|_| Self::invalid(key, v)))
            .transpose()
    }

    fn fraction(&self, key: &str, default: f32) -> Result<f32, RouteError> {
        match self.values.get(key) {
            Some(v) => v
                .parse::<f32>()
                .ok()
                .filter(|f| f.is_finite())
                .ok_or_else(|| Self::invalid(key, v)),
            None => Ok(default),
        }
    }

    fn text(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.to_string())
    }
}

impl Route {
    /// Parse one command line
    pub fn parse(line: &str) -> Result<Self, RouteError> {
        let mut tokens = line.split_whitespace();
        let action = tokens.next().ok_or(RouteError::Empty)?;
        let action = action.strip_prefix(ACTION_PREFIX).unwrap_or(action);

        if action == "stall" {
            return Self::parse_stall(tokens);
        }

        let extras = Extras::parse(tokens)?;
        let route = match action {
            "status" => Route::Status,

            "playback.nonoffload" | "playback.offload" => Route::Playback(PlaybackCommand::Start {
                slot: extras.index("idx", 0)?,
                offload: action == "playback.offload",
                file: extras.text("file"),
            }),
            "playback.stop" => Route::Playback(PlaybackCommand::Stop {
                slot: extras.index("idx", 0)?,
            }),
            "playback.seek" => Route::Playback(PlaybackCommand::Seek {
                slot: extras.index("idx", 0)?,
                fraction: extras.fraction("pos", DEFAULT_SEEK_FRACTION)?,
            }),
            "playback.pause.resume" => Route::Playback(PlaybackCommand::PauseResume {
                slot: extras.index("idx", 0)?,
            }),

            "record.start" | "record.start24" => Route::Record(RecordCommand::Start {
                slot: extras.index("idx", 0)?,
                format: if action == "record.start24" {
                    CaptureFormat::PcmHd
                } else {
                    CaptureFormat::Pcm16
                },
            }),
            "record.stop" => Route::Record(RecordCommand::Stop {
                slot: extras.index("idx", 0)?,
            }),

            "voip.start" => Route::Voip(VoipCommand::Start),
            "voip.stop" => Route::Voip(VoipCommand::Stop),
            "voip.mute.output" => {
                // `idx` doubles as the mute flag for older senders: non-zero mutes
                let muted = match extras.flag("mute")? {
                    Some(muted) => muted,
                    None => extras.number("idx")?.map(|n| n != 0).unwrap_or(true),
                };
                Route::Voip(VoipCommand::Mute(muted))
            }
            "voip.speaker" => {
                let on = match extras.flag("on")? {
                    Some(on) => on,
                    None => extras.flag("use")?.unwrap_or(false),
                };
                Route::Voip(VoipCommand::SwitchSpeaker(on))
            }

            other => return Err(RouteError::UnknownAction(other.to_string())),
        };
        Ok(route)
    }

    fn parse_stall<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<Self, RouteError> {
        let target = tokens.next().ok_or(RouteError::MissingArgument("subsystem"))?;
        if ![GROUP_PLAYBACK, GROUP_RECORD, GROUP_VOIP].contains(&target) {
            return Err(RouteError::InvalidValue {
                key: "subsystem".to_string(),
                value: target.to_string(),
            });
        }

        let ms = tokens.next().ok_or(RouteError::MissingArgument("ms"))?;
        let ms: u64 = ms.parse().map_err(|_| RouteError::InvalidValue {
            key: "ms".to_string(),
            value: ms.to_string(),
        })?;

        Ok(Route::Stall {
            target: target.to_string(),
            duration: Duration::from_millis(ms),
        })
    }
}
