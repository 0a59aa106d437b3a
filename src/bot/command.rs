use thiserror::Error;

use crate::commands::{IntervalError, parse_interval};

const ADD_USAGE: &str = "/add <uid> [interval] [note]";
const REMOVE_USAGE: &str = "/remove <uid>";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("Wrong syntax. Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid interval ({0}). Use a value such as 30s, 10m, 1h or 1d.")]
    Interval(#[from] IntervalError),
}

/// A chat command understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Help,
    Add {
        uid: String,
        interval_seconds: Option<u64>,
        note: String,
    },
    List,
    Stats,
    Remove {
        uid: String,
    },
    Clear,
    /// Shows the default interval, or sets it when one is given.
    Default {
        interval_seconds: Option<u64>,
    },
}

impl BotCommand {
    /// Parses one chat message. Returns `Ok(None)` for text that is not a
    /// known command, which the bot ignores.
    pub fn parse(text: &str) -> Result<Option<Self>, CommandParseError> {
        let mut parts = text.split_whitespace();
        let Some(head) = parts.next() else {
            return Ok(None);
        };
        let Some(name) = head.strip_prefix('/') else {
            return Ok(None);
        };
        // Group chats address commands as `/add@SomeBot`.
        let name = name.split('@').next().unwrap_or(name).to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();

        let command = match name.as_str() {
            "start" | "help" => Self::Help,
            "add" => Self::parse_add(&args)?,
            "list" => Self::List,
            "stats" => Self::Stats,
            "remove" | "stop" => match args.first() {
                Some(uid) => Self::Remove {
                    uid: uid.to_string(),
                },
                None => return Err(CommandParseError::Usage(REMOVE_USAGE)),
            },
            "clear" => Self::Clear,
            "default" => Self::Default {
                interval_seconds: args.first().map(|s| parse_interval(s)).transpose()?,
            },
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    fn parse_add(args: &[&str]) -> Result<Self, CommandParseError> {
        let Some((uid, rest)) = args.split_first() else {
            return Err(CommandParseError::Usage(ADD_USAGE));
        };

        // The interval is optional; a second word that looks numeric is taken
        // as the interval, anything else starts the note.
        let (interval_seconds, note_words) = match rest.split_first() {
            Some((word, tail)) if looks_like_interval(word) => (Some(parse_interval(word)?), tail),
            _ => (None, rest),
        };

        Ok(Self::Add {
            uid: uid.to_string(),
            interval_seconds,
            note: note_words.join(" "),
        })
    }
}

fn looks_like_interval(word: &str) -> bool {
    word.starts_with(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == '+')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Option<BotCommand> {
        BotCommand::parse(text).unwrap()
    }

    #[test]
    fn test_add_variants() {
        assert_eq!(
            parse("/add 1000123456789 30s backup account"),
            Some(BotCommand::Add {
                uid: "1000123456789".into(),
                interval_seconds: Some(30),
                note: "backup account".into(),
            })
        );
        assert_eq!(
            parse("/add 42"),
            Some(BotCommand::Add {
                uid: "42".into(),
                interval_seconds: None,
                note: String::new(),
            })
        );
        assert_eq!(
            parse("/add 42 old   profile"),
            Some(BotCommand::Add {
                uid: "42".into(),
                interval_seconds: None,
                note: "old profile".into(),
            })
        );
    }

    #[test]
    fn test_add_errors() {
        assert_eq!(
            BotCommand::parse("/add"),
            Err(CommandParseError::Usage(ADD_USAGE))
        );
        assert_eq!(
            BotCommand::parse("/add 42 0s"),
            Err(CommandParseError::Interval(IntervalError::NonPositive))
        );
        assert!(matches!(
            BotCommand::parse("/add 42 10x"),
            Err(CommandParseError::Interval(IntervalError::Invalid(_)))
        ));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("/start"), Some(BotCommand::Help));
        assert_eq!(parse("/help"), Some(BotCommand::Help));
        assert_eq!(parse("  /list  "), Some(BotCommand::List));
        assert_eq!(parse("/stats"), Some(BotCommand::Stats));
        assert_eq!(parse("/clear"), Some(BotCommand::Clear));
        assert_eq!(
            parse("/stop 42"),
            Some(BotCommand::Remove { uid: "42".into() })
        );
        assert_eq!(
            parse("/remove@UidWatchBot 42"),
            Some(BotCommand::Remove { uid: "42".into() })
        );
        assert_eq!(
            BotCommand::parse("/remove"),
            Err(CommandParseError::Usage(REMOVE_USAGE))
        );
    }

    #[test]
    fn test_default_command() {
        assert_eq!(
            parse("/default"),
            Some(BotCommand::Default {
                interval_seconds: None
            })
        );
        assert_eq!(
            parse("/default 10m"),
            Some(BotCommand::Default {
                interval_seconds: Some(600)
            })
        );
        assert!(BotCommand::parse("/default soon").is_err());
    }

    #[test]
    fn test_ignored_text() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("hello"), None);
        assert_eq!(parse("/starting"), None);
        assert_eq!(parse("/unknown 1 2"), None);
    }
}
