//! The chat front end: command parsing, dispatch and the Telegram poller.
pub mod command;
pub mod dispatcher;
pub mod telegram;

pub use command::{BotCommand, CommandParseError};
pub use dispatcher::CommandDispatcher;
pub use telegram::{PollError, TelegramPoller};
