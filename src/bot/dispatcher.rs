use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, error};

use super::command::BotCommand;
use crate::commands::{WatchError, WatchService, WatchStats};
use crate::db::WatchEntry;

const HELP_TEXT: &str = "Hi! This bot watches whether Facebook UIDs are live.

Commands:
/add <uid> [interval] [note]
  e.g. /add 1000123456789 30s backup account
  without an interval your default applies
/list
/stats
/remove <uid> (or /stop <uid>)
/clear
/default [interval]";

/// Executes chat commands on behalf of an owner and renders the replies.
pub struct CommandDispatcher {
    service: Arc<WatchService>,
}

impl CommandDispatcher {
    pub fn new(service: Arc<WatchService>) -> Self {
        Self { service }
    }

    /// Handles one message from `owner`. Returns the reply to send, or
    /// `None` when the message is not a command.
    pub async fn handle(&self, owner: &str, text: &str) -> Option<String> {
        let command = match BotCommand::parse(text) {
            Ok(Some(command)) => command,
            Ok(None) => return None,
            Err(e) => return Some(e.to_string()),
        };
        debug!(owner = owner, command = ?command, "Dispatching command.");

        let reply = match self.execute(owner, command).await {
            Ok(reply) => reply,
            Err(WatchError::Store(e)) => {
                error!(owner = owner, error = %e, "Command failed on the store.");
                "Could not update your watch list right now, please try again later.".to_string()
            }
            Err(e) => e.to_string(),
        };
        Some(reply)
    }

    async fn execute(&self, owner: &str, command: BotCommand) -> Result<String, WatchError> {
        match command {
            BotCommand::Help => Ok(HELP_TEXT.to_string()),
            BotCommand::Add {
                uid,
                interval_seconds,
                note,
            } => {
                let entry = self
                    .service
                    .add_watch(owner, &uid, interval_seconds, &note)
                    .await?;
                let mut reply = format!(
                    "Watching UID {} every {} seconds.",
                    entry.uid, entry.interval_seconds
                );
                if !entry.note.is_empty() {
                    let _ = write!(reply, "\nNote: {}", entry.note);
                }
                Ok(reply)
            }
            BotCommand::List => Ok(render_list(&self.service.list_watches(owner).await?)),
            BotCommand::Stats => Ok(render_stats(&self.service.stats(owner).await?)),
            BotCommand::Remove { uid } => {
                if self.service.remove_watch(owner, &uid).await? {
                    Ok(format!("Removed UID {uid} from your watch list."))
                } else {
                    Ok(format!("UID {uid} is not on your watch list."))
                }
            }
            BotCommand::Clear => {
                let removed = self.service.clear_owner(owner).await?;
                Ok(format!("Stopped watching all your UIDs ({removed} removed)."))
            }
            BotCommand::Default {
                interval_seconds: None,
            } => {
                let current = self.service.default_interval(owner).await?;
                Ok(format!("Your default interval is {current} seconds."))
            }
            BotCommand::Default {
                interval_seconds: Some(seconds),
            } => {
                let applied = self.service.set_default_interval(owner, seconds).await?;
                Ok(format!(
                    "Default interval set to {applied} seconds and applied to all your UIDs."
                ))
            }
        }
    }
}

fn status_label(last_status: Option<bool>) -> &'static str {
    match last_status {
        Some(true) => "LIVE",
        Some(false) => "DEAD",
        None => "-",
    }
}

fn render_list(entries: &[WatchEntry]) -> String {
    if entries.is_empty() {
        return "You are not watching any UID.".to_string();
    }
    let mut out = String::from("Your watched UIDs:");
    for entry in entries {
        let _ = write!(
            out,
            "\n- {} | {}s | last: {}",
            entry.uid,
            entry.interval_seconds,
            status_label(entry.last_status)
        );
        if !entry.note.is_empty() {
            let _ = write!(out, " | note: {}", entry.note);
        }
    }
    out
}

fn render_stats(stats: &WatchStats) -> String {
    if stats.total == 0 {
        return "No statistics yet (you are not watching any UID).".to_string();
    }
    format!(
        "Your statistics:\n- Total UIDs: {}\n- LIVE: {}\n- DEAD: {}\n- Unknown: {}",
        stats.total, stats.live, stats.dead, stats.unknown
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::ProbeStatus::{Dead, Live};
    use crate::monitor::testing::{Harness, TEST_MIN_INTERVAL};
    use crate::server::config::{EmptyOwnerPolicy, NotifyPolicy};
    use std::time::Duration;

    fn dispatcher_for(h: &Harness) -> CommandDispatcher {
        CommandDispatcher::new(Arc::new(WatchService::new(
            h.ctx.store.clone(),
            Arc::new(h.registry()),
            TEST_MIN_INTERVAL,
            60,
            EmptyOwnerPolicy::Keep,
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_list_stats_remove() {
        let h = Harness::new(NotifyPolicy::OnChange, vec![Live]);
        let d = dispatcher_for(&h);

        assert_eq!(
            d.handle("7", "/add 42 30s main account").await.as_deref(),
            Some("Watching UID 42 every 30 seconds.\nNote: main account")
        );
        assert_eq!(
            d.handle("7", "/add 43").await.as_deref(),
            Some("Watching UID 43 every 60 seconds.")
        );
        tokio::time::sleep(Duration::from_secs(1)).await;

        let list = d.handle("7", "/list").await.unwrap();
        assert!(list.starts_with("Your watched UIDs:"));
        assert!(list.contains("- 42 | 30s | last: LIVE | note: main account"));
        assert!(list.contains("- 43 | 60s | last: LIVE"));

        assert_eq!(
            d.handle("7", "/stats").await.as_deref(),
            Some("Your statistics:\n- Total UIDs: 2\n- LIVE: 2\n- DEAD: 0\n- Unknown: 0")
        );

        assert_eq!(
            d.handle("7", "/remove 42").await.as_deref(),
            Some("Removed UID 42 from your watch list.")
        );
        assert_eq!(
            d.handle("7", "/stop 42").await.as_deref(),
            Some("UID 42 is not on your watch list.")
        );
        assert_eq!(
            d.handle("7", "/clear").await.as_deref(),
            Some("Stopped watching all your UIDs (1 removed).")
        );
        assert_eq!(
            d.handle("7", "/list").await.as_deref(),
            Some("You are not watching any UID.")
        );
        assert_eq!(
            d.handle("7", "/stats").await.as_deref(),
            Some("No statistics yet (you are not watching any UID).")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_interval_commands() {
        let h = Harness::new(NotifyPolicy::OnChange, vec![Dead]);
        let d = dispatcher_for(&h);

        assert_eq!(
            d.handle("7", "/default").await.as_deref(),
            Some("Your default interval is 60 seconds.")
        );
        assert_eq!(
            d.handle("7", "/default 10m").await.as_deref(),
            Some("Default interval set to 600 seconds and applied to all your UIDs.")
        );
        assert_eq!(
            d.handle("7", "/add 42").await.as_deref(),
            Some("Watching UID 42 every 600 seconds.")
        );
        assert_eq!(
            d.handle("7", "/default 1s").await.as_deref(),
            Some("Default interval set to 10 seconds and applied to all your UIDs.")
        );
        assert_eq!(
            d.handle("8", "/default").await.as_deref(),
            Some("Your default interval is 60 seconds.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_and_ignored_messages() {
        let h = Harness::new(NotifyPolicy::OnChange, vec![Live]);
        let d = dispatcher_for(&h);

        assert_eq!(d.handle("7", "hello there").await, None);
        assert_eq!(d.handle("7", "/unknown").await, None);
        assert_eq!(
            d.handle("7", "/add abc 30s").await.as_deref(),
            Some("UID must be numeric, got 'abc'")
        );
        assert_eq!(
            d.handle("7", "/add").await.as_deref(),
            Some("Wrong syntax. Usage: /add <uid> [interval] [note]")
        );
        assert!(
            d.handle("7", "/add 42 -1m")
                .await
                .unwrap()
                .starts_with("Invalid interval")
        );
        assert!(d.handle("7", "/help").await.unwrap().contains("/add <uid>"));
        assert!(h.ctx.store.load().await.unwrap().is_empty());
    }
}
