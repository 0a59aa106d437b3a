use tracing::info;

use super::WatchRegistry;
use crate::db::{StoreError, WatchKey};

impl WatchRegistry {
    /// Recreates one task per persisted watch entry after a restart.
    ///
    /// Stored intervals below the configured minimum are raised to it on
    /// disk before scheduling; `added_at_unix` and `last_status` stay as they
    /// were. Returns the number of tasks started.
    pub async fn restore_on_start(&self) -> Result<usize, StoreError> {
        let min = self.context().min_interval_seconds;
        let entries: Vec<(WatchKey, u64)> = self
            .context()
            .store
            .mutate(|ds| {
                for owner_data in ds.owners.values_mut() {
                    for entry in owner_data.items.values_mut() {
                        if entry.interval_seconds < min {
                            entry.interval_seconds = min;
                        }
                    }
                }
                ds.iter_entries()
                    .map(|(key, entry)| (key, entry.interval_seconds))
                    .collect()
            })
            .await?;

        for (key, interval_seconds) in &entries {
            self.start(&key.owner, &key.uid, *interval_seconds).await;
        }
        info!(count = entries.len(), "Restored watch tasks from store.");
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::checker::ProbeStatus::Error;
    use crate::db::{WatchEntry, WatchKey};
    use crate::monitor::testing::{Harness, TEST_MIN_INTERVAL};
    use crate::server::config::NotifyPolicy;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_restore_starts_one_task_per_entry() {
        let h = Harness::new(NotifyPolicy::OnChange, vec![Error]);
        let mut live = WatchEntry::new("42", 30, 100);
        live.last_status = Some(true);
        h.seed_entry("7", live).await;
        h.seed_entry("7", WatchEntry::new("43", 1, 200)).await;
        h.seed_entry("8", WatchEntry::new("42", 600, 300)).await;

        let registry = h.registry();

        assert_eq!(registry.restore_on_start().await.unwrap(), 3);
        let before = h.ctx.store.load().await.unwrap();
        let raised = h.stored_entry("7", "43").await.unwrap();
        assert_eq!(raised.interval_seconds, TEST_MIN_INTERVAL);
        assert_eq!(raised.added_at_unix, 200);
        let kept = h.stored_entry("7", "42").await.unwrap();
        assert_eq!(kept.interval_seconds, 30);
        assert_eq!(kept.last_status, Some(true));
        assert_eq!(registry.active_count().await, 3);
        assert_eq!(registry.interval_of("7", "42").await, Some(30));
        assert_eq!(registry.interval_of("7", "43").await, Some(TEST_MIN_INTERVAL));
        assert_eq!(registry.interval_of("8", "42").await, Some(600));
        assert_eq!(
            registry.active_keys("7").await,
            vec![WatchKey::new("7", "42"), WatchKey::new("7", "43")]
        );

        // Probes only errored, so nothing persisted may have changed.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.ctx.store.load().await.unwrap(), before);

        // Restoring again replaces rather than duplicates.
        assert_eq!(registry.restore_on_start().await.unwrap(), 3);
        assert_eq!(registry.active_count().await, 3);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_with_empty_store() {
        let h = Harness::new(NotifyPolicy::OnChange, vec![Error]);
        let registry = h.registry();
        assert_eq!(registry.restore_on_start().await.unwrap(), 0);
        assert_eq!(registry.active_count().await, 0);
    }
}
