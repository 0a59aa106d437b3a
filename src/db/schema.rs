//! On-disk schema versions of the watch store and the migrations between them.
use std::collections::BTreeMap;

use super::models::{DataStore, OwnerData, WatchEntry};

/// First layout: owner -> uid -> entry, without a per-owner default interval.
pub type LegacyDataStore = BTreeMap<String, BTreeMap<String, WatchEntry>>;

/// Every schema version the store knows how to read.
#[derive(Debug)]
pub enum StoredSchema {
    Current(DataStore),
    Legacy(LegacyDataStore),
}

impl StoredSchema {
    /// Parses `bytes` as the current schema, falling back to the legacy one.
    /// Returns the error of the current-schema attempt when neither matches.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        match serde_json::from_slice::<DataStore>(bytes) {
            Ok(ds) => Ok(StoredSchema::Current(ds)),
            Err(current_err) => match serde_json::from_slice::<LegacyDataStore>(bytes) {
                Ok(legacy) => Ok(StoredSchema::Legacy(legacy)),
                Err(_) => Err(current_err),
            },
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, StoredSchema::Current(_))
    }

    /// Brings any version up to the current schema.
    pub fn into_current(self, min_interval_seconds: u64) -> DataStore {
        match self {
            StoredSchema::Current(ds) => ds,
            StoredSchema::Legacy(legacy) => migrate_legacy(legacy, min_interval_seconds),
        }
    }
}

/// Wraps each legacy owner map into [`OwnerData`], giving it the minimum
/// interval as default and raising every entry to at least that minimum.
pub fn migrate_legacy(legacy: LegacyDataStore, min_interval_seconds: u64) -> DataStore {
    let owners = legacy
        .into_iter()
        .map(|(owner, items)| {
            let items = items
                .into_iter()
                .map(|(uid, mut entry)| {
                    if entry.uid.is_empty() {
                        entry.uid = uid.clone();
                    }
                    entry.interval_seconds = entry.interval_seconds.max(min_interval_seconds);
                    (uid, entry)
                })
                .collect();
            (
                owner,
                OwnerData {
                    default_interval_seconds: min_interval_seconds,
                    items,
                },
            )
        })
        .collect();
    DataStore { owners }
}
