use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies one watch: the owner it belongs to and the watched UID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey {
    pub owner: String,
    pub uid: String,
}

impl WatchKey {
    pub fn new(owner: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            uid: uid.into(),
        }
    }
}

impl std::fmt::Display for WatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.owner, self.uid)
    }
}

/// One monitored UID for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    #[serde(rename = "interval", default)]
    pub interval_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<bool>,
    #[serde(default)]
    pub added_at_unix: i64,
}

impl WatchEntry {
    pub fn new(uid: impl Into<String>, interval_seconds: u64, added_at_unix: i64) -> Self {
        Self {
            uid: uid.into(),
            note: String::new(),
            interval_seconds,
            last_status: None,
            added_at_unix,
        }
    }
}

/// Per-owner container of watches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerData {
    #[serde(rename = "default_interval")]
    pub default_interval_seconds: u64,
    pub items: BTreeMap<String, WatchEntry>,
}

impl OwnerData {
    pub fn new(default_interval_seconds: u64) -> Self {
        Self {
            default_interval_seconds,
            items: BTreeMap::new(),
        }
    }

    /// Entries ordered for display: oldest first, UID as tie-breaker.
    pub fn sorted_entries(&self) -> Vec<WatchEntry> {
        let mut rows: Vec<WatchEntry> = self.items.values().cloned().collect();
        rows.sort_by(|a, b| {
            a.added_at_unix
                .cmp(&b.added_at_unix)
                .then_with(|| a.uid.cmp(&b.uid))
        });
        rows
    }
}

/// Owner id -> owner data. This is the whole persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataStore {
    pub owners: BTreeMap<String, OwnerData>,
}

impl DataStore {
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn owner(&self, owner: &str) -> Option<&OwnerData> {
        self.owners.get(owner)
    }

    pub fn owner_mut(&mut self, owner: &str) -> Option<&mut OwnerData> {
        self.owners.get_mut(owner)
    }

    /// Returns the owner's record, creating it with `default_interval_seconds`
    /// if it does not exist yet.
    pub fn owner_or_insert(&mut self, owner: &str, default_interval_seconds: u64) -> &mut OwnerData {
        self.owners
            .entry(owner.to_string())
            .or_insert_with(|| OwnerData::new(default_interval_seconds))
    }

    pub fn entry(&self, key: &WatchKey) -> Option<&WatchEntry> {
        self.owners.get(&key.owner)?.items.get(&key.uid)
    }

    pub fn entry_mut(&mut self, key: &WatchKey) -> Option<&mut WatchEntry> {
        self.owners.get_mut(&key.owner)?.items.get_mut(&key.uid)
    }

    /// Total number of watch entries across all owners.
    pub fn total_entries(&self) -> usize {
        self.owners.values().map(|o| o.items.len()).sum()
    }

    /// Every (key, entry) pair in the store.
    pub fn iter_entries(&self) -> impl Iterator<Item = (WatchKey, &WatchEntry)> {
        self.owners.iter().flat_map(|(owner, data)| {
            data.items
                .iter()
                .map(move |(uid, entry)| (WatchKey::new(owner.as_str(), uid.as_str()), entry))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serialization_omits_unknown_fields() {
        let entry = WatchEntry::new("42", 30, 1_700_000_000);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["uid"], "42");
        assert_eq!(json["interval"], 30);
        assert_eq!(json["added_at_unix"], 1_700_000_000i64);
        assert!(json.get("note").is_none());
        assert!(json.get("last_status").is_none());
    }

    #[test]
    fn test_sorted_entries_orders_by_added_at() {
        let mut owner = OwnerData::new(60);
        owner.items.insert("3".into(), WatchEntry::new("3", 60, 300));
        owner.items.insert("1".into(), WatchEntry::new("1", 60, 100));
        owner.items.insert("2".into(), WatchEntry::new("2", 60, 100));

        let uids: Vec<String> = owner.sorted_entries().into_iter().map(|e| e.uid).collect();
        assert_eq!(uids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_iter_entries_covers_all_owners() {
        let mut ds = DataStore::default();
        ds.owner_or_insert("7", 60)
            .items
            .insert("42".into(), WatchEntry::new("42", 60, 1));
        ds.owner_or_insert("8", 60)
            .items
            .insert("43".into(), WatchEntry::new("43", 60, 1));
        ds.owner_or_insert("9", 60);

        assert_eq!(ds.total_entries(), 2);
        let keys: Vec<WatchKey> = ds.iter_entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![WatchKey::new("7", "42"), WatchKey::new("8", "43")]);
        assert!(ds.entry(&WatchKey::new("8", "43")).is_some());
        assert!(ds.entry(&WatchKey::new("9", "43")).is_none());
    }
}
