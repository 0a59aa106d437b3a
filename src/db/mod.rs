pub mod models;
pub mod schema;
pub mod store;

pub use models::{DataStore, OwnerData, WatchEntry, WatchKey};
pub use store::{FileStore, StoreError};
