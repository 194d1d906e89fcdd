//! # paporeto-store
//!
//! Persisted local key-value storage for the PapoReto client, backed by
//! SQLite.
//!
//! The store is the string-keyed capability the rest of the client builds on:
//! session and preference blobs, backend credentials and the demo-mode
//! mirrors of groups, statuses and the blocklist.  Values are JSON or plain
//! strings; a value that fails to parse reads as "no data".

pub mod credentials;
pub mod database;
pub mod kv;
pub mod migrations;
pub mod mirror;
pub mod prefs;
pub mod session;
pub mod usage;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use prefs::Preferences;
