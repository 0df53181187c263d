//! SQLite storage for dbqueue.
//!
//! Provides a persistent message store and a cross-process channel lock
//! sharing one database.

mod mutex;
mod schema;
mod store;

pub use mutex::SqliteMutex;
pub use store::SqliteMessageStore;
