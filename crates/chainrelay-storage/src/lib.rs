//! chainrelay-storage — durable archive backends for ChainRelay.
//!
//! Backends:
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//!
//! The in-memory archive lives in `chainrelay-core` as `MemoryArchive`.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteArchive;
