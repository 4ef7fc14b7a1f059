//! Sample stores for persisted occupancy readings
//!
//! This module provides a trait-based abstraction over where raw round
//! samples are kept and how records and graph windows are read back.
//!
//! ## Design
//!
//! - **Trait-based**: `SampleStore` allows swapping implementations
//! - **Async**: All operations are async for use from the round orchestrator
//! - **Narrow**: Only the reads the monitor needs (max value, time range)
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, samples survive restarts
//! - **In-Memory**: No persistence, for testing or when no storage is configured
//!
//! ## Usage
//!
//! ```no_run
//! use occupancy_monitor::storage::{SampleStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./samples.db").await?;
//!     let record = store.query_max_value("lobby").await?;
//!     println!("{record:?}");
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, QueryRange, SampleStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use schema::{RecordRow, SampleRow};
