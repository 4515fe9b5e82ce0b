//! # yrs-persistence: update-log persistence for Yjs documents
//!
//! Stores collaboratively edited documents as append-only logs of Yjs
//! updates, compacts them into a single consolidated update, caches each
//! document's state vector and keeps a small per-document metadata store.
//!
//! ## Architecture
//!
//! ```text
//!  append_update / get_document / flush / set_meta / …
//!                        │
//!                        ▼
//!              ┌───────────────────┐
//!              │  ExecutionQueue   │  one job at a time, call order
//!              └─────────┬─────────┘
//!                        │
//!     ┌──────────────┬───┴──────────┬──────────────┐
//!     ▼              ▼              ▼              ▼
//! ┌─────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐
//! │UpdateLog│  │StateVector│  │ Compactor │  │ MetaStore │
//! │ (clock) │  │  Cache    │  │ (flush)   │  │           │
//! └────┬────┘  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘
//!      │             │        MergeEngine (yrs)    │
//!      └─────────────┴──────────────┼──────────────┘
//!                                   ▼
//!                          DocumentStore adapter
//!                      (RocksStore │ MemoryStore)
//! ```
//!
//! ## Modules
//!
//! - [`storage`]: Document store adapter trait, RocksDB and in-memory adapters
//! - [`merge`]: Merge engine trait and its `yrs` implementation
//! - [`update_log`]: Clock-indexed append log
//! - [`state_vector`]: Cached per-document state vectors
//! - [`compactor`]: Log compaction (flush)
//! - [`meta`]: Per-document key/value metadata
//! - [`queue`]: Ordered execution of operations, failure reporting
//! - [`persistence`]: Public operation surface
//!
//! ## Example
//!
//! ```no_run
//! use yrs_persistence::{Persistence, PersistenceConfig};
//!
//! # async fn run(update: Vec<u8>) -> Result<(), yrs_persistence::StoreError> {
//! let persistence = Persistence::open("/var/lib/collab", PersistenceConfig::default())?;
//! let clock = persistence.append_update("notes", update).await;
//! let doc = persistence.get_document("notes").await;
//! persistence.close().await;
//! # let _ = (clock, doc);
//! # Ok(())
//! # }
//! ```

pub mod compactor;
pub mod config;
pub mod error;
pub mod merge;
pub mod meta;
pub mod persistence;
pub mod queue;
pub mod state_vector;
pub mod storage;
pub mod update_log;

// Re-exports for convenience
pub use compactor::{Compactor, FlushOutcome};
pub use config::{PersistenceConfig, DEFAULT_DATABASE_NAME, PREFERRED_TRIM_SIZE};
pub use error::{PersistenceError, PersistenceResult};
pub use merge::{MergeEngine, MergeError, MergedState, YrsMergeEngine};
pub use meta::MetaStore;
pub use persistence::Persistence;
pub use queue::{ExecutionQueue, FailedOperation, OpHandle};
pub use state_vector::StateVectorCache;
pub use storage::{
    Clock, Collection, DocumentStore, Filter, MemoryStore, MetaRecord, Record, RocksConfig,
    RocksStore, Sort, StateVectorRecord, StoreError, UpdateRecord,
};
pub use update_log::UpdateLog;
