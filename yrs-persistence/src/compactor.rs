//! Update log compaction.
//!
//! ```text
//!  before:  clock 0 ── clock 1 ── clock 2 ── … ── clock N      sv @ k ≤ N
//!                         │ merge engine
//!                         ▼
//!  after:                                        clock N      sv @ N
//!                                               (merged)
//! ```
//!
//! The consolidated record keeps the highest clock, so appends continue
//! from where they were and the clock never moves backwards. The writes are
//! not atomic in the store; the execution queue keeps other operations of
//! the same instance from observing the intermediate states.

use crate::error::PersistenceResult;
use crate::merge::{MergeEngine, MergedState};
use crate::state_vector::StateVectorCache;
use crate::storage::{Clock, DocumentStore};
use crate::update_log::UpdateLog;

/// Result of a flush that found updates to consolidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Clock of the surviving consolidated record
    pub clock: Clock,
    /// Fresh state vector, now cached at `clock`
    pub state_vector: Vec<u8>,
    /// Superseded records removed
    pub removed: u64,
}

/// Collapses a document's update log into one record.
pub struct Compactor<'a, S, M> {
    store: &'a S,
    engine: &'a M,
}

impl<'a, S: DocumentStore, M: MergeEngine> Compactor<'a, S, M> {
    pub fn new(store: &'a S, engine: &'a M) -> Self {
        Self { store, engine }
    }

    /// Read, merge and write back the whole log of a document.
    ///
    /// Returns `None` when the document has no updates.
    pub async fn flush(&self, doc_name: &str) -> PersistenceResult<Option<FlushOutcome>> {
        let updates = UpdateLog::new(self.store).read_all(doc_name).await?;
        if updates.is_empty() {
            return Ok(None);
        }
        let merged = self.engine.merge_updates(&updates)?;
        self.write_back(doc_name, merged).await
    }

    /// Store an already merged state as the document's only update.
    pub async fn write_back(
        &self,
        doc_name: &str,
        merged: MergedState,
    ) -> PersistenceResult<Option<FlushOutcome>> {
        let log = UpdateLog::new(self.store);
        let Some(clock) = log.current_clock(doc_name).await? else {
            return Ok(None);
        };

        log.put_at(doc_name, clock, merged.update).await?;
        StateVectorCache::new(self.store)
            .write(doc_name, merged.state_vector.clone(), clock)
            .await?;
        let removed = log.delete_below(doc_name, clock).await?;

        log::debug!("Flushed doc {doc_name} at clock {clock} ({removed} updates superseded)");
        Ok(Some(FlushOutcome {
            clock,
            state_vector: merged.state_vector,
            removed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::test_support::{content, make_update};
    use crate::merge::YrsMergeEngine;
    use crate::storage::{Collection, MemoryStore};
    use yrs::Doc;

    async fn seed(store: &MemoryStore, texts: &[&str]) {
        let log = UpdateLog::new(store);
        let source = Doc::new();
        for text in texts {
            log.append(&YrsMergeEngine, "doc", make_update(&source, text))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_flush_collapses_to_last_clock() {
        let store = MemoryStore::new();
        seed(&store, &["a", "b", "c", "d"]).await;

        let outcome = Compactor::new(&store, &YrsMergeEngine)
            .flush("doc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.clock, 3);
        assert_eq!(outcome.removed, 3);
        assert_eq!(store.count(Collection::Updates).await, 1);

        let log = UpdateLog::new(&store);
        assert_eq!(log.current_clock("doc").await.unwrap(), Some(3));

        let mut doc = Doc::new();
        YrsMergeEngine
            .apply_updates(&mut doc, &log.read_all("doc").await.unwrap())
            .unwrap();
        assert_eq!(content(&doc), "abcd");

        let cache = StateVectorCache::new(&store);
        assert!(cache.is_fresh("doc").await.unwrap());
        assert_eq!(cache.read("doc").await.unwrap().unwrap().state_vector, outcome.state_vector);
    }

    #[tokio::test]
    async fn test_flush_is_idempotent() {
        let store = MemoryStore::new();
        seed(&store, &["x", "y"]).await;
        let compactor = Compactor::new(&store, &YrsMergeEngine);

        let first = compactor.flush("doc").await.unwrap().unwrap();
        let second = compactor.flush("doc").await.unwrap().unwrap();
        assert_eq!(first.clock, second.clock);
        assert_eq!(first.state_vector, second.state_vector);
        assert_eq!(second.removed, 0);
        assert_eq!(store.count(Collection::Updates).await, 1);
    }

    #[tokio::test]
    async fn test_appends_continue_after_flush() {
        let store = MemoryStore::new();
        seed(&store, &["a", "b", "c"]).await;
        Compactor::new(&store, &YrsMergeEngine).flush("doc").await.unwrap();

        let clock = UpdateLog::new(&store)
            .append(&YrsMergeEngine, "doc", make_update(&Doc::new(), "z"))
            .await
            .unwrap();
        assert_eq!(clock, 3);
        assert!(!StateVectorCache::new(&store).is_fresh("doc").await.unwrap());
    }

    #[tokio::test]
    async fn test_flush_empty_document() {
        let store = MemoryStore::new();
        let outcome = Compactor::new(&store, &YrsMergeEngine).flush("missing").await.unwrap();
        assert_eq!(outcome, None);
        assert_eq!(store.count(Collection::StateVectors).await, 0);
    }
}
