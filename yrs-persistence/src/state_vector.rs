//! Per-document state vector cache.
//!
//! A cached vector is trusted only while its clock equals the update log's
//! current clock; any append after it was computed makes it stale.

use crate::storage::{
    Clock, Collection, DocumentStore, Filter, Record, Sort, StateVectorRecord, StoreError,
};
use crate::update_log::UpdateLog;

/// State vector cache view over a document store.
pub struct StateVectorCache<'a, S> {
    store: &'a S,
}

impl<'a, S: DocumentStore> StateVectorCache<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Last cached record of a document, `None` on a cache miss.
    pub async fn read(&self, doc_name: &str) -> Result<Option<StateVectorRecord>, StoreError> {
        match self
            .store
            .find_one(Collection::StateVectors, &Filter::doc(doc_name))
            .await?
        {
            Some(record) => Ok(Some(record.into_state_vector()?)),
            None => Ok(None),
        }
    }

    /// Insert or replace the document's cached vector.
    pub async fn write(
        &self,
        doc_name: &str,
        state_vector: Vec<u8>,
        clock: Clock,
    ) -> Result<(), StoreError> {
        let record = Record::StateVector(StateVectorRecord {
            doc_name: doc_name.to_string(),
            state_vector,
            clock,
        });
        self.store
            .update_one(Collection::StateVectors, &Filter::doc(doc_name), record, true)
            .await?;
        Ok(())
    }

    /// Whether the cached vector covers every stored update.
    ///
    /// A cache miss is never fresh.
    pub async fn is_fresh(&self, doc_name: &str) -> Result<bool, StoreError> {
        let Some(cached) = self.read(doc_name).await? else {
            return Ok(false);
        };
        let current = UpdateLog::new(self.store).current_clock(doc_name).await?;
        Ok(current == Some(cached.clock))
    }

    /// Every cached record, one per document that has received an update.
    pub async fn list(&self) -> Result<Vec<StateVectorRecord>, StoreError> {
        self.store
            .find(Collection::StateVectors, &Filter::all(), Sort::Ascending, None)
            .await?
            .into_iter()
            .map(Record::into_state_vector)
            .collect()
    }

    pub async fn delete(&self, doc_name: &str) -> Result<u64, StoreError> {
        self.store
            .delete_one(Collection::StateVectors, &Filter::doc(doc_name))
            .await
    }
}
