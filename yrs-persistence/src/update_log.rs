//! Clock-indexed append log of document updates.
//!
//! Each document owns a run of `UpdateRecord`s keyed by `(doc_name, clock)`.
//! Clocks grow by one per append and never move backwards; compaction may
//! leave gaps below the highest clock, but the highest clock itself is kept.

use crate::error::PersistenceResult;
use crate::merge::MergeEngine;
use crate::state_vector::StateVectorCache;
use crate::storage::{Clock, Collection, DocumentStore, Filter, Record, Sort, StoreError, UpdateRecord};

/// Update log view over a document store.
pub struct UpdateLog<'a, S> {
    store: &'a S,
}

impl<'a, S: DocumentStore> UpdateLog<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Highest stored clock of a document, `None` if it has no updates.
    ///
    /// One reverse-sorted, limit-1 query against the `(doc_name, clock)` key.
    pub async fn current_clock(&self, doc_name: &str) -> Result<Option<Clock>, StoreError> {
        let newest = self
            .store
            .find(Collection::Updates, &Filter::doc(doc_name), Sort::Descending, Some(1))
            .await?;
        match newest.into_iter().next() {
            Some(record) => Ok(Some(record.into_update()?.clock)),
            None => Ok(None),
        }
    }

    /// Append an update at the next clock and return that clock.
    ///
    /// The first update of a document also seeds its state vector at clock 0,
    /// so a state vector exists whenever any update does. A clock taken by a
    /// writer outside this instance surfaces as [`StoreError::DuplicateKey`].
    pub async fn append<M: MergeEngine>(
        &self,
        engine: &M,
        doc_name: &str,
        payload: Vec<u8>,
    ) -> PersistenceResult<Clock> {
        let current = self.current_clock(doc_name).await?;
        let next = current.map_or(0, |clock| clock + 1);

        if current.is_none() {
            let seeded = engine.merge_updates(std::slice::from_ref(&payload))?;
            StateVectorCache::new(self.store)
                .write(doc_name, seeded.state_vector, 0)
                .await?;
            log::debug!("Seeded state vector for new document {doc_name}");
        }

        self.store
            .insert_one(Record::Update(UpdateRecord {
                doc_name: doc_name.to_string(),
                clock: next,
                payload,
            }))
            .await?;

        log::trace!("Stored update for doc {doc_name} (clock={next})");
        Ok(next)
    }

    /// All update payloads of a document, ascending by clock.
    pub async fn read_all(&self, doc_name: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let records = self
            .store
            .find(Collection::Updates, &Filter::doc(doc_name), Sort::Ascending, None)
            .await?;
        records
            .into_iter()
            .map(|record| record.into_update().map(|u| u.payload))
            .collect()
    }

    /// Write `payload` at exactly `clock`, replacing any record already there.
    pub async fn put_at(&self, doc_name: &str, clock: Clock, payload: Vec<u8>) -> Result<(), StoreError> {
        let record = Record::Update(UpdateRecord {
            doc_name: doc_name.to_string(),
            clock,
            payload,
        });
        self.store
            .update_one(
                Collection::Updates,
                &Filter::doc(doc_name).clock_eq(clock),
                record,
                true,
            )
            .await?;
        Ok(())
    }

    /// Delete every update of a document below `clock`.
    pub async fn delete_below(&self, doc_name: &str, clock: Clock) -> Result<u64, StoreError> {
        self.store
            .delete_many(Collection::Updates, &Filter::doc(doc_name).clock_below(clock))
            .await
    }

    /// Delete every update of a document.
    pub async fn delete_all(&self, doc_name: &str) -> Result<u64, StoreError> {
        self.store
            .delete_many(Collection::Updates, &Filter::doc(doc_name))
            .await
    }
}
