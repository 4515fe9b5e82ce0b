//! Per-document key/value metadata.
//!
//! Entries live beside the update log but never interact with clocks or
//! compaction.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::storage::{Collection, DocumentStore, Filter, MetaRecord, Record, Sort, StoreError};

pub struct MetaStore<'a, S> {
    store: &'a S,
}

impl<'a, S: DocumentStore> MetaStore<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Insert or replace the value under `(doc_name, key)`.
    pub async fn set(&self, doc_name: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let record = Record::Meta(MetaRecord {
            doc_name: doc_name.to_string(),
            key: key.to_string(),
            value,
        });
        self.store
            .update_one(Collection::Meta, &Filter::meta_key(doc_name, key), record, true)
            .await?;
        Ok(())
    }

    pub async fn get(&self, doc_name: &str, key: &str) -> Result<Option<Value>, StoreError> {
        match self
            .store
            .find_one(Collection::Meta, &Filter::meta_key(doc_name, key))
            .await?
        {
            Some(record) => Ok(Some(record.into_meta()?.value)),
            None => Ok(None),
        }
    }

    /// Remove one entry; returns whether it existed.
    pub async fn del(&self, doc_name: &str, key: &str) -> Result<bool, StoreError> {
        let deleted = self
            .store
            .delete_one(Collection::Meta, &Filter::meta_key(doc_name, key))
            .await?;
        Ok(deleted > 0)
    }

    /// Every entry of a document, keyed by metadata key.
    pub async fn get_all(&self, doc_name: &str) -> Result<BTreeMap<String, Value>, StoreError> {
        let records = self
            .store
            .find(Collection::Meta, &Filter::doc(doc_name), Sort::Ascending, None)
            .await?;
        let mut entries = BTreeMap::new();
        for record in records {
            let meta = record.into_meta()?;
            entries.insert(meta.key, meta.value);
        }
        Ok(entries)
    }

    /// Remove the whole metadata namespace of a document.
    pub async fn delete_doc(&self, doc_name: &str) -> Result<u64, StoreError> {
        self.store
            .delete_many(Collection::Meta, &Filter::doc(doc_name))
            .await
    }
}
