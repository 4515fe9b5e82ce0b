//! In-process document store.
//!
//! Keeps each collection in a `BTreeMap` keyed by its natural key, so scans
//! come back in key order and the newest update of a document is one reverse
//! range step away. Used by tests and by embedders that do not need durability.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{
    check_index, Clock, ClockFilter, Collection, DocumentStore, Filter, MetaRecord, Record, Sort,
    StateVectorRecord, StoreError, UpdateRecord,
};

#[derive(Debug, Default)]
struct Tables {
    updates: BTreeMap<(String, Clock), Vec<u8>>,
    state_vectors: BTreeMap<String, (Vec<u8>, Clock)>,
    meta: BTreeMap<(String, String), serde_json::Value>,
}

impl Tables {
    /// All records of a collection in ascending key order, narrowed by the
    /// filter's document name where the map layout allows it.
    fn scan(&self, collection: Collection, filter: &Filter) -> Vec<Record> {
        let records: Vec<Record> = match collection {
            Collection::Updates => {
                let iter: Box<dyn Iterator<Item = (&(String, Clock), &Vec<u8>)>> =
                    match (&filter.doc_name, clock_bounds(filter.clock)) {
                        (Some(name), Some((lo, hi))) => {
                            Box::new(self.updates.range((name.clone(), lo)..=(name.clone(), hi)))
                        }
                        (Some(_), None) => Box::new(std::iter::empty::<(&(String, Clock), &Vec<u8>)>()),
                        (None, _) => Box::new(self.updates.iter()),
                    };
                iter.map(|((doc_name, clock), payload)| {
                    Record::Update(UpdateRecord {
                        doc_name: doc_name.clone(),
                        clock: *clock,
                        payload: payload.clone(),
                    })
                })
                .collect()
            }
            Collection::StateVectors => self
                .state_vectors
                .iter()
                .map(|(doc_name, (state_vector, clock))| {
                    Record::StateVector(StateVectorRecord {
                        doc_name: doc_name.clone(),
                        state_vector: state_vector.clone(),
                        clock: *clock,
                    })
                })
                .collect(),
            Collection::Meta => self
                .meta
                .iter()
                .map(|((doc_name, key), value)| {
                    Record::Meta(MetaRecord {
                        doc_name: doc_name.clone(),
                        key: key.clone(),
                        value: value.clone(),
                    })
                })
                .collect(),
        };
        records.into_iter().filter(|r| filter.matches(r)).collect()
    }

    fn contains(&self, record: &Record) -> bool {
        match record {
            Record::Update(r) => self.updates.contains_key(&(r.doc_name.clone(), r.clock)),
            Record::StateVector(r) => self.state_vectors.contains_key(&r.doc_name),
            Record::Meta(r) => self.meta.contains_key(&(r.doc_name.clone(), r.key.clone())),
        }
    }

    fn put(&mut self, record: Record) {
        match record {
            Record::Update(r) => {
                self.updates.insert((r.doc_name, r.clock), r.payload);
            }
            Record::StateVector(r) => {
                self.state_vectors.insert(r.doc_name, (r.state_vector, r.clock));
            }
            Record::Meta(r) => {
                self.meta.insert((r.doc_name, r.key), r.value);
            }
        }
    }

    fn remove(&mut self, record: &Record) -> bool {
        match record {
            Record::Update(r) => self.updates.remove(&(r.doc_name.clone(), r.clock)).is_some(),
            Record::StateVector(r) => self.state_vectors.remove(&r.doc_name).is_some(),
            Record::Meta(r) => self.meta.remove(&(r.doc_name.clone(), r.key.clone())).is_some(),
        }
    }
}

/// Inclusive clock range covered by a clock filter; `None` when it is empty.
fn clock_bounds(filter: Option<ClockFilter>) -> Option<(Clock, Clock)> {
    match filter {
        Some(ClockFilter::Eq(c)) => Some((c, c)),
        Some(ClockFilter::Below(0)) => None,
        Some(ClockFilter::Below(c)) => Some((0, c - 1)),
        None => Some((0, Clock::MAX)),
    }
}

/// Human-readable natural key, for error messages.
fn describe_key(record: &Record) -> String {
    match record {
        Record::Update(r) => format!("{}:{}", r.doc_name, r.clock),
        Record::StateVector(r) => r.doc_name.clone(),
        Record::Meta(r) => format!("{}:{}", r.doc_name, r.key),
    }
}

/// `BTreeMap`-backed [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held in a collection.
    pub async fn count(&self, collection: Collection) -> usize {
        let tables = self.tables.read().await;
        match collection {
            Collection::Updates => tables.updates.len(),
            Collection::StateVectors => tables.state_vectors.len(),
            Collection::Meta => tables.meta.len(),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_index(
        &self,
        collection: Collection,
        fields: &[&str],
        _unique: bool,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        check_index(collection, fields)
    }

    async fn insert_one(&self, record: Record) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut tables = self.tables.write().await;
        if tables.contains(&record) {
            return Err(StoreError::DuplicateKey {
                collection: record.collection(),
                key: describe_key(&record),
            });
        }
        tables.put(record);
        Ok(())
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Record>, StoreError> {
        self.ensure_open()?;
        let tables = self.tables.read().await;
        Ok(tables.scan(collection, filter).into_iter().next())
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        sort: Sort,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        self.ensure_open()?;
        let tables = self.tables.read().await;
        let mut records = tables.scan(collection, filter);
        if sort == Sort::Descending {
            records.reverse();
        }
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        record: Record,
        upsert: bool,
    ) -> Result<u64, StoreError> {
        self.ensure_open()?;
        if record.collection() != collection {
            return Err(StoreError::UnexpectedRecord {
                collection,
                found: record.collection(),
            });
        }
        let mut tables = self.tables.write().await;
        let matched = tables.scan(collection, filter).into_iter().next();
        match matched {
            Some(existing) => {
                tables.remove(&existing);
                tables.put(record);
                Ok(1)
            }
            None if upsert => {
                tables.put(record);
                Ok(0)
            }
            None => Ok(0),
        }
    }

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let mut tables = self.tables.write().await;
        match tables.scan(collection, filter).into_iter().next() {
            Some(record) => Ok(u64::from(tables.remove(&record))),
            None => Ok(0),
        }
    }

    async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let mut tables = self.tables.write().await;
        let mut count = 0u64;
        for record in tables.scan(collection, filter) {
            if tables.remove(&record) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
