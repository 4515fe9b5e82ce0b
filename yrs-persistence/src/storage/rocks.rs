//! RocksDB-backed document store.
//!
//! Column families:
//! - `updates`:       update payloads (LZ4 compressed), keyed by `doc_name:clock`
//! - `state_vectors`: cached state vectors (bincode), keyed by `doc_name`
//! - `meta`:          metadata values (JSON), keyed by `doc_name:key`
//!
//! Key layout: `<name_len:4 bytes BE><doc_name><suffix>`. The length prefix
//! keeps one document's records contiguous even when names share a prefix,
//! and the big-endian clock suffix sorts updates numerically, so the newest
//! update of a document is a single reverse seek.
//!
//! Reference: Kleppmann, DDIA, Chapter 3 (LSM Trees, SSTables)

use async_trait::async_trait;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::{
    check_index, Clock, ClockFilter, Collection, DocumentStore, Filter, MetaRecord, Record, Sort,
    StateVectorRecord, StoreError, UpdateRecord,
};

/// Column family names.
const CF_UPDATES: &str = "updates";
const CF_STATE_VECTORS: &str = "state_vectors";
const CF_META: &str = "meta";

/// All column family names for initialization.
const COLUMN_FAMILIES: &[&str] = &[CF_UPDATES, CF_STATE_VECTORS, CF_META];

/// RocksDB configuration.
#[derive(Debug, Clone)]
pub struct RocksConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 32MB)
    pub write_buffer_size: usize,
}

impl Default for RocksConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("yjs"),
            block_cache_size: 64 * 1024 * 1024, // 64MB
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024, // 32MB
        }
    }
}

impl RocksConfig {
    /// Default tuning at the given path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create config for testing (small caches).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024, // 8MB
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024, // 4MB
        }
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// On-disk state vector value.
#[derive(Debug, Serialize, Deserialize)]
struct StoredStateVector {
    state_vector: Vec<u8>,
    clock: Clock,
}

type Db = DBWithThreadMode<SingleThreaded>;

/// RocksDB-backed [`DocumentStore`].
///
/// Calls run inline on the calling task; each is a short point lookup,
/// prefix scan or write batch. Mutations hold the write guard from their
/// first read to their last write, so a uniqueness check and the write it
/// guards are never interleaved with another writer on the same store.
pub struct RocksStore {
    /// RocksDB instance; `None` once closed, which releases the directory lock
    db: RwLock<Option<Db>>,
    /// Store configuration
    config: RocksConfig,
}

impl RocksStore {
    /// Open the store at the configured path.
    ///
    /// Creates the database and column families if they don't exist.
    pub fn open(config: RocksConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = Db::open_cf_descriptors(&db_opts, &config.path, cf_descriptors)
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        log::info!("Opened RocksDB document store at {}", config.path.display());

        Ok(Self {
            db: RwLock::new(Some(db)),
            config,
        })
    }

    /// Build column-family-specific options.
    fn cf_options(name: &str, config: &RocksConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024); // 16KB blocks
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_UPDATES => {
                // Many small appends, prefix-scanned per document
                opts.set_max_write_buffer_number(4);
                // Payloads are already LZ4 compressed
                opts.set_compression_type(DBCompressionType::None);
            }
            CF_STATE_VECTORS | CF_META => {
                // Small values, point lookups
                opts.set_max_write_buffer_number(2);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            _ => {}
        }

        opts
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Keys ─────────────────────────────────────────────────────────

    /// Key prefix shared by every record of a document.
    fn doc_prefix(doc_name: &str) -> Vec<u8> {
        let name = doc_name.as_bytes();
        let mut key = Vec::with_capacity(4 + name.len() + 8);
        key.extend_from_slice(&(name.len() as u32).to_be_bytes());
        key.extend_from_slice(name);
        key
    }

    /// Update key: doc prefix + clock (8 bytes big-endian).
    fn update_key(doc_name: &str, clock: Clock) -> Vec<u8> {
        let mut key = Self::doc_prefix(doc_name);
        key.extend_from_slice(&clock.to_be_bytes());
        key
    }

    /// Meta key: doc prefix + meta key bytes.
    fn meta_key(doc_name: &str, meta_key: &str) -> Vec<u8> {
        let mut key = Self::doc_prefix(doc_name);
        key.extend_from_slice(meta_key.as_bytes());
        key
    }

    /// Split a key into document name and suffix.
    fn split_key(key: &[u8]) -> Result<(String, &[u8]), StoreError> {
        let invalid = || StoreError::DeserializationError("Invalid record key".into());
        let len_bytes: [u8; 4] = key.get(..4).ok_or_else(invalid)?.try_into().map_err(|_| invalid())?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        let name = key.get(4..4 + len).ok_or_else(invalid)?;
        let name = String::from_utf8(name.to_vec()).map_err(|_| invalid())?;
        Ok((name, &key[4 + len..]))
    }

    fn record_key(record: &Record) -> Vec<u8> {
        match record {
            Record::Update(r) => Self::update_key(&r.doc_name, r.clock),
            Record::StateVector(r) => Self::doc_prefix(&r.doc_name),
            Record::Meta(r) => Self::meta_key(&r.doc_name, &r.key),
        }
    }

    // ─── Values ───────────────────────────────────────────────────────

    fn encode_value(record: &Record) -> Result<Vec<u8>, StoreError> {
        match record {
            Record::Update(r) => Ok(lz4_flex::compress_prepend_size(&r.payload)),
            Record::StateVector(r) => {
                let stored = StoredStateVector {
                    state_vector: r.state_vector.clone(),
                    clock: r.clock,
                };
                bincode::serde::encode_to_vec(&stored, bincode::config::standard())
                    .map_err(|e| StoreError::SerializationError(e.to_string()))
            }
            Record::Meta(r) => serde_json::to_vec(&r.value)
                .map_err(|e| StoreError::SerializationError(e.to_string())),
        }
    }

    fn decode_record(collection: Collection, key: &[u8], value: &[u8]) -> Result<Record, StoreError> {
        let (doc_name, suffix) = Self::split_key(key)?;
        match collection {
            Collection::Updates => {
                let clock_bytes: [u8; 8] = suffix
                    .try_into()
                    .map_err(|_| StoreError::DeserializationError("Invalid clock in key".into()))?;
                let payload = lz4_flex::decompress_size_prepended(value)
                    .map_err(|e| StoreError::CompressionError(e.to_string()))?;
                Ok(Record::Update(UpdateRecord {
                    doc_name,
                    clock: Clock::from_be_bytes(clock_bytes),
                    payload,
                }))
            }
            Collection::StateVectors => {
                let (stored, _): (StoredStateVector, usize) =
                    bincode::serde::decode_from_slice(value, bincode::config::standard())
                        .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
                Ok(Record::StateVector(StateVectorRecord {
                    doc_name,
                    state_vector: stored.state_vector,
                    clock: stored.clock,
                }))
            }
            Collection::Meta => {
                let key = String::from_utf8(suffix.to_vec())
                    .map_err(|_| StoreError::DeserializationError("Invalid meta key".into()))?;
                let value = serde_json::from_slice(value)
                    .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
                Ok(Record::Meta(MetaRecord { doc_name, key, value }))
            }
        }
    }

    // ─── Scans ────────────────────────────────────────────────────────

    /// Matching records with their raw keys, in the requested order.
    fn scan(
        db: &Db,
        collection: Collection,
        filter: &Filter,
        sort: Sort,
        limit: Option<usize>,
    ) -> Result<Vec<(Box<[u8]>, Record)>, StoreError> {
        let cf = Self::cf(db, collection.name())?;
        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        if limit == 0 {
            return Ok(out);
        }

        // Updates of one document: bounded range, walkable in either direction
        if let (Collection::Updates, Some(doc_name)) = (collection, &filter.doc_name) {
            let (lo, hi) = match filter.clock {
                Some(ClockFilter::Eq(c)) => (c, c),
                Some(ClockFilter::Below(0)) => return Ok(out),
                Some(ClockFilter::Below(c)) => (0, c - 1),
                None => (0, Clock::MAX),
            };
            let lower = Self::update_key(doc_name, lo);
            let upper = Self::update_key(doc_name, hi);
            let mode = match sort {
                Sort::Ascending => IteratorMode::From(&lower, Direction::Forward),
                Sort::Descending => IteratorMode::From(&upper, Direction::Reverse),
            };
            for item in db.iterator_cf(cf, mode) {
                let (key, value) = item?;
                if key.as_ref() < lower.as_slice() || key.as_ref() > upper.as_slice() {
                    break;
                }
                let record = Self::decode_record(collection, &key, &value)?;
                out.push((key, record));
                if out.len() >= limit {
                    break;
                }
            }
            return Ok(out);
        }

        // Everything else: forward prefix scan, reversed afterwards if needed
        let prefix = filter
            .doc_name
            .as_deref()
            .map(Self::doc_prefix)
            .unwrap_or_default();
        let mode = if prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(&prefix, Direction::Forward)
        };
        let forward_limit = if sort == Sort::Ascending { limit } else { usize::MAX };
        for item in db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let record = Self::decode_record(collection, &key, &value)?;
            if filter.matches(&record) {
                out.push((key, record));
                if out.len() >= forward_limit {
                    break;
                }
            }
        }
        if sort == Sort::Descending {
            out.reverse();
            out.truncate(limit);
        }
        Ok(out)
    }

    fn write(&self, db: &Db, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    /// Delete the keys of scanned records in one batch.
    fn delete_found(
        &self,
        db: &Db,
        collection: Collection,
        found: &[(Box<[u8]>, Record)],
    ) -> Result<u64, StoreError> {
        if found.is_empty() {
            return Ok(0);
        }
        let cf = Self::cf(db, collection.name())?;
        let mut batch = WriteBatch::default();
        for (key, _) in found {
            batch.delete_cf(cf, key);
        }
        self.write(db, batch)?;
        Ok(found.len() as u64)
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    /// The open database, or [`StoreError::Closed`].
    fn opened(db: &Option<Db>) -> Result<&Db, StoreError> {
        db.as_ref().ok_or(StoreError::Closed)
    }

    /// Get a column family handle.
    fn cf<'a>(db: &'a Db, name: &str) -> Result<&'a rocksdb::ColumnFamily, StoreError> {
        db.cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }
}

#[async_trait]
impl DocumentStore for RocksStore {
    async fn create_index(
        &self,
        collection: Collection,
        fields: &[&str],
        _unique: bool,
    ) -> Result<(), StoreError> {
        Self::opened(&*self.db.read().await)?;
        check_index(collection, fields)
    }

    async fn insert_one(&self, record: Record) -> Result<(), StoreError> {
        let guard = self.db.write().await;
        let db = Self::opened(&guard)?;
        let collection = record.collection();
        let cf = Self::cf(db, collection.name())?;
        let key = Self::record_key(&record);
        if db.get_cf(cf, &key)?.is_some() {
            return Err(StoreError::DuplicateKey {
                collection,
                key: String::from_utf8_lossy(&key[4..]).into_owned(),
            });
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(cf, &key, Self::encode_value(&record)?);
        self.write(db, batch)
    }

    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Record>, StoreError> {
        let guard = self.db.read().await;
        let db = Self::opened(&guard)?;
        let found = Self::scan(db, collection, filter, Sort::Ascending, Some(1))?;
        Ok(found.into_iter().next().map(|(_, record)| record))
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        sort: Sort,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        let guard = self.db.read().await;
        let db = Self::opened(&guard)?;
        let found = Self::scan(db, collection, filter, sort, limit)?;
        Ok(found.into_iter().map(|(_, record)| record).collect())
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        record: Record,
        upsert: bool,
    ) -> Result<u64, StoreError> {
        if record.collection() != collection {
            return Err(StoreError::UnexpectedRecord {
                collection,
                found: record.collection(),
            });
        }
        let guard = self.db.write().await;
        let db = Self::opened(&guard)?;
        let cf = Self::cf(db, collection.name())?;
        let existing = Self::scan(db, collection, filter, Sort::Ascending, Some(1))?;
        let matched = existing.len() as u64;
        if matched == 0 && !upsert {
            return Ok(0);
        }

        // Replace atomically: drop the matched key, write the new one
        let mut batch = WriteBatch::default();
        for (key, _) in &existing {
            batch.delete_cf(cf, key);
        }
        batch.put_cf(cf, Self::record_key(&record), Self::encode_value(&record)?);
        self.write(db, batch)?;
        Ok(matched)
    }

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        let guard = self.db.write().await;
        let db = Self::opened(&guard)?;
        let found = Self::scan(db, collection, filter, Sort::Ascending, Some(1))?;
        self.delete_found(db, collection, &found)
    }

    async fn delete_many(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<u64, StoreError> {
        let guard = self.db.write().await;
        let db = Self::opened(&guard)?;
        let found = Self::scan(db, collection, filter, Sort::Ascending, None)?;
        self.delete_found(db, collection, &found)
    }

    /// Flush and drop the database handle, releasing its directory lock.
    async fn close(&self) -> Result<(), StoreError> {
        let Some(db) = self.db.write().await.take() else {
            return Ok(());
        };
        db.flush()?;
        drop(db);
        log::info!("Closed RocksDB document store at {}", self.config.path.display());
        Ok(())
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn update(doc: &str, clock: Clock, payload: &[u8]) -> Record {
        Record::Update(UpdateRecord {
            doc_name: doc.into(),
            clock,
            payload: payload.to_vec(),
        })
    }

    fn clocks(records: Vec<Record>) -> Vec<Clock> {
        records
            .into_iter()
            .map(|r| r.into_update().unwrap().clock)
            .collect()
    }

    #[tokio::test]
    async fn test_store_open_close() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(RocksConfig::for_testing(dir.path().join("db"))).unwrap();
        assert!(store.path().exists());
        store.close().await.unwrap();
        assert_eq!(
            store.find_one(Collection::Updates, &Filter::all()).await.unwrap_err(),
            StoreError::Closed
        );
        // Second close is a no-op
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_releases_directory_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let first = RocksStore::open(RocksConfig::for_testing(&path)).unwrap();
        first.insert_one(update("doc", 0, b"kept")).await.unwrap();
        first.close().await.unwrap();

        // `first` is still alive; the reopen only succeeds if close dropped the handle
        let second = RocksStore::open(RocksConfig::for_testing(&path)).unwrap();
        let kept = second
            .find_one(Collection::Updates, &Filter::doc("doc"))
            .await
            .unwrap()
            .unwrap()
            .into_update()
            .unwrap();
        assert_eq!(kept.payload, b"kept");
        drop(first);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_same_key_one_winner() {
        let dir = tempdir().unwrap();
        let config = RocksConfig::for_testing(dir.path().join("db"));
        let store = Arc::new(RocksStore::open(config).unwrap());

        for clock in 0..50 {
            let barrier = Arc::new(tokio::sync::Barrier::new(4));
            let tasks: Vec<_> = (0..4u8)
                .map(|writer| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    tokio::spawn(async move {
                        barrier.wait().await;
                        store.insert_one(update("doc", clock, &[writer])).await.map(|_| writer)
                    })
                })
                .collect();

            let mut winners = Vec::new();
            for task in tasks {
                match task.await.unwrap() {
                    Ok(writer) => winners.push(writer),
                    Err(e) => assert!(matches!(e, StoreError::DuplicateKey { .. }), "{e:?}"),
                }
            }
            assert_eq!(winners.len(), 1, "clock {clock}");

            // The stored payload is the winner's, never overwritten by a loser
            let stored = store
                .find_one(Collection::Updates, &Filter::doc("doc").clock_eq(clock))
                .await
                .unwrap()
                .unwrap()
                .into_update()
                .unwrap();
            assert_eq!(stored.payload, vec![winners[0]]);
        }
    }

    #[tokio::test]
    async fn test_update_roundtrip_and_ordering() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(RocksConfig::for_testing(dir.path().join("db"))).unwrap();

        // Clock 256 must sort after 255 (big-endian keys)
        for clock in [256, 1, 255, 0] {
            let payload = format!("update_{clock}").into_bytes();
            store.insert_one(update("doc", clock, &payload)).await.unwrap();
        }

        let all = store
            .find(Collection::Updates, &Filter::doc("doc"), Sort::Ascending, None)
            .await
            .unwrap();
        assert_eq!(all[0].clone().into_update().unwrap().payload, b"update_0");
        assert_eq!(clocks(all), vec![0, 1, 255, 256]);

        let newest = store
            .find(Collection::Updates, &Filter::doc("doc"), Sort::Descending, Some(1))
            .await
            .unwrap();
        assert_eq!(clocks(newest), vec![256]);
    }

    #[tokio::test]
    async fn test_duplicate_update_rejected() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(RocksConfig::for_testing(dir.path().join("db"))).unwrap();

        store.insert_one(update("doc", 3, b"a")).await.unwrap();
        let err = store.insert_one(update("doc", 3, b"b")).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateKey {
                collection: Collection::Updates,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_prefix_isolation() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(RocksConfig::for_testing(dir.path().join("db"))).unwrap();

        // "doc" is a byte prefix of "doc1"; the length prefix keeps them apart
        store.insert_one(update("doc", 0, b"a")).await.unwrap();
        store.insert_one(update("doc1", 0, b"b")).await.unwrap();
        store.insert_one(update("doc1", 1, b"c")).await.unwrap();

        let doc = store
            .find(Collection::Updates, &Filter::doc("doc"), Sort::Descending, None)
            .await
            .unwrap();
        assert_eq!(clocks(doc), vec![0]);

        let removed = store
            .delete_many(Collection::Updates, &Filter::doc("doc1"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store
                .find(Collection::Updates, &Filter::all(), Sort::Ascending, None)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_below_clock() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(RocksConfig::for_testing(dir.path().join("db"))).unwrap();
        for clock in 0..20 {
            store.insert_one(update("doc", clock, &[clock as u8; 64])).await.unwrap();
        }

        let removed = store
            .delete_many(Collection::Updates, &Filter::doc("doc").clock_below(10))
            .await
            .unwrap();
        assert_eq!(removed, 10);

        let remaining = store
            .find(Collection::Updates, &Filter::doc("doc"), Sort::Ascending, None)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 10);
        assert_eq!(clocks(remaining)[0], 10);
    }

    #[tokio::test]
    async fn test_state_vector_upsert() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(RocksConfig::for_testing(dir.path().join("db"))).unwrap();
        let record = |clock| {
            Record::StateVector(StateVectorRecord {
                doc_name: "doc".into(),
                state_vector: vec![1, 2, 3],
                clock,
            })
        };

        let filter = Filter::doc("doc");
        assert_eq!(
            store
                .update_one(Collection::StateVectors, &filter, record(0), true)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .update_one(Collection::StateVectors, &filter, record(4), true)
                .await
                .unwrap(),
            1
        );

        let stored = store
            .find_one(Collection::StateVectors, &filter)
            .await
            .unwrap()
            .unwrap()
            .into_state_vector()
            .unwrap();
        assert_eq!(stored.clock, 4);
        assert_eq!(stored.state_vector, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_meta_values_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let store = RocksStore::open(RocksConfig::for_testing(&path)).unwrap();
            store
                .insert_one(Record::Meta(MetaRecord {
                    doc_name: "doc".into(),
                    key: "owner".into(),
                    value: serde_json::json!({ "name": "ada", "admin": true }),
                }))
                .await
                .unwrap();
            store.close().await.unwrap();
        }

        // Reopen, record survives
        let store = RocksStore::open(RocksConfig::for_testing(&path)).unwrap();
        let meta = store
            .find_one(Collection::Meta, &Filter::meta_key("doc", "owner"))
            .await
            .unwrap()
            .unwrap()
            .into_meta()
            .unwrap();
        assert_eq!(meta.value["admin"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_large_payload_compressed() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(RocksConfig::for_testing(dir.path().join("db"))).unwrap();

        let data = vec![42u8; 1_000_000];
        store.insert_one(update("doc", 0, &data)).await.unwrap();

        let loaded = store
            .find_one(Collection::Updates, &Filter::doc("doc"))
            .await
            .unwrap()
            .unwrap()
            .into_update()
            .unwrap();
        assert_eq!(loaded.payload.len(), 1_000_000);
        assert_eq!(loaded.payload[999_999], 42);
    }

    #[test]
    fn test_split_key() {
        let key = RocksStore::meta_key("doc", "locked");
        let (name, suffix) = RocksStore::split_key(&key).unwrap();
        assert_eq!(name, "doc");
        assert_eq!(suffix, b"locked");
        assert!(RocksStore::split_key(&[0, 0, 0, 9, b'a']).is_err());
    }

    #[test]
    fn test_rocks_config_default() {
        let config = RocksConfig::default();
        assert_eq!(config.bloom_filter_bits, 10);
        assert!(!config.sync_writes);
        assert_eq!(RocksConfig::at("x").path, PathBuf::from("x"));
    }
}
