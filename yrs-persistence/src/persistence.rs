//! Public operation surface.
//!
//! Every method enqueues its work on the instance's [`ExecutionQueue`] at call
//! time and hands back an [`OpHandle`]. Operations of one instance therefore
//! execute one after another in call order, and each observes everything
//! the earlier ones wrote.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::compactor::Compactor;
use crate::config::PersistenceConfig;
use crate::error::PersistenceResult;
use crate::merge::{MergeEngine, MergedState, YrsMergeEngine};
use crate::meta::MetaStore;
use crate::queue::{ExecutionQueue, FailedOperation, OpHandle};
use crate::state_vector::StateVectorCache;
use crate::storage::{
    Clock, Collection, DocumentStore, Filter, RocksConfig, RocksStore, StateVectorRecord,
    StoreError,
};
use crate::update_log::UpdateLog;

/// State shared by every queued job of one instance.
struct Inner<S, M> {
    store: S,
    engine: M,
    config: PersistenceConfig,
}

impl<S: DocumentStore, M: MergeEngine> Inner<S, M> {
    /// Apply the whole log to a fresh document, compacting afterwards when
    /// the log has grown past the flush threshold.
    async fn materialize(&self, doc_name: &str) -> PersistenceResult<M::Document> {
        let updates = UpdateLog::new(&self.store).read_all(doc_name).await?;
        let mut document = self.engine.new_document();
        self.engine.apply_updates(&mut document, &updates)?;

        if updates.len() > self.config.flush_threshold {
            log::debug!(
                "Doc {doc_name} loaded {} updates (threshold {}), flushing",
                updates.len(),
                self.config.flush_threshold
            );
            let merged = MergedState {
                update: self.engine.encode_state_as_update(&document),
                state_vector: self.engine.encode_state_vector(&document),
            };
            // The loaded document is already correct, whatever happens here
            if let Err(e) = Compactor::new(&self.store, &self.engine)
                .write_back(doc_name, merged)
                .await
            {
                log::warn!("Automatic flush of doc {doc_name} failed: {e}");
            }
        }
        Ok(document)
    }

    async fn state_vector(&self, doc_name: &str) -> PersistenceResult<Vec<u8>> {
        if let Some(cached) = StateVectorCache::new(&self.store).read(doc_name).await? {
            let current = UpdateLog::new(&self.store).current_clock(doc_name).await?;
            if current == Some(cached.clock) {
                return Ok(cached.state_vector);
            }
        }
        match Compactor::new(&self.store, &self.engine).flush(doc_name).await? {
            Some(outcome) => Ok(outcome.state_vector),
            None => Ok(self.engine.encode_state_vector(&self.engine.new_document())),
        }
    }

    async fn clear_document(&self, doc_name: &str) -> PersistenceResult<()> {
        let updates = UpdateLog::new(&self.store).delete_all(doc_name).await?;
        StateVectorCache::new(&self.store).delete(doc_name).await?;
        let meta = MetaStore::new(&self.store).delete_doc(doc_name).await?;
        log::info!("Cleared doc {doc_name} ({updates} updates, {meta} metadata entries)");
        Ok(())
    }

    async fn clear_all(&self) -> PersistenceResult<()> {
        for collection in Collection::ALL {
            let removed = self.store.delete_many(collection, &Filter::all()).await?;
            log::info!("Cleared {removed} records from {collection}");
        }
        Ok(())
    }
}

/// Update-log persistence for collaboratively edited documents.
///
/// Must be constructed inside a tokio runtime: the execution queue's worker
/// is spawned on it.
pub struct Persistence<S: DocumentStore, M: MergeEngine = YrsMergeEngine> {
    inner: Arc<Inner<S, M>>,
    queue: ExecutionQueue<Inner<S, M>>,
}

impl Persistence<RocksStore, YrsMergeEngine> {
    /// Open (or create) the RocksDB database `<connection_path>/<database_name>`.
    pub fn open(
        connection_path: impl AsRef<Path>,
        config: PersistenceConfig,
    ) -> Result<Self, StoreError> {
        let path = connection_path.as_ref().join(&config.database_name);
        let store = RocksStore::open(RocksConfig::at(path))?;
        Ok(Self::with_store(store, YrsMergeEngine, config))
    }
}

impl<S: DocumentStore, M: MergeEngine> Persistence<S, M> {
    /// Wrap an adapter and a merge engine. Index creation is queued ahead of
    /// any other operation.
    pub fn with_store(store: S, engine: M, config: PersistenceConfig) -> Self {
        let inner = Arc::new(Inner {
            store,
            engine,
            config,
        });
        let queue = ExecutionQueue::start(Arc::clone(&inner));

        let _indexes = queue.submit("create_indexes", None, |inner: Arc<Inner<S, M>>| async move {
            for collection in Collection::ALL {
                inner
                    .store
                    .create_index(collection, collection.key_fields(), true)
                    .await?;
            }
            Ok(())
        });

        log::info!(
            "Persistence started (database={}, flush_threshold={})",
            inner.config.database_name,
            inner.config.flush_threshold
        );
        Self { inner, queue }
    }

    /// The underlying document store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.inner.config
    }

    /// Receive every operation failure from now on.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<FailedOperation> {
        self.queue.subscribe()
    }

    /// Store an update at the document's next clock; resolves to that clock.
    pub fn append_update(&self, doc_name: &str, update: Vec<u8>) -> OpHandle<Clock> {
        let doc = doc_name.to_string();
        self.queue
            .submit("append_update", Some(doc_name), move |inner| async move {
                UpdateLog::new(&inner.store)
                    .append(&inner.engine, &doc, update)
                    .await
            })
    }

    /// Build the document from its full update log.
    ///
    /// Loading more than `flush_threshold` updates compacts the log once the
    /// document is built.
    pub fn get_document(&self, doc_name: &str) -> OpHandle<M::Document> {
        let doc = doc_name.to_string();
        self.queue
            .submit("get_document", Some(doc_name), move |inner| async move {
                inner.materialize(&doc).await
            })
    }

    /// State vector of the document, recomputed through a flush when the
    /// cached one is stale.
    pub fn get_state_vector(&self, doc_name: &str) -> OpHandle<Vec<u8>> {
        let doc = doc_name.to_string();
        self.queue
            .submit("get_state_vector", Some(doc_name), move |inner| async move {
                inner.state_vector(&doc).await
            })
    }

    /// Update carrying everything the holder of `state_vector` is missing.
    pub fn get_diff(&self, doc_name: &str, state_vector: Vec<u8>) -> OpHandle<Vec<u8>> {
        let doc = doc_name.to_string();
        self.queue
            .submit("get_diff", Some(doc_name), move |inner| async move {
                let document = inner.materialize(&doc).await?;
                Ok(inner.engine.diff_since(&document, &state_vector)?)
            })
    }

    /// Compact the document's log; resolves to the surviving clock, or
    /// `Some(None)` when the document has no updates.
    pub fn flush(&self, doc_name: &str) -> OpHandle<Option<Clock>> {
        let doc = doc_name.to_string();
        self.queue
            .submit("flush", Some(doc_name), move |inner| async move {
                let outcome = Compactor::new(&inner.store, &inner.engine)
                    .flush(&doc)
                    .await?;
                Ok(outcome.map(|o| o.clock))
            })
    }

    /// Delete the document's updates, state vector and metadata.
    pub fn clear_document(&self, doc_name: &str) -> OpHandle<()> {
        let doc = doc_name.to_string();
        self.queue
            .submit("clear_document", Some(doc_name), move |inner| async move {
                inner.clear_document(&doc).await
            })
    }

    pub fn set_meta<V: Serialize>(&self, doc_name: &str, key: &str, value: V) -> OpHandle<()> {
        let (doc, key) = (doc_name.to_string(), key.to_string());
        let value = serde_json::to_value(value);
        self.queue
            .submit("set_meta", Some(doc_name), move |inner| async move {
                MetaStore::new(&inner.store).set(&doc, &key, value?).await?;
                Ok(())
            })
    }

    pub fn get_meta(&self, doc_name: &str, key: &str) -> OpHandle<Option<Value>> {
        let (doc, key) = (doc_name.to_string(), key.to_string());
        self.queue
            .submit("get_meta", Some(doc_name), move |inner| async move {
                Ok(MetaStore::new(&inner.store).get(&doc, &key).await?)
            })
    }

    /// [`get_meta`](Self::get_meta), deserialized into `T`. A stored value
    /// of the wrong shape fails the operation.
    pub fn get_meta_as<T>(&self, doc_name: &str, key: &str) -> OpHandle<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (doc, key) = (doc_name.to_string(), key.to_string());
        self.queue
            .submit("get_meta", Some(doc_name), move |inner| async move {
                match MetaStore::new(&inner.store).get(&doc, &key).await? {
                    Some(value) => Ok(Some(serde_json::from_value(value)?)),
                    None => Ok(None),
                }
            })
    }

    /// Resolves to whether the entry existed.
    pub fn del_meta(&self, doc_name: &str, key: &str) -> OpHandle<bool> {
        let (doc, key) = (doc_name.to_string(), key.to_string());
        self.queue
            .submit("del_meta", Some(doc_name), move |inner| async move {
                Ok(MetaStore::new(&inner.store).del(&doc, &key).await?)
            })
    }

    pub fn get_all_meta(&self, doc_name: &str) -> OpHandle<BTreeMap<String, Value>> {
        let doc = doc_name.to_string();
        self.queue
            .submit("get_all_meta", Some(doc_name), move |inner| async move {
                Ok(MetaStore::new(&inner.store).get_all(&doc).await?)
            })
    }

    /// Names of every document holding updates, in name order.
    pub fn list_documents(&self) -> OpHandle<Vec<String>> {
        self.queue.submit("list_documents", None, |inner| async move {
            let summaries = StateVectorCache::new(&inner.store).list().await?;
            Ok(summaries.into_iter().map(|s| s.doc_name).collect())
        })
    }

    pub fn list_document_summaries(&self) -> OpHandle<Vec<StateVectorRecord>> {
        self.queue
            .submit("list_document_summaries", None, |inner| async move {
                Ok(StateVectorCache::new(&inner.store).list().await?)
            })
    }

    /// Delete every record of every document.
    pub fn clear_all(&self) -> OpHandle<()> {
        self.queue
            .submit("clear_all", None, |inner| async move { inner.clear_all().await })
    }

    /// Highest stored clock of the document, `Some(None)` when it has none.
    pub fn current_clock(&self, doc_name: &str) -> OpHandle<Option<Clock>> {
        let doc = doc_name.to_string();
        self.queue
            .submit("current_clock", Some(doc_name), move |inner| async move {
                Ok(UpdateLog::new(&inner.store).current_clock(&doc).await?)
            })
    }

    /// Whether the cached state vector covers every stored update.
    pub fn is_fresh(&self, doc_name: &str) -> OpHandle<bool> {
        let doc = doc_name.to_string();
        self.queue
            .submit("is_fresh", Some(doc_name), move |inner| async move {
                Ok(StateVectorCache::new(&inner.store).is_fresh(&doc).await?)
            })
    }

    /// Run every queued operation, then close the store.
    ///
    /// Operations submitted afterwards resolve to `None` without running.
    /// Resolves to `None` if the store failed to close or the instance was
    /// already closed.
    pub async fn close(&self) -> Option<()> {
        let closed = self.queue.submit("close", None, |inner| async move {
            inner.store.close().await?;
            Ok(())
        });
        self.queue.seal();
        self.queue.join().await;

        let result = closed.await;
        if result.is_some() {
            log::info!("Persistence closed (database={})", self.inner.config.database_name);
        }
        result
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_sealed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::test_support::make_update;
    use crate::storage::MemoryStore;
    use serde::Deserialize;
    use yrs::Doc;

    fn memory(threshold: usize) -> Persistence<MemoryStore> {
        Persistence::with_store(
            MemoryStore::new(),
            YrsMergeEngine,
            PersistenceConfig::for_testing(threshold),
        )
    }

    #[tokio::test]
    async fn test_state_vector_of_unknown_doc_is_empty() {
        let persistence = memory(10);
        let sv = persistence.get_state_vector("nothing").await.unwrap();
        assert_eq!(sv, YrsMergeEngine.encode_state_vector(&Doc::new()));
        assert_eq!(persistence.store().count(Collection::StateVectors).await, 0);
    }

    #[tokio::test]
    async fn test_stale_state_vector_heals_through_flush() {
        let persistence = memory(10);
        let source = Doc::new();
        for text in ["a", "b", "c"] {
            let _ = persistence.append_update("doc", make_update(&source, text));
        }
        assert_eq!(persistence.is_fresh("doc").await, Some(false));

        let sv = persistence.get_state_vector("doc").await.unwrap();
        assert_eq!(sv, YrsMergeEngine.encode_state_vector(&source));
        assert_eq!(persistence.is_fresh("doc").await, Some(true));
        assert_eq!(persistence.store().count(Collection::Updates).await, 1);
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Acl {
        owner: String,
        readers: Vec<String>,
    }

    #[tokio::test]
    async fn test_typed_meta() {
        let persistence = memory(10);
        let acl = Acl {
            owner: "ana".into(),
            readers: vec!["bo".into()],
        };
        persistence.set_meta("doc", "acl", &acl).await.unwrap();

        assert_eq!(persistence.get_meta_as::<Acl>("doc", "acl").await, Some(Some(acl)));
        assert_eq!(persistence.get_meta_as::<Acl>("doc", "missing").await, Some(None));
        // Wrong shape fails the operation
        assert_eq!(persistence.get_meta_as::<u32>("doc", "acl").await, None);
    }

    #[tokio::test]
    async fn test_flush_of_unknown_doc() {
        let persistence = memory(10);
        assert_eq!(persistence.flush("nothing").await, Some(None));
    }
}
