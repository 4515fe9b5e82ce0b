//! Update merging.
//!
//! The persistence layer never interprets update blobs itself; every
//! operation on their contents goes through a [`MergeEngine`].
//! [`YrsMergeEngine`] is the Yjs-compatible implementation (v1 encoding).

use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

/// Result of merging a run of updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedState {
    /// One update equivalent to applying all inputs in order
    pub update: Vec<u8>,
    /// State vector of the merged document
    pub state_vector: Vec<u8>,
}

/// Merge errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// An update or state vector blob could not be decoded
    Decode(String),
    /// A decoded update could not be integrated into the document
    Apply(String),
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeError::Decode(e) => write!(f, "Malformed update: {e}"),
            MergeError::Apply(e) => write!(f, "Failed to apply update: {e}"),
        }
    }
}

impl std::error::Error for MergeError {}

impl From<yrs::encoding::read::Error> for MergeError {
    fn from(e: yrs::encoding::read::Error) -> Self {
        MergeError::Decode(e.to_string())
    }
}

/// Pure operations over update blobs and the documents they build.
pub trait MergeEngine: Send + Sync + 'static {
    /// Materialized document type.
    type Document: Send + 'static;

    /// A new, empty document.
    fn new_document(&self) -> Self::Document;

    /// Merge updates (in order) into a single update plus its state vector.
    fn merge_updates(&self, updates: &[Vec<u8>]) -> Result<MergedState, MergeError>;

    /// Apply updates to a document in the given order.
    fn apply_updates(&self, doc: &mut Self::Document, updates: &[Vec<u8>]) -> Result<(), MergeError>;

    /// Full document state as one update.
    fn encode_state_as_update(&self, doc: &Self::Document) -> Vec<u8>;

    fn encode_state_vector(&self, doc: &Self::Document) -> Vec<u8>;

    /// Minimal update covering everything `state_vector` has not seen.
    fn diff_since(&self, doc: &Self::Document, state_vector: &[u8]) -> Result<Vec<u8>, MergeError>;
}

/// [`MergeEngine`] over `yrs::Doc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct YrsMergeEngine;

impl MergeEngine for YrsMergeEngine {
    type Document = Doc;

    fn new_document(&self) -> Doc {
        Doc::new()
    }

    fn merge_updates(&self, updates: &[Vec<u8>]) -> Result<MergedState, MergeError> {
        let mut doc = Doc::new();
        self.apply_updates(&mut doc, updates)?;
        Ok(MergedState {
            update: self.encode_state_as_update(&doc),
            state_vector: self.encode_state_vector(&doc),
        })
    }

    fn apply_updates(&self, doc: &mut Doc, updates: &[Vec<u8>]) -> Result<(), MergeError> {
        // One transaction for the whole run
        let mut txn = doc.transact_mut();
        for blob in updates {
            let update = Update::decode_v1(blob)?;
            txn.apply_update(update)
                .map_err(|e| MergeError::Apply(e.to_string()))?;
        }
        Ok(())
    }

    fn encode_state_as_update(&self, doc: &Doc) -> Vec<u8> {
        doc.transact()
            .encode_state_as_update_v1(&StateVector::default())
    }

    fn encode_state_vector(&self, doc: &Doc) -> Vec<u8> {
        doc.transact().state_vector().encode_v1()
    }

    fn diff_since(&self, doc: &Doc, state_vector: &[u8]) -> Result<Vec<u8>, MergeError> {
        let sv = StateVector::decode_v1(state_vector)?;
        Ok(doc.transact().encode_state_as_update_v1(&sv))
    }
}
