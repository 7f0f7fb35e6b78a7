use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::document::{Document, DocumentId};
use crate::domain::referrer::Referrer;
use crate::domain::step::ApprovalStep;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
    #[error("document `{document_id}` version mismatch (expected {expected})")]
    VersionConflict { document_id: DocumentId, expected: u32 },
}

/// The only component allowed to read or write workflow records.
///
/// `create_submission` and `commit_transition` are hard atomicity contracts:
/// a crash mid-write must never leave a document pointing at a step that is
/// not `Waiting`. `commit_transition` must compare the stored document
/// version against `expected_version` and refuse the write on mismatch, so
/// two simultaneous approvals cannot double-advance a chain.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn find_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    /// Steps for a document, ordered by ascending sequence.
    async fn list_steps(&self, document_id: &DocumentId) -> Result<Vec<ApprovalStep>, StoreError>;

    async fn list_referrers(&self, document_id: &DocumentId) -> Result<Vec<Referrer>, StoreError>;

    /// Persist a document, its full chain, and its referrers in one atomic
    /// write. Step 1 arrives `Waiting`, the rest `NotReached`.
    async fn create_submission(
        &self,
        document: Document,
        steps: Vec<ApprovalStep>,
        referrers: Vec<Referrer>,
    ) -> Result<(), StoreError>;

    /// Atomically persist the document together with the steps an action
    /// touched (the resolved step, plus the newly activated one when the
    /// chain advances).
    async fn commit_transition(
        &self,
        expected_version: u32,
        document: Document,
        steps: Vec<ApprovalStep>,
    ) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, Document>,
    steps: HashMap<String, Vec<ApprovalStep>>,
    referrers: HashMap<String, Vec<Referrer>>,
}

impl MemoryStore {
    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        match self.inner.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn find_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.with_state(|state| state.documents.get(&id.0).cloned()))
    }

    async fn list_steps(&self, document_id: &DocumentId) -> Result<Vec<ApprovalStep>, StoreError> {
        let mut steps =
            self.with_state(|state| state.steps.get(&document_id.0).cloned().unwrap_or_default());
        steps.sort_by_key(|step| step.sequence);
        Ok(steps)
    }

    async fn list_referrers(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<Referrer>, StoreError> {
        Ok(self
            .with_state(|state| state.referrers.get(&document_id.0).cloned().unwrap_or_default()))
    }

    async fn create_submission(
        &self,
        document: Document,
        steps: Vec<ApprovalStep>,
        referrers: Vec<Referrer>,
    ) -> Result<(), StoreError> {
        self.with_state(|state| {
            if state.documents.contains_key(&document.id.0) {
                return Err(StoreError::Backend(format!(
                    "document `{}` already exists",
                    document.id
                )));
            }
            state.steps.insert(document.id.0.clone(), steps);
            state.referrers.insert(document.id.0.clone(), referrers);
            state.documents.insert(document.id.0.clone(), document);
            Ok(())
        })
    }

    async fn commit_transition(
        &self,
        expected_version: u32,
        document: Document,
        steps: Vec<ApprovalStep>,
    ) -> Result<(), StoreError> {
        self.with_state(|state| {
            let stored = state.documents.get(&document.id.0).ok_or_else(|| {
                StoreError::Backend(format!("document `{}` does not exist", document.id))
            })?;
            if stored.version != expected_version {
                return Err(StoreError::VersionConflict {
                    document_id: document.id.clone(),
                    expected: expected_version,
                });
            }

            if !steps.is_empty() {
                let chain = state.steps.entry(document.id.0.clone()).or_default();
                for updated in steps {
                    match chain.iter_mut().find(|step| step.id == updated.id) {
                        Some(slot) => *slot = updated,
                        None => {
                            return Err(StoreError::Backend(format!(
                                "step `{}` does not belong to document `{}`",
                                updated.id.0, document.id
                            )))
                        }
                    }
                }
            }

            state.documents.insert(document.id.0.clone(), document);
            Ok(())
        })
    }
}
