use thiserror::Error;

use crate::domain::document::{ActorId, DocumentId};
use crate::store::StoreError;

/// Failure taxonomy for the workflow engine. Every error is terminal for the
/// calling operation; no partial transition is ever committed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("document `{0}` was not found")]
    NotFound(DocumentId),
    #[error("document `{0}` is already finalized and accepts no further actions")]
    AlreadyFinalized(DocumentId),
    #[error("document `{document_id}` has no active step at sequence {current_step:?}")]
    NoActiveStep { document_id: DocumentId, current_step: Option<u32> },
    #[error("actor `{actor_id}` is not authorized to act on document `{document_id}`")]
    NotAuthorized { document_id: DocumentId, actor_id: ActorId },
    #[error("rejecting a document requires a non-empty comment")]
    CommentRequired,
    #[error("approval chain must contain at least one approver")]
    InvalidChain,
    #[error("document `{0}` was modified concurrently; reload and retry")]
    ConcurrentModification(DocumentId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// `NoActiveStep` means the stored chain violates the single-active-step
    /// invariant. Callers should alert on it instead of retrying.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::NoActiveStep { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_) | Self::Store(StoreError::Backend(_)))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::document::{ActorId, DocumentId};
    use crate::errors::WorkflowError;
    use crate::store::StoreError;

    #[test]
    fn no_active_step_is_flagged_as_corruption() {
        let error = WorkflowError::NoActiveStep {
            document_id: DocumentId("DOC-1".to_string()),
            current_step: Some(2),
        };
        assert!(error.is_corruption());
        assert!(!error.is_retryable());
    }

    #[test]
    fn concurrent_modification_and_backend_failures_are_retryable() {
        assert!(WorkflowError::ConcurrentModification(DocumentId("DOC-1".to_string()))
            .is_retryable());
        assert!(WorkflowError::Store(StoreError::Backend("lock timeout".to_string()))
            .is_retryable());
        assert!(!WorkflowError::NotAuthorized {
            document_id: DocumentId("DOC-1".to_string()),
            actor_id: ActorId("u-2".to_string()),
        }
        .is_retryable());
    }

    #[test]
    fn messages_identify_the_offending_document() {
        let message = WorkflowError::AlreadyFinalized(DocumentId("DOC-7".to_string())).to_string();
        assert!(message.contains("DOC-7"));
    }
}
