use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::document::{ActorId, DocumentId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotReached,
    Waiting,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotReached => "not_reached",
            Self::Waiting => "waiting",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_reached" => Some(Self::NotReached),
            "waiting" => Some(Self::Waiting),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// One approver's slot in a document's ordered chain.
///
/// `sequence` is 1-based and contiguous per document. A step enters `Waiting`
/// only from `NotReached`, and only when the immediately preceding step is
/// approved (or at submission for sequence 1). `comment` and `processed_at`
/// are settable only at the moment the step is resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: StepId,
    pub document_id: DocumentId,
    pub approver_id: ActorId,
    pub sequence: u32,
    pub status: StepStatus,
    pub comment: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::StepStatus;

    #[test]
    fn step_status_round_trips_from_storage_encoding() {
        let cases = [
            StepStatus::NotReached,
            StepStatus::Waiting,
            StepStatus::Approved,
            StepStatus::Rejected,
        ];

        for status in cases {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn mixed_language_status_literals_are_rejected() {
        assert_eq!(StepStatus::parse("대기"), None);
        assert_eq!(StepStatus::parse("pending"), None);
    }

    #[test]
    fn only_resolved_statuses_are_terminal() {
        assert!(StepStatus::Approved.is_terminal());
        assert!(StepStatus::Rejected.is_terminal());
        assert!(!StepStatus::Waiting.is_terminal());
        assert!(!StepStatus::NotReached.is_terminal());
    }
}
