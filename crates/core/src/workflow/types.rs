use serde::{Deserialize, Serialize};

use crate::domain::document::{ActorId, Document, DocumentType};
use crate::domain::referrer::Referrer;
use crate::domain::step::ApprovalStep;

/// Resolution action taken by the active approver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Approve,
    Reject,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Author-supplied input for a submission. The engine assigns identifiers,
/// timestamps, and the initial chain state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftDocument {
    pub document_type: DocumentType,
    pub author_id: ActorId,
    pub content_json: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub document: Document,
    pub steps: Vec<ApprovalStep>,
    pub referrers: Vec<Referrer>,
}

/// Result of one resolved action, returned so callers can refresh their view
/// without refetching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub document: Document,
    pub resolved_step: ApprovalStep,
    /// Approver of the step that just entered `Waiting`, when the chain
    /// advanced rather than finalized.
    pub activated_approver: Option<ActorId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainView {
    pub document: Document,
    pub steps: Vec<ApprovalStep>,
    pub referrers: Vec<Referrer>,
}

#[cfg(test)]
mod tests {
    use super::StepAction;

    #[test]
    fn step_action_round_trips_from_wire_encoding() {
        for action in [StepAction::Approve, StepAction::Reject] {
            assert_eq!(StepAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(StepAction::parse("escalate"), None);
    }
}
