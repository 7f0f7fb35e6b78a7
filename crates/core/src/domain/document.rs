use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which upstream form produced the document. Rendering and field validation
/// happen before submission; the engine never branches on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    LeaveRequest,
    ExpenseReport,
    BusinessTrip,
    ExpenseSettlement,
    Apology,
    InternalApproval,
    WorkReport,
    Resignation,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeaveRequest => "leave_request",
            Self::ExpenseReport => "expense_report",
            Self::BusinessTrip => "business_trip",
            Self::ExpenseSettlement => "expense_settlement",
            Self::Apology => "apology",
            Self::InternalApproval => "internal_approval",
            Self::WorkReport => "work_report",
            Self::Resignation => "resignation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leave_request" => Some(Self::LeaveRequest),
            "expense_report" => Some(Self::ExpenseReport),
            "business_trip" => Some(Self::BusinessTrip),
            "expense_settlement" => Some(Self::ExpenseSettlement),
            "apology" => Some(Self::Apology),
            "internal_approval" => Some(Self::InternalApproval),
            "work_report" => Some(Self::WorkReport),
            "resignation" => Some(Self::Resignation),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    InProgress,
    Approved,
    Rejected,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "in_progress" => Some(Self::InProgress),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

/// A submitted request routed through an ordered approval chain.
///
/// `content_json` is the opaque form payload; it is immutable after creation
/// and the engine never inspects it. `version` is the optimistic concurrency
/// token: every committed mutation increments it, and the persistence gateway
/// refuses a write whose expected version no longer matches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub document_type: DocumentType,
    pub author_id: ActorId,
    pub content_json: String,
    pub status: DocumentStatus,
    pub current_step: Option<u32>,
    pub version: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        matches!(
            (self.status, next),
            (DocumentStatus::Draft, DocumentStatus::InProgress)
                | (DocumentStatus::InProgress, DocumentStatus::Approved)
                | (DocumentStatus::InProgress, DocumentStatus::Rejected)
                | (DocumentStatus::InProgress, DocumentStatus::Cancelled)
        )
    }
}
