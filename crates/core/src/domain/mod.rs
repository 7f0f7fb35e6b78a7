pub mod document;
pub mod referrer;
pub mod step;

pub use document::{ActorId, Document, DocumentId, DocumentStatus, DocumentType};
pub use referrer::Referrer;
pub use step::{ApprovalStep, StepId, StepStatus};
