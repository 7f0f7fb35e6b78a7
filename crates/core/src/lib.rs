pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod store;
pub mod workflow;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::document::{ActorId, Document, DocumentId, DocumentStatus, DocumentType};
pub use domain::referrer::Referrer;
pub use domain::step::{ApprovalStep, StepId, StepStatus};
pub use errors::WorkflowError;
pub use notify::{InMemoryNotifier, NotificationRequest, Notifier};
pub use store::{MemoryStore, StoreError, WorkflowStore};
pub use workflow::{ActionOutcome, ChainView, DraftDocument, StepAction, Submission, WorkflowEngine};
