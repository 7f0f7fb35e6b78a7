pub mod engine;
pub mod types;

pub use engine::WorkflowEngine;
pub use types::{ActionOutcome, ChainView, DraftDocument, StepAction, Submission};
