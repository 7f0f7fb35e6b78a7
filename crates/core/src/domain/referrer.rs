use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::document::{ActorId, DocumentId};

/// A read-only CC recipient on a document. Referrers receive notifications
/// but never block or advance the workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referrer {
    pub document_id: DocumentId,
    pub referrer_id: ActorId,
    pub created_at: DateTime<Utc>,
}
