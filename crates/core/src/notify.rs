use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::domain::document::{ActorId, DocumentId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub recipient: ActorId,
    pub document_id: DocumentId,
    pub message: String,
}

impl NotificationRequest {
    pub fn new(
        recipient: ActorId,
        document_id: DocumentId,
        message: impl Into<String>,
    ) -> Self {
        Self { recipient, document_id, message: message.into() }
    }
}

/// Delivery transport for "notify approver X about document Y" requests.
///
/// Fire-and-forget: a delivery failure must never roll back the state
/// transition that triggered it, so the contract surfaces no error.
pub trait Notifier: Send + Sync {
    fn notify(&self, request: NotificationRequest);
}

#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    requests: Arc<Mutex<Vec<NotificationRequest>>>,
}

impl InMemoryNotifier {
    pub fn requests(&self) -> Vec<NotificationRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, request: NotificationRequest) {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }
    }
}
