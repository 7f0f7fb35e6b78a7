use signoff_core::notify::{NotificationRequest, Notifier};
use tracing::info;

/// Emits notification requests as structured log events.
///
/// Stands in for a chat or mail transport; the engine treats delivery as
/// fire-and-forget either way.
#[derive(Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, request: NotificationRequest) {
        info!(
            event_name = "notification.dispatched",
            recipient = %request.recipient,
            document_id = %request.document_id,
            message = %request.message,
            "notification dispatched"
        );
    }
}
