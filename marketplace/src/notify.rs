//! Fire-and-forget delivery of committed ledger events.
//!
//! Events are handed to the sink on a spawned task after the commit returned, so a
//! slow or failing sink can neither block nor undo a stock mutation.

use std::sync::Arc;
use surplus_core::environment::{CollaboratorError, CollaboratorFuture, NotificationSink};
use surplus_core::ledger::LedgerEvent;
use tokio::task::JoinHandle;

/// Sends events to an optional [`NotificationSink`].
#[derive(Clone, Default)]
pub struct Dispatcher {
    sink: Option<Arc<dyn NotificationSink>>,
}

impl Dispatcher {
    /// Deliver to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Drop every event.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { sink: None }
    }

    /// Spawn delivery of `event`. Failures are logged and otherwise ignored.
    pub fn dispatch(&self, event: LedgerEvent) -> Option<JoinHandle<()>> {
        let sink = Arc::clone(self.sink.as_ref()?);
        Some(tokio::spawn(async move {
            let event_type = event.event_type();
            let listing_id = event.listing_id();
            match sink.notify(event).await {
                Ok(()) => tracing::debug!(event_type, %listing_id, "Notification delivered"),
                Err(error) => tracing::warn!(
                    event_type,
                    %listing_id,
                    error = %error,
                    "Notification failed, stock change stands"
                ),
            }
        }))
    }
}

/// Writes every event to the `audit` tracing target as JSON.
///
/// Default sink of the server binary until push delivery is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogSink;

impl NotificationSink for AuditLogSink {
    fn notify(&self, event: LedgerEvent) -> CollaboratorFuture<'_, ()> {
        Box::pin(async move {
            let payload = serde_json::to_string(&event)
                .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
            tracing::info!(
                target: "audit",
                event_type = event.event_type(),
                %payload,
                "Ledger event"
            );
            Ok(())
        })
    }
}
