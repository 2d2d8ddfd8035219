//! Notification delivery for provisioning alerts.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Template sent when a breaker reaches its warning limit.
pub const BREAK_WARNING_TEMPLATE: &str = "provisioning-break-warning";

/// Template sent when a breaker opens.
pub const BREAK_DISABLE_TEMPLATE: &str = "provisioning-break-disable";

/// Errors raised by notifiers.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Delivery failed.
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Result type for notification delivery.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Sends templated notifications to a list of recipients.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `template_id` rendered with `context`.
    async fn send(
        &self,
        template_id: &str,
        recipients: &[String],
        context: serde_json::Value,
    ) -> NotifyResult<()>;
}

/// Notifier that only writes the notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(
        &self,
        template_id: &str,
        recipients: &[String],
        context: serde_json::Value,
    ) -> NotifyResult<()> {
        info!(
            template_id = %template_id,
            recipients = ?recipients,
            context = %context,
            "Notification"
        );
        Ok(())
    }
}
