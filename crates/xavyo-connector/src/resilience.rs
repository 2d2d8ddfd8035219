//! Resilience helpers for connector operations.
//!
//! Every call into a target system races a bounded timeout; an elapsed call is
//! reported as [`ConnectorError::ConnectionTimeout`] so callers can treat it
//! like any other transient failure.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ConnectorError, ConnectorResult};

/// Run a connector call, failing with `ConnectionTimeout` if it does not
/// finish within `timeout`.
///
/// The in-flight future is dropped on timeout; the target system may still
/// complete the request on its side.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> ConnectorResult<T>
where
    F: Future<Output = ConnectorResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Connector call timed out");
            Err(ConnectorError::ConnectionTimeout {
                timeout_secs: timeout.as_secs(),
            })
        }
    }
}
