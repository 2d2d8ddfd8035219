//! Provisioning circuit breaker.
//!
//! Counts connector failures per system and operation type in a sliding
//! window. Reaching the warning limit notifies the configured recipients
//! once; reaching the disable limit opens the breaker, which makes the queue
//! skip further operations of that type until the window drains or an
//! administrator resets the counter.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use xavyo_connector::ids::SystemId;
use xavyo_connector::types::OperationType;

use crate::notify::{Notifier, BREAK_DISABLE_TEMPLATE, BREAK_WARNING_TEMPLATE};
use crate::store::{ConfigStore, StoreResult};

/// Breaker settings for one system and operation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningBreakConfig {
    pub system_id: SystemId,
    pub operation_type: OperationType,
    /// Failures in the window that trigger the warning notification.
    #[serde(default)]
    pub warning_limit: Option<u32>,
    /// Failures in the window that open the breaker.
    #[serde(default)]
    pub disable_limit: Option<u32>,
    /// Window length in seconds.
    pub period_secs: u64,
    /// Force the breaker open.
    #[serde(default)]
    pub operation_disabled: bool,
    /// Bypass the breaker entirely.
    #[serde(default)]
    pub global_disabled: bool,
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl ProvisioningBreakConfig {
    pub fn new(system_id: SystemId, operation_type: OperationType, period_secs: u64) -> Self {
        Self {
            system_id,
            operation_type,
            warning_limit: None,
            disable_limit: None,
            period_secs,
            operation_disabled: false,
            global_disabled: false,
            recipients: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_warning_limit(mut self, limit: u32) -> Self {
        self.warning_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_disable_limit(mut self, limit: u32) -> Self {
        self.disable_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn operation_disabled(mut self) -> Self {
        self.operation_disabled = true;
        self
    }

    #[must_use]
    pub fn global_disabled(mut self) -> Self {
        self.global_disabled = true;
        self
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// State of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
}

impl BreakerState {
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self == BreakerState::Open
    }
}

/// Snapshot of one counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerStatus {
    pub operation_type: OperationType,
    pub state: BreakerState,
    /// Failures inside the current window.
    pub failures: usize,
    /// Warning notification already sent for the current window.
    pub warned: bool,
}

#[derive(Debug)]
struct BreakCounter {
    failures: VecDeque<Instant>,
    period: Duration,
    warning_limit: Option<u32>,
    disable_limit: Option<u32>,
    warned: bool,
    state: BreakerState,
}

impl BreakCounter {
    fn new(config: &ProvisioningBreakConfig) -> Self {
        Self {
            failures: VecDeque::new(),
            period: config.period(),
            warning_limit: config.warning_limit,
            disable_limit: config.disable_limit,
            warned: false,
            state: BreakerState::Closed,
        }
    }

    fn configure(&mut self, config: &ProvisioningBreakConfig) {
        self.period = config.period();
        self.warning_limit = config.warning_limit;
        self.disable_limit = config.disable_limit;
    }

    /// Drop failures older than the window and re-arm flags accordingly.
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.failures.front() {
            if now.saturating_duration_since(*oldest) >= self.period {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        let count = self.failures.len();
        if !reached(count, self.warning_limit) {
            self.warned = false;
        }
        if !reached(count, self.disable_limit) {
            self.state = BreakerState::Closed;
        }
    }
}

fn reached(count: usize, limit: Option<u32>) -> bool {
    limit.is_some_and(|limit| count >= limit as usize)
}

struct PendingNotification {
    template: &'static str,
    limit: u32,
    failures: usize,
}

type CounterKey = (SystemId, OperationType);

/// Sliding-window breaker over connector failures.
pub struct ProvisioningBreaker {
    configs: Arc<dyn ConfigStore>,
    notifier: Arc<dyn Notifier>,
    counters: Mutex<HashMap<CounterKey, BreakCounter>>,
}

impl ProvisioningBreaker {
    pub fn new(configs: Arc<dyn ConfigStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            configs,
            notifier,
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<CounterKey, BreakCounter>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether operations of this type may run against the system.
    ///
    /// Without a configuration the breaker is bypassed.
    #[instrument(skip(self), fields(system_id = %system_id, operation = %operation_type))]
    pub async fn check(
        &self,
        system_id: SystemId,
        operation_type: OperationType,
    ) -> StoreResult<BreakerState> {
        let Some(config) = self
            .configs
            .get_break_config(system_id, operation_type)
            .await?
        else {
            return Ok(BreakerState::Closed);
        };

        if config.global_disabled {
            return Ok(BreakerState::Closed);
        }
        if config.operation_disabled {
            return Ok(BreakerState::Open);
        }

        let now = Instant::now();
        let mut counters = self.counters();
        let state = match counters.get_mut(&(system_id, operation_type)) {
            Some(counter) => {
                counter.configure(&config);
                counter.prune(now);
                counter.state
            }
            None => BreakerState::Closed,
        };
        Ok(state)
    }

    /// Count one failed connector call.
    #[instrument(skip(self), fields(system_id = %system_id, operation = %operation_type))]
    pub async fn record_failure(
        &self,
        system_id: SystemId,
        operation_type: OperationType,
    ) -> StoreResult<()> {
        let Some(config) = self
            .configs
            .get_break_config(system_id, operation_type)
            .await?
        else {
            return Ok(());
        };
        if config.global_disabled {
            return Ok(());
        }

        let pending = {
            let now = Instant::now();
            let mut counters = self.counters();
            let counter = counters
                .entry((system_id, operation_type))
                .or_insert_with(|| BreakCounter::new(&config));
            counter.configure(&config);
            counter.prune(now);
            counter.failures.push_back(now);

            let failures = counter.failures.len();
            let mut pending = Vec::new();
            if let Some(limit) = config.warning_limit {
                if failures >= limit as usize && !counter.warned {
                    counter.warned = true;
                    pending.push(PendingNotification {
                        template: BREAK_WARNING_TEMPLATE,
                        limit,
                        failures,
                    });
                }
            }
            if let Some(limit) = config.disable_limit {
                if failures >= limit as usize && !counter.state.is_open() {
                    counter.state = BreakerState::Open;
                    pending.push(PendingNotification {
                        template: BREAK_DISABLE_TEMPLATE,
                        limit,
                        failures,
                    });
                }
            }
            pending
        };

        for notification in pending {
            if notification.template == BREAK_DISABLE_TEMPLATE {
                warn!(failures = notification.failures, "Provisioning breaker opened");
            } else {
                warn!(failures = notification.failures, "Provisioning breaker warning limit reached");
            }
            let context = serde_json::json!({
                "system_id": system_id.to_string(),
                "operation_type": operation_type.as_str(),
                "failures": notification.failures,
                "limit": notification.limit,
                "period_secs": config.period_secs,
            });
            if let Err(e) = self
                .notifier
                .send(notification.template, &config.recipients, context)
                .await
            {
                warn!(error = %e, template = notification.template, "Failed to send breaker notification");
            }
        }
        Ok(())
    }

    /// Clear the counter of one system and operation type.
    pub fn reset(&self, system_id: SystemId, operation_type: OperationType) {
        if self.counters().remove(&(system_id, operation_type)).is_some() {
            info!(system_id = %system_id, operation = %operation_type, "Provisioning breaker reset");
        }
    }

    /// Status of every counter of a system.
    #[must_use]
    pub fn status(&self, system_id: SystemId) -> Vec<BreakerStatus> {
        let now = Instant::now();
        let mut counters = self.counters();
        let mut statuses: Vec<BreakerStatus> = counters
            .iter_mut()
            .filter(|((system, _), _)| *system == system_id)
            .map(|((_, operation_type), counter)| {
                counter.prune(now);
                BreakerStatus {
                    operation_type: *operation_type,
                    state: counter.state,
                    failures: counter.failures.len(),
                    warned: counter.warned,
                }
            })
            .collect();
        statuses.sort_by_key(|s| s.operation_type.as_str());
        statuses
    }
}

impl std::fmt::Debug for ProvisioningBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningBreaker").finish_non_exhaustive()
    }
}
