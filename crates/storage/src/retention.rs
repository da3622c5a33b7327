//! Retention driver
//!
//! One loop per agent: a cleanup immediately on start, then one every
//! `interval`, deleting rows older than `period` by the agent's retention
//! key. Cleanup failures are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use lodge_timing::duration::{self, DurationError};

use crate::StorageDriver;

/// Default retention period: 3 days.
const DEFAULT_PERIOD: Duration = Duration::from_secs(3 * 24 * 3600);

/// Default cleanup interval: 1 hour.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

/// Retention section of an agent's configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionConfig {
    /// How long records are kept, e.g. "3d". Default: 3 days.
    #[serde(default)]
    pub period: Option<String>,

    /// How often the cleanup runs, e.g. "1h". Default: 1 hour.
    #[serde(default)]
    pub interval: Option<String>,
}

impl RetentionConfig {
    /// Resolve the config into a retention driver for one agent table.
    pub fn build(
        &self,
        name: &str,
        field: &str,
        storage: Arc<dyn StorageDriver>,
    ) -> Result<Retention, DurationError> {
        let period = match &self.period {
            Some(value) => duration::parse(value)?,
            None => DEFAULT_PERIOD,
        };

        let interval = match &self.interval {
            Some(value) => duration::parse(value)?,
            None => DEFAULT_INTERVAL,
        };

        Ok(Retention {
            name: name.to_string(),
            field: field.to_string(),
            storage,
            period,
            interval,
            token: CancellationToken::new(),
        })
    }
}

/// Periodic cleanup loop for one agent table.
pub struct Retention {
    name: String,
    field: String,
    storage: Arc<dyn StorageDriver>,
    period: Duration,
    interval: Duration,
    token: CancellationToken,
}

impl Retention {
    pub fn start(&self) {
        let name = self.name.clone();
        let field = self.field.clone();
        let storage = Arc::clone(&self.storage);
        let period = self.period;
        let interval = self.interval;
        let token = self.token.clone();

        tokio::spawn(async move {
            run_cleanup(&*storage, &name, &field, period).await;

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // the first tick completes immediately

            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => run_cleanup(&*storage, &name, &field, period).await,
                }
            }
        });
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

async fn run_cleanup(storage: &dyn StorageDriver, name: &str, field: &str, period: Duration) {
    if let Err(e) = storage.cleanup(name, field, period).await {
        tracing::warn!(table = name, error = %e, "retention cleanup failed");
    }
}
