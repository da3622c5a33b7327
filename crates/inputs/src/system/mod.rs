//! Host telemetry sampler
//!
//! A timed sampler publishing one typed record per tick through the same
//! pipeline file records use. CPU and memory are always collected; disk and
//! network sections are opt-in. Counter-backed metrics (CPU usage, disk
//! I/O, network traffic) are per-tick deltas, zero on the first sample.
//!
//! Collectors read procfs/sysfs directly with a couple of libc calls
//! (`getloadavg`, `statvfs`); there is no shelling out and no heavyweight
//! system-information dependency.

pub mod cpu;
pub mod disk;
pub mod mem;
pub mod net;
pub mod proc;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use lodge_schema::{Field, FieldType, Record, Value};

use crate::Processor;
use crate::error::InputError;

/// Default sampling period.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Failure reading one telemetry source; the tick is logged and skipped.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("read {path}: {source}")]
    Proc {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl SampleError {
    pub(crate) fn proc(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Proc {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// System section of an agent's configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemConfig {
    /// Sampling period, e.g. "60s". Default: 60 seconds.
    #[serde(default)]
    pub interval: Option<String>,

    /// Path whose filesystem and backing device to sample. Enables the
    /// disk section.
    #[serde(default)]
    pub disk_path: Option<String>,

    /// Network section; `interface: default` resolves the default-route
    /// interface.
    #[serde(default)]
    pub net: Option<NetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetConfig {
    pub interface: String,
}

struct SamplerState {
    cpu: cpu::CpuStats,
    disk: Option<disk::DiskStats>,
    net: Option<net::NetStats>,
}

struct SamplerShared {
    interval: Duration,
    processor: Arc<dyn Processor>,
    state: Mutex<SamplerState>,
}

/// The periodic host telemetry input.
pub struct SystemSampler {
    shared: Arc<SamplerShared>,
    token: CancellationToken,
}

impl SystemSampler {
    pub fn init(
        config: &SystemConfig,
        processor: Arc<dyn Processor>,
    ) -> Result<Self, InputError> {
        let interval = match &config.interval {
            Some(value) => lodge_timing::duration::parse(value)?,
            None => DEFAULT_INTERVAL,
        };

        let disk = config.disk_path.as_deref().map(disk::DiskStats::init);

        let net = match &config.net {
            Some(net) => Some(
                net::NetStats::init(&net.interface)
                    .map_err(|e| InputError::NetworkInterface(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            shared: Arc::new(SamplerShared {
                interval,
                processor,
                state: Mutex::new(SamplerState {
                    cpu: cpu::CpuStats::default(),
                    disk,
                    net,
                }),
            }),
            token: CancellationToken::new(),
        })
    }

    /// The sampler's schema. An agent without explicit fields adopts this.
    pub fn fields(&self) -> Vec<Field> {
        let state = self.shared.state.lock();
        schema_fields(state.disk.is_some(), state.net.is_some())
    }

    /// Spawn the sampling loop: one sample immediately, then one per tick.
    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let token = self.token.clone();

        tokio::spawn(async move {
            collect(&shared).await;

            let mut ticker = tokio::time::interval(shared.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // the first tick completes immediately

            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => collect(&shared).await,
                }
            }
        });
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }
}

async fn collect(shared: &SamplerShared) {
    let record = {
        let mut state = shared.state.lock();
        match sample(&mut state) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "failed to collect system status");
                return;
            }
        }
    };

    shared.processor.write(record).await;
}

fn sample(state: &mut SamplerState) -> Result<Record, SampleError> {
    let mut record = Record::new();

    record.insert("time".to_string(), Value::Int(Utc::now().timestamp_millis()));
    record.insert("uptime".to_string(), Value::Int(proc::uptime()?));

    state.cpu.collect(&mut record)?;
    mem::collect(&mut record)?;

    if let Some(disk) = &mut state.disk {
        disk.collect(&mut record)?;
    }
    if let Some(net) = &mut state.net {
        net.collect(&mut record);
    }

    Ok(record)
}

/// The sampler schema for a configuration: always time, uptime, CPU, and
/// memory, plus the enabled optional sections.
pub fn default_fields(config: &SystemConfig) -> Vec<Field> {
    schema_fields(config.disk_path.is_some(), config.net.is_some())
}

fn schema_fields(with_disk: bool, with_net: bool) -> Vec<Field> {
    let mut fields = vec![
        Field::new("time", FieldType::Time),
        Field::described("uptime", FieldType::Int, "System uptime in seconds"),
    ];
    fields.extend(cpu::fields());
    fields.extend(mem::fields());
    if with_disk {
        fields.extend(disk::fields());
    }
    if with_net {
        fields.extend(net::fields());
    }
    fields
}

/// Round to two decimal places, the precision all percentage and load
/// metrics are reported at.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
