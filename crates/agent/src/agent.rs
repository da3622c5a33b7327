//! Agent composition

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use lodge_inputs::file::{FileWatcher, FileWatcherConfig};
use lodge_inputs::system::{self, SystemConfig, SystemSampler};
use lodge_inputs::{OffsetRegistry, Processor};
use lodge_schema::{CompiledField, Field, FieldType, Record};
use lodge_storage::{Retention, RetentionConfig, StorageDriver};

use crate::error::AgentError;

/// One agent as it appears under `agents:` in the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    /// Ordered schema. May be empty for an agent with a system input, which
    /// then adopts the sampler's fields.
    #[serde(default)]
    pub fields: Vec<Field>,

    /// File-tailing input.
    #[serde(default)]
    pub file: Option<FileWatcherConfig>,

    /// Host telemetry input.
    #[serde(default)]
    pub system: Option<SystemConfig>,

    /// Time-based retention of stored records.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// The serialization half of an agent, shared with its inputs.
struct AgentCore {
    name: String,
    schema: Vec<CompiledField>,
    storage: Arc<dyn StorageDriver>,
}

impl AgentCore {
    /// Project a raw string map into a typed record, substituting each
    /// field's default where conversion yields nothing. Deterministic for a
    /// given raw map.
    fn serialize(&self, data: &HashMap<String, String>) -> Record {
        self.schema
            .iter()
            .map(|field| {
                let value = field
                    .convert(data)
                    .unwrap_or_else(|| field.default_value());
                (field.name().to_string(), value)
            })
            .collect()
    }
}

#[async_trait]
impl Processor for AgentCore {
    async fn process(&self, data: HashMap<String, String>) {
        let record = self.serialize(&data);
        self.write(record).await;
    }

    async fn write(&self, record: Record) {
        self.storage.write(&self.name, record).await;
    }
}

/// A fully initialized agent. Created by [`Agent::init`], which also runs
/// the schema migration; `start`/`stop` cascade to inputs and retention.
pub struct Agent {
    core: Arc<AgentCore>,
    retention_field: String,
    file: Option<FileWatcher>,
    system: Option<SystemSampler>,
    retention: Retention,
}

impl Agent {
    pub async fn init(
        name: &str,
        config: &AgentConfig,
        storage: Arc<dyn StorageDriver>,
        offsets: OffsetRegistry,
    ) -> Result<Self, AgentError> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AgentError::InvalidName(name.to_string()));
        }

        // Explicit fields, or the sampler's schema for a system-only agent.
        let specs: Vec<Field> = if !config.fields.is_empty() {
            config.fields.clone()
        } else if let Some(system) = &config.system {
            system::default_fields(system)
        } else {
            return Err(AgentError::NoFields);
        };

        let mut schema = Vec::with_capacity(specs.len());
        let mut seen = HashSet::new();
        for spec in &specs {
            let field = spec.compile()?;
            if !seen.insert(field.name().to_string()) {
                return Err(AgentError::DuplicateField(field.name().to_string()));
            }
            schema.push(field);
        }

        // The first time field is the retention key.
        let retention_field = schema
            .iter()
            .find(|f| f.kind() == FieldType::Time)
            .map(|f| f.name().to_string())
            .ok_or(AgentError::NoTimeField)?;

        storage.migrate(name, &schema).await?;

        let core = Arc::new(AgentCore {
            name: name.to_string(),
            schema,
            storage: Arc::clone(&storage),
        });

        let file = match &config.file {
            Some(file) => Some(FileWatcher::init(
                file,
                Arc::clone(&core) as Arc<dyn Processor>,
                offsets,
            )?),
            None => None,
        };

        let system = match &config.system {
            Some(system) => Some(SystemSampler::init(
                system,
                Arc::clone(&core) as Arc<dyn Processor>,
            )?),
            None => None,
        };

        let retention = config
            .retention
            .build(name, &retention_field, storage)?;

        Ok(Self {
            core,
            retention_field,
            file,
            system,
            retention,
        })
    }

    pub fn start(&self) {
        tracing::info!(agent = %self.core.name, "starting agent");

        if let Some(file) = &self.file {
            file.start();
        }
        if let Some(system) = &self.system {
            system.start();
        }
        self.retention.start();
    }

    pub fn stop(&self) {
        tracing::info!(agent = %self.core.name, "stopping agent");

        if let Some(file) = &self.file {
            file.stop();
        }
        if let Some(system) = &self.system {
            system.stop();
        }
        self.retention.stop();
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn schema(&self) -> &[CompiledField] {
        &self.core.schema
    }

    pub fn retention_field(&self) -> &str {
        &self.retention_field
    }

    /// Project a raw string map into a typed record in schema order,
    /// substituting per-type defaults for absent values.
    pub fn serialize(&self, data: &HashMap<String, String>) -> Record {
        self.core.serialize(data)
    }

    /// Serialize and write one raw record, as inputs do.
    pub async fn process(&self, data: HashMap<String, String>) {
        self.core.process(data).await;
    }
}

#[cfg(test)]
#[path = "agent_test.rs"]
mod agent_test;
