//! Application composition
//!
//! Wires the configured pieces together in dependency order: storage, then
//! the offset registry, then agents (each running its schema migration
//! before any insert), then the HTTP server. Shutdown runs in reverse.

use std::sync::Arc;

use anyhow::{Context, Result};

use lodge_agent::Agent;
use lodge_inputs::OffsetRegistry;
use lodge_server::{AppState, Server};
use lodge_storage::StorageDriver;

use crate::config::Config;

pub struct App {
    storage: Arc<dyn StorageDriver>,
    offsets: OffsetRegistry,
    agents: Vec<Agent>,
    server: Server,
}

impl App {
    /// Open everything and start the agents and the HTTP server. Any
    /// failure here is fatal to the process.
    pub async fn open(config: Config) -> Result<Self> {
        let storage = config.storage.open().await.context("open storage")?;

        let offsets = OffsetRegistry::open(&config.file).context("open offset registry")?;

        let mut agents = Vec::with_capacity(config.agents.len());
        for (name, agent_config) in &config.agents {
            let agent = Agent::init(name, agent_config, Arc::clone(&storage), offsets.clone())
                .await
                .with_context(|| format!("init agent '{name}'"))?;
            agents.push(agent);
        }

        for agent in &agents {
            agent.start();
        }

        let state = AppState::new(
            Arc::clone(&storage),
            agents
                .iter()
                .map(|a| (a.name().to_string(), a.schema().to_vec())),
        );
        let server = config
            .server
            .open(state)
            .await
            .context("open http server")?;

        Ok(Self {
            storage,
            offsets,
            agents,
            server,
        })
    }

    /// The bound HTTP address.
    pub fn server_addr(&self) -> std::net::SocketAddr {
        self.server.local_addr()
    }

    /// Orderly shutdown: server, agents, offsets flush, storage.
    pub async fn close(self) {
        self.server.close().await;

        for agent in &self.agents {
            agent.stop();
        }

        self.offsets.close();
        self.storage.close().await;
    }
}
