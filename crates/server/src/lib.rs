//! Lodge - HTTP query surface
//!
//! Read-only API over the store:
//!
//! - `GET /api/query/{name}` - URL params become a [`Query`]; the response
//!   streams NDJSON rows in ascending cursor order. Bare params: `limit`
//!   (decimal), `after`/`before` (16-hex-digit cursors). Filter params:
//!   `<field>__<op>=<value>`.
//! - `GET /api/schema/{name}` - `{name, schema: [{name, type}]}`.
//! - `GET /api/agents` - `{agents: [...]}`.
//!
//! Client-input mistakes return 400 with a short text diagnostic; engine
//! failures mid-stream are logged and end the stream. Optional CORS adds
//! the configured origin with `GET, POST` methods and the
//! `Content-Type, Authorization` headers.

mod routes;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};

use lodge_schema::CompiledField;
use lodge_storage::StorageDriver;

pub use routes::build_router;

const DEFAULT_LISTEN: &str = "127.0.0.1:2111";

/// How long a closing server may spend finishing in-flight requests.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CORS origin '{0}'")]
    InvalidOrigin(String),
}

/// `server` section of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. "127.0.0.1:2111" or ":2111".
    #[serde(default)]
    pub listen: Option<String>,

    #[serde(default)]
    pub cors: Option<CorsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Allowed origin, e.g. "https://example.com" or "*".
    pub origin: String,
}

/// One agent's introspectable schema entry.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Shared state behind the routes.
#[derive(Clone)]
pub struct AppState {
    pub(crate) storage: Arc<dyn StorageDriver>,
    pub(crate) schemas: Arc<BTreeMap<String, Vec<SchemaField>>>,
}

impl AppState {
    /// Build the state from the initialized agents' schemas.
    pub fn new(
        storage: Arc<dyn StorageDriver>,
        agents: impl IntoIterator<Item = (String, Vec<CompiledField>)>,
    ) -> Self {
        let schemas = agents
            .into_iter()
            .map(|(name, fields)| {
                let schema = fields
                    .iter()
                    .map(|f| SchemaField {
                        name: f.name().to_string(),
                        kind: f.kind().as_str(),
                    })
                    .collect();
                (name, schema)
            })
            .collect();

        Self {
            storage,
            schemas: Arc::new(schemas),
        }
    }
}

impl ServerConfig {
    /// Bind the listener and start serving in a background task.
    pub async fn open(&self, state: AppState) -> Result<Server, ServerError> {
        let addr = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        let mut router = build_router(state);
        if let Some(cors) = &self.cors {
            router = router.layer(cors_layer(cors)?);
        }

        tracing::info!(listen = addr, "http server listening");

        let token = CancellationToken::new();
        let shutdown = token.clone().cancelled_owned();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "http server error");
            }
        });

        Ok(Server {
            token,
            handle,
            local_addr,
        })
    }
}

fn cors_layer(config: &CorsConfig) -> Result<CorsLayer, ServerError> {
    let origin = if config.origin == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(&config.origin)
            .map_err(|_| ServerError::InvalidOrigin(config.origin.clone()))?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]))
}

/// A running HTTP server.
pub struct Server {
    token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
    local_addr: std::net::SocketAddr,
}

impl Server {
    /// The bound address, useful when listening on an ephemeral port.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Signal shutdown and wait for in-flight requests, up to the deadline.
    pub async fn close(self) {
        self.token.cancel();
        if tokio::time::timeout(SHUTDOWN_DEADLINE, self.handle)
            .await
            .is_err()
        {
            tracing::warn!("http server did not shut down within the deadline");
        }
    }
}
