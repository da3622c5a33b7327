//! Lodge - Agent
//!
//! An agent is one named ingestion unit: an ordered schema, the inputs that
//! feed it (a file watcher, the host telemetry sampler, or both), and a
//! retention policy. Its name is also its table in the store.
//!
//! The agent is the [`Processor`] its inputs invoke: raw string maps are
//! serialized field by field in schema order (absent values become typed
//! defaults) and forwarded to storage, which assigns the cursor.

mod agent;
mod error;

pub use agent::{Agent, AgentConfig};
pub use error::AgentError;
