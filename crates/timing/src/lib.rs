//! Lodge - Timing primitives
//!
//! Two small building blocks shared across the agent:
//!
//! - [`duration`] - the `1h30m` / `2d` / `45s` duration grammar used by
//!   retention policies, sampler intervals, and relative time filters.
//! - [`debounce`] - a coalescing debouncer that turns bursts of signals
//!   into at most one deferred callback invocation per burst.

pub mod debounce;
pub mod duration;

pub use debounce::Debouncer;
pub use duration::{DurationError, matches, parse};
