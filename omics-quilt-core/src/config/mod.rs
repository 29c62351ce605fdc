//! Layered per-invocation configuration and structured resource access.

mod context;
mod resolver;

pub use context::{ConfigContext, DEFAULTS, default_values};
pub use resolver::{ConfigResolver, resolve_key_path};
