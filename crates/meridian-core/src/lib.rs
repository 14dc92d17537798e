//! Shared domain types, error taxonomy, and configuration for the
//! orchestration core. Every other crate in the workspace depends on this
//! one; it has no dependency on engine, registry, or transport internals.

pub mod config;
pub mod error;
pub mod model;

pub mod prelude {
    pub use crate::config::{Config, RetryDefaults};
    pub use crate::error::{CoreError, ErrorKind, Result};
    pub use crate::model::*;
}

pub use config::{Config, RetryDefaults};
pub use error::{CoreError, ErrorKind, Result};
pub use model::*;
