//! Component wiring for the `meridian` supervisor binary, split out as a
//! library so integration tests can drive a fully wired `App` directly
//! without shelling out to the CLI.

pub mod app;
pub mod commands;
pub mod config;
pub mod guarded_activity;
pub mod output;

pub use app::{App, AppError};
pub use config::Config;
