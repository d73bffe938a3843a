//! Core types and utilities for perma-deploy
//!
//! # Modules
//!
//! - `command`: Typed shell command builder and quoting
//! - `config`: Environment file loading
//! - `error`: Error types and Result alias
//! - `execution`: Task run records
//! - `settings`: Deployment configuration

pub mod command;
pub mod config;
pub mod error;
pub mod execution;
pub mod settings;

// Re-exports
pub use command::{quote, ShellCommand};
pub use error::{Error, Result};
pub use execution::{RunStatus, TaskRun};
pub use settings::{DatabaseSettings, DeploymentConfig, ReleaseSettings};
