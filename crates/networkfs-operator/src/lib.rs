//! Network filesystem manager operator
//!
//! Wires configuration, CRD installation, leader election, and the three
//! reconcilers into one process.

pub mod config;
pub mod controller_runner;

pub use config::{friendly_version, Cli, ConfigError, OperatorConfig};
