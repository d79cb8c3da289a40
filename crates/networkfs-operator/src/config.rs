//! Command line and validated runtime configuration

use std::path::PathBuf;
use std::sync::OnceLock;

use clap::Parser;
use thiserror::Error;

use networkfs_common::telemetry::LogFormat;
use networkfs_common::{DEFAULT_NAMESPACE, LONGHORN_NAMESPACE};

/// Network filesystem manager - exports replicated volumes over NFS
#[derive(Parser, Debug)]
#[command(name = "networkfs-manager", version = friendly_version(), about, long_about = None)]
pub struct Cli {
    /// Print the NetworkFilesystem CRD manifest and exit
    #[arg(long)]
    pub crd: bool,

    /// Kubeconfig file, in-cluster or default config when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Number of objects each controller reconciles concurrently
    #[arg(long, default_value_t = 2)]
    pub threadiness: u16,

    /// Enable debug logs
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Namespace holding NetworkFilesystem resources and the leader lease
    #[arg(long, env = "HARVESTER_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Namespace of the storage subsystem
    #[arg(long, env = "LONGHORN_NAMESPACE", default_value = LONGHORN_NAMESPACE)]
    pub longhorn_namespace: String,

    /// Log line format (plain or json)
    #[arg(long, default_value = "plain")]
    pub log_format: LogFormat,

    /// Do not install or update the CRD on startup
    #[arg(long)]
    pub skip_crd_install: bool,
}

/// Reasons a configuration is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A namespace flag was empty
    #[error("{flag} must not be empty")]
    EmptyNamespace {
        /// Offending flag
        flag: &'static str,
    },

    /// Controllers need at least one worker
    #[error("threadiness must be at least 1")]
    NoWorkers,
}

/// Validated operator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Explicit kubeconfig file
    pub kubeconfig: Option<PathBuf>,
    /// Concurrent reconciles per controller
    pub threadiness: u16,
    /// Debug logging
    pub debug: bool,
    /// Namespace of NetworkFilesystem resources
    pub namespace: String,
    /// Namespace of Endpoints, ShareManagers and VolumeAttachments
    pub longhorn_namespace: String,
    /// Log format
    pub log_format: LogFormat,
    /// Install the CRD on startup
    pub install_crd: bool,
}

impl TryFrom<Cli> for OperatorConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let namespace = cli.namespace.trim().to_string();
        if namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace { flag: "--namespace" });
        }
        let longhorn_namespace = cli.longhorn_namespace.trim().to_string();
        if longhorn_namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace {
                flag: "--longhorn-namespace",
            });
        }
        if cli.threadiness == 0 {
            return Err(ConfigError::NoWorkers);
        }

        Ok(Self {
            kubeconfig: cli.kubeconfig.filter(|p| !p.as_os_str().is_empty()),
            threadiness: cli.threadiness,
            debug: cli.debug,
            namespace,
            longhorn_namespace,
            log_format: cli.log_format,
            install_crd: !cli.skip_crd_install,
        })
    }
}

/// Package version with the commit it was built from
pub fn friendly_version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| {
        let commit = option_env!("GIT_COMMIT").unwrap_or("unknown");
        format!("{} ({commit})", env!("CARGO_PKG_VERSION"))
    })
}
