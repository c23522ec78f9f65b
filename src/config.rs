//! Server configuration.
//!
//! Every option can be given on the command line or through a `BOLTKV_*`
//! environment variable; flags win over the environment.

use crate::persistence::{FileSnapshotStore, SnapshotStore};
use crate::storage::ExpiryConfig;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// BoltKV server options.
#[derive(Parser, Debug, Clone)]
#[command(name = "boltkv")]
#[command(about = "An in-memory, Redis-compatible key-value server")]
#[command(version)]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "BOLTKV_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "BOLTKV_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Snapshot file used by SAVE, BGSAVE and startup loading
    #[arg(long, env = "BOLTKV_DBFILENAME", default_value = "dump.bkv")]
    pub dbfilename: PathBuf,

    /// Disable snapshots entirely
    #[arg(long, env = "BOLTKV_NO_PERSISTENCE")]
    pub no_persistence: bool,

    /// Milliseconds between background expiry sweeps
    #[arg(
        long,
        env = "BOLTKV_SWEEP_INTERVAL_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sweep_interval_ms: u64,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "BOLTKV_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            dbfilename: PathBuf::from("dump.bkv"),
            no_persistence: false,
            sweep_interval_ms: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn expiry_config(&self) -> ExpiryConfig {
        ExpiryConfig::with_interval(Duration::from_millis(self.sweep_interval_ms))
    }

    /// The snapshot store to use, or `None` when persistence is disabled.
    pub fn snapshot_store(&self) -> Option<Arc<dyn SnapshotStore>> {
        if self.no_persistence {
            return None;
        }
        Some(Arc::new(FileSnapshotStore::new(self.dbfilename.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["boltkv"]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:6379");
        assert_eq!(config.dbfilename, PathBuf::from("dump.bkv"));
        assert_eq!(config.expiry_config().interval, Duration::from_secs(1));
        assert!(config.snapshot_store().is_some());
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "boltkv",
            "--host",
            "0.0.0.0",
            "-p",
            "6380",
            "--sweep-interval-ms",
            "250",
            "--no-persistence",
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:6380");
        assert_eq!(config.expiry_config().interval, Duration::from_millis(250));
        assert!(config.snapshot_store().is_none());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::try_parse_from(["boltkv", "--port", "http"]).is_err());
        assert!(Config::try_parse_from(["boltkv", "--sweep-interval-ms", "0"]).is_err());
    }

    #[test]
    fn test_default_matches_parsed_defaults() {
        let parsed = Config::try_parse_from(["boltkv"]).unwrap();
        let built = Config::default();
        assert_eq!(parsed.bind_address(), built.bind_address());
        assert_eq!(parsed.sweep_interval_ms, built.sweep_interval_ms);
        assert_eq!(parsed.log_level, built.log_level);
    }
}
