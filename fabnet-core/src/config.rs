//! Deployment-level configuration (§4.I).
//!
//! `RunConfig` (see `types.rs`) is the core's only inbound *domain* configuration;
//! everything here is process-level (database connectivity, logging) and is read
//! once at startup by whatever binary embeds this crate.

use std::time::Duration;

/// Database connection settings, read from the environment with sane defaults.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/fabnet".to_string()),
            max_connections: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Top-level process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    /// Upper bound on DFS-enumerated paths per operation (§4.B guard).
    pub dfs_path_ceiling: usize,
    /// `RunConfig::max_attempts` default when the caller doesn't override it.
    pub default_max_attempts: u32,
    /// `RunConfig::timeout_seconds` default when the caller doesn't override it.
    pub default_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        // A missing .env is fine; real deployments set these directly in the environment.
        let _ = dotenvy::dotenv();
        Self {
            database: DatabaseConfig::default(),
            dfs_path_ceiling: std::env::var("FABNET_DFS_PATH_CEILING")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50_000),
            default_max_attempts: std::env::var("FABNET_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000),
            default_timeout_seconds: std::env::var("FABNET_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3_600),
        }
    }
}

/// Install a `tracing` subscriber honoring `RUST_LOG`, falling back to `info`.
///
/// Intended to be called once by the binary embedding this crate; library code
/// never installs a subscriber itself.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Mask credentials in a database URL before logging it.
pub fn mask_database_url(url: &str) -> String {
    match url.find('@') {
        Some(at) => match url.find("://") {
            Some(scheme_end) => format!("{}://***{}", &url[..scheme_end], &url[at..]),
            None => "***".to_string(),
        },
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_hides_credentials() {
        let masked = mask_database_url("postgresql://user:pw@localhost/fabnet");
        assert_eq!(masked, "postgresql://***@localhost/fabnet");
    }

    #[test]
    fn mask_passes_through_plain_url() {
        let masked = mask_database_url("postgresql://localhost/fabnet");
        assert_eq!(masked, "postgresql://localhost/fabnet");
    }

    #[test]
    fn database_config_defaults() {
        let cfg = DatabaseConfig::default();
        assert!(cfg.max_connections > 0);
    }
}
