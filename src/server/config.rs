// Command-line and environment settings for the territory server
// Shared by the master process and its workers

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use tracing::{info, warn};

use crate::engine::graphql::SchemaOptions;
use crate::engine::{DatabaseConfig, InMemoryStorage, MySqlStorage, TerritoryStorage};
use crate::server::graphql::{GraphQLServerConfig, TlsConfig};
use crate::server::supervisor::RestartPolicy;
use crate::{Result, TerritoryError};

/// Deployment mode; production adds the HTTPS listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

/// MySQL connection settings
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// MySQL host
    #[arg(id = "db_host", long = "db-host", env = "TERRITORY_SERVER")]
    pub host: Option<String>,

    /// MySQL port
    #[arg(id = "db_port", long = "db-port", env = "TERRITORY_DB_PORT", default_value_t = 3306)]
    pub port: u16,

    /// MySQL user
    #[arg(id = "db_user", long = "db-user", env = "TERRITORY_USERID", default_value = "root")]
    pub user: String,

    /// MySQL password
    #[arg(
        id = "db_password",
        long = "db-password",
        env = "TERRITORY_PASSWORD",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub password: String,

    /// Database (schema) name
    #[arg(id = "db_name", long = "db-name", env = "TERRITORY_DATABASE", default_value = "territory")]
    pub database: String,

    /// Connections per worker process
    #[arg(id = "db_pool_size", long = "db-pool-size", env = "TERRITORY_DB_POOL_SIZE", default_value_t = 10)]
    pub pool_size: u32,

    /// Seconds a request waits for a pooled connection
    #[arg(
        id = "db_acquire_timeout",
        long = "db-acquire-timeout",
        env = "TERRITORY_DB_ACQUIRE_TIMEOUT",
        default_value_t = 30
    )]
    pub acquire_timeout_secs: u64,
}

impl DatabaseArgs {
    pub fn to_config(&self) -> Result<DatabaseConfig> {
        let host = self
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| {
                TerritoryError::Config(
                    "database host is not set (TERRITORY_SERVER or --db-host)".to_string(),
                )
            })?;

        if self.pool_size == 0 {
            return Err(TerritoryError::Config(
                "database pool size must be at least 1".to_string(),
            ));
        }

        Ok(DatabaseConfig {
            host,
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            max_connections: self.pool_size,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        })
    }
}

/// Everything a worker needs to build its storage, schema and listeners
#[derive(Args, Debug, Clone)]
pub struct ServerSettings {
    /// development or production
    #[arg(
        long = "env",
        env = "ENV",
        value_enum,
        ignore_case = true,
        default_value_t = Environment::Development
    )]
    pub environment: Environment,

    /// Address to bind
    #[arg(long, env = "TERRITORY_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// HTTP port
    #[arg(long, env = "TERRITORY_PORT", default_value_t = 4000)]
    pub port: u16,

    /// HTTPS port (production only)
    #[arg(long, env = "TERRITORY_PORT_TLS", default_value_t = 4443)]
    pub tls_port: u16,

    /// PEM private key for HTTPS
    #[arg(long, env = "PRIVATE_KEY_FILE")]
    pub private_key_file: Option<PathBuf>,

    /// PEM certificate chain for HTTPS
    #[arg(long, env = "CERTIFICATE_FILE")]
    pub certificate_file: Option<PathBuf>,

    /// Keep data in process memory instead of MySQL
    #[arg(long, env = "TERRITORY_IN_MEMORY")]
    pub in_memory: bool,

    /// Activity logs allowed per checkout/address pair (0 disables)
    #[arg(long, env = "TERRITORY_ACTIVITY_LOG_LIMIT", default_value_t = 3)]
    pub activity_log_limit: usize,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

impl ServerSettings {
    pub fn schema_options(&self) -> SchemaOptions {
        SchemaOptions {
            activity_log_limit: (self.activity_log_limit > 0).then_some(self.activity_log_limit),
        }
    }

    /// HTTPS settings, present only in production
    pub fn tls_config(&self) -> Result<Option<TlsConfig>> {
        if self.environment != Environment::Production {
            return Ok(None);
        }
        match (&self.private_key_file, &self.certificate_file) {
            (Some(key), Some(cert)) => Ok(Some(TlsConfig {
                port: self.tls_port,
                private_key_file: key.clone(),
                certificate_file: cert.clone(),
            })),
            _ => Err(TerritoryError::Config(
                "production requires PRIVATE_KEY_FILE and CERTIFICATE_FILE".to_string(),
            )),
        }
    }

    pub fn server_config(&self, reuse_port: bool) -> Result<GraphQLServerConfig> {
        Ok(GraphQLServerConfig {
            host: self.host,
            port: self.port,
            cors_enabled: true,
            reuse_port,
            tls: self.tls_config()?,
        })
    }

    /// Build the storage backend; the MySQL pool connects lazily
    pub fn build_storage(&self) -> Result<Arc<dyn TerritoryStorage>> {
        if self.in_memory {
            warn!("Using in-memory storage; data is lost on exit and not shared between workers");
            return Ok(Arc::new(InMemoryStorage::new()));
        }

        let config = self.database.to_config()?;
        info!(
            "Using MySQL storage at {}:{}/{} (pool of {})",
            config.host, config.port, config.database, config.max_connections
        );
        Ok(Arc::new(MySqlStorage::connect_lazy(&config)))
    }

    /// Environment assignments that reproduce these settings in a child process
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            ("ENV", self.environment.as_str().to_string()),
            ("TERRITORY_HOST", self.host.to_string()),
            ("TERRITORY_PORT", self.port.to_string()),
            ("TERRITORY_PORT_TLS", self.tls_port.to_string()),
            ("TERRITORY_IN_MEMORY", self.in_memory.to_string()),
            (
                "TERRITORY_ACTIVITY_LOG_LIMIT",
                self.activity_log_limit.to_string(),
            ),
            ("TERRITORY_DB_PORT", self.database.port.to_string()),
            ("TERRITORY_USERID", self.database.user.clone()),
            ("TERRITORY_PASSWORD", self.database.password.clone()),
            ("TERRITORY_DATABASE", self.database.database.clone()),
            ("TERRITORY_DB_POOL_SIZE", self.database.pool_size.to_string()),
            (
                "TERRITORY_DB_ACQUIRE_TIMEOUT",
                self.database.acquire_timeout_secs.to_string(),
            ),
        ];
        if let Some(host) = &self.database.host {
            vars.push(("TERRITORY_SERVER", host.clone()));
        }
        if let Some(key) = &self.private_key_file {
            vars.push(("PRIVATE_KEY_FILE", key.display().to_string()));
        }
        if let Some(cert) = &self.certificate_file {
            vars.push(("CERTIFICATE_FILE", cert.display().to_string()));
        }
        vars
    }
}

/// Master process settings
#[derive(Args, Debug, Clone)]
pub struct SupervisorArgs {
    /// Worker processes to run (defaults to the number of CPU cores)
    #[arg(long, env = "TERRITORY_WORKERS")]
    pub workers: Option<usize>,

    /// First restart delay in milliseconds
    #[arg(long, default_value_t = 100)]
    pub initial_backoff_ms: u64,

    /// Largest restart delay in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub max_backoff_ms: u64,

    /// Restarts allowed within one window before the master gives up
    #[arg(long, default_value_t = 10)]
    pub max_restarts: usize,

    /// Length of the restart window in seconds
    #[arg(long, default_value_t = 60)]
    pub restart_window_secs: u64,
}

impl SupervisorArgs {
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_restarts: self.max_restarts,
            window: Duration::from_secs(self.restart_window_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        settings: ServerSettings,

        #[command(flatten)]
        supervisor: SupervisorArgs,
    }

    fn parse(args: &[&str]) -> TestCli {
        let mut argv = vec!["server"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["--db-host", "db.local"]);
        let settings = cli.settings;

        assert_eq!(settings.port, 4000);
        assert_eq!(settings.tls_port, 4443);
        assert_eq!(settings.database.database, "territory");
        assert_eq!(settings.database.pool_size, 10);
        assert_eq!(settings.schema_options().activity_log_limit, Some(3));
        assert!(settings.tls_config().unwrap().is_none());

        let policy = cli.supervisor.restart_policy();
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
        assert_eq!(policy.max_restarts, 10);
        assert_eq!(policy.window, Duration::from_secs(60));
        assert!(cli.supervisor.worker_count() >= 1);
    }

    #[test]
    fn test_zero_limit_disables_check() {
        let cli = parse(&["--activity-log-limit", "0"]);
        assert_eq!(cli.settings.schema_options().activity_log_limit, None);
    }

    #[test]
    fn test_production_needs_tls_files() {
        let cli = parse(&["--env", "production"]);
        let err = tokio_test::assert_err!(cli.settings.tls_config());
        assert!(matches!(err, TerritoryError::Config(_)));

        let cli = parse(&[
            "--env",
            "PRODUCTION",
            "--private-key-file",
            "/etc/territory/key.pem",
            "--certificate-file",
            "/etc/territory/cert.pem",
        ]);
        let tls = cli.settings.tls_config().unwrap().unwrap();
        assert_eq!(tls.port, 4443);
        assert_eq!(tls.private_key_file, PathBuf::from("/etc/territory/key.pem"));
    }

    #[test]
    fn test_database_host_required() {
        let cli = parse(&[]);
        assert!(matches!(
            cli.settings.database.to_config(),
            Err(TerritoryError::Config(_))
        ));
        assert!(cli.settings.build_storage().is_err());

        let cli = parse(&["--in-memory"]);
        assert!(cli.settings.build_storage().is_ok());
    }

    #[test]
    fn test_explicit_worker_count() {
        let cli = parse(&["--workers", "3"]);
        assert_eq!(cli.supervisor.worker_count(), 3);
    }

    #[test]
    fn test_env_round_trip() {
        let cli = parse(&[
            "--db-host",
            "db.local",
            "--db-password",
            "s3cr3t",
            "--port",
            "8080",
            "--in-memory",
        ]);
        let vars = cli.settings.to_env();
        let get = |name: &str| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("TERRITORY_SERVER"), Some("db.local"));
        assert_eq!(get("TERRITORY_PASSWORD"), Some("s3cr3t"));
        assert_eq!(get("TERRITORY_PORT"), Some("8080"));
        assert_eq!(get("TERRITORY_IN_MEMORY"), Some("true"));
        assert_eq!(get("ENV"), Some("development"));
        assert_eq!(get("PRIVATE_KEY_FILE"), None);
    }
}
