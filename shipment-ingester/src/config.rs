use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3305")]
    pub port: u16,

    #[envconfig(default = "http://localhost:8000/api/v1/shipments")]
    pub source_url: String,

    #[envconfig(default = "10000")]
    pub fetch_timeout: EnvMsDuration,

    #[envconfig(default = "30")]
    pub fetch_interval_secs: u64,

    // Whether duplicate shipments within a single snapshot are collapsed to
    // one before insertion. Off by default: only the seen-set filters.
    #[envconfig(default = "false")]
    pub collapse_intra_snapshot: bool,

    #[envconfig(default = "5")]
    pub startup_attempts: u32,

    #[envconfig(default = "3000")]
    pub startup_retry_delay: EnvMsDuration,

    #[envconfig(nested = true)]
    pub postgres: PostgresConfig,

    #[envconfig(nested = true)]
    pub redis: RedisConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Envconfig, Clone)]
pub struct PostgresConfig {
    #[envconfig(from = "DATABASE_HOSTNAME", default = "localhost")]
    pub host: String,

    #[envconfig(from = "DATABASE_PORT", default = "5432")]
    pub port: u16,

    #[envconfig(from = "DATABASE_USERNAME", default = "cosmocargo")]
    pub user: String,

    #[envconfig(from = "DATABASE_PASSWORD", default = "cosmocargo")]
    pub password: String,

    #[envconfig(from = "DATABASE_NAME", default = "cosmocargo")]
    pub dbname: String,

    #[envconfig(from = "DATABASE_MAX_CONNECTIONS", default = "10")]
    pub max_connections: u32,
}

impl PostgresConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.dbname
        )
    }
}

#[derive(Envconfig, Clone)]
pub struct RedisConfig {
    #[envconfig(from = "REDIS_HOST", default = "localhost")]
    pub host: String,

    #[envconfig(from = "REDIS_PORT", default = "6379")]
    pub port: u16,

    #[envconfig(from = "REDIS_SEEN_SET_KEY", default = "shipments:seen")]
    pub seen_set_key: String,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
