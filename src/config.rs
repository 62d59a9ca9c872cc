use crate::config_validator::ConfigValidator;
use crate::error::ThrottlerResult;
use crate::key_generator::DEFAULT_NAMESPACE;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Process configuration, from command line flags or the environment
#[derive(Debug, Clone, Parser)]
#[command(name = "authguard", version, about)]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL. Buckets are kept in process memory when empty.
    #[arg(long, env = "REDIS_URL", default_value = "")]
    pub redis_url: String,

    /// Path to the JSON bucket configuration
    #[arg(long, env = "RATE_LIMITER_CONFIG", default_value = "rate-limiter.json")]
    pub rate_limiter_config: PathBuf,

    /// Prefix of every storage key
    #[arg(long, env = "KEY_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub key_namespace: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from arguments and environment variables
    pub fn from_env() -> ThrottlerResult<Self> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ThrottlerResult<()> {
        if self.uses_redis() {
            ConfigValidator::validate_redis_url(&self.redis_url)?;
        }
        ConfigValidator::validate_key_segment("key namespace", &self.key_namespace)
    }

    pub fn uses_redis(&self) -> bool {
        !self.redis_url.trim().is_empty()
    }
}
