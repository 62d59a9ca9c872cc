use anyhow::{Context, Result};
use authguard::config::Config;
use authguard::key_generator::KeyGenerator;
use authguard::rate_limit_config::RateLimiterConfiguration;
use authguard::redis_store::RedisStore;
use authguard::server::Server;
use authguard::store::{BucketStore, MemoryStore};
use authguard::throttler::Throttler;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("authguard={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting authguard rate limiter");

    // Invalid bucket configuration must stop startup
    let limiter_config = RateLimiterConfiguration::from_file(&config.rate_limiter_config)
        .context("Invalid rate limiter configuration")?;

    tracing::info!(
        path = %config.rate_limiter_config.display(),
        enabled = limiter_config.enabled,
        log_only = limiter_config.settings.log_only,
        failure_policy = ?limiter_config.settings.failure_policy,
        routes = limiter_config.route_buckets.len(),
        "Loaded rate limiter configuration"
    );

    // A malformed URL is fatal; an unreachable server is not
    let store: Arc<dyn BucketStore> = if config.uses_redis() {
        Arc::new(RedisStore::new(&config.redis_url).context("Invalid REDIS_URL")?)
    } else {
        tracing::warn!("REDIS_URL not set, keeping buckets in process memory");
        Arc::new(MemoryStore::new())
    };

    let throttler = Throttler::new(
        store,
        limiter_config,
        KeyGenerator::new(config.key_namespace.clone()),
    );

    let warm_up = throttler.rate_limiter().clone();
    tokio::spawn(async move {
        match warm_up.ping().await {
            Ok(()) => tracing::info!(backend = warm_up.backend_name(), "Store reachable"),
            Err(e) => tracing::warn!(
                backend = warm_up.backend_name(),
                error = %e,
                "Store unreachable at startup, applying failure policy until it recovers"
            ),
        }
    });

    Server::new(throttler, config.bind_addr)
        .run()
        .await
        .context("Server error")?;

    Ok(())
}
