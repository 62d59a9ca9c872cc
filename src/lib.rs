pub mod batch;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod key_generator;
pub mod middleware;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod redis_store;
pub mod response;
pub mod server;
pub mod store;
pub mod throttler;
pub mod token_bucket;
pub mod validation;

pub use config::Config;
pub use error::{ThrottlerError, ThrottlerResult};
pub use key_generator::Identifiers;
pub use rate_limit_config::{BucketConfiguration, BucketSet, BucketType, RateLimiterConfiguration};
pub use rate_limiter::{RateLimitOutcome, RateLimiter};
pub use server::create_app;
pub use store::{BucketStore, MemoryStore};
pub use throttler::Throttler;
