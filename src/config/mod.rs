//! Runtime configuration for the crawl engine: worker pool sizing, fetch
//! mode, rate limits, circuit breaker thresholds, and webhook delivery.

pub mod builder;
pub mod types;

pub use builder::EngineConfigBuilder;
pub use types::{EngineConfig, FetchMode};
