//! Shared infrastructure: application settings and retry policies.

mod config;
mod retry;

pub use config::{GeneralSettings, PersistenceSettings, RecoverySettings, Settings};
pub use retry::{retry_async, retry_with_backoff, Backoff, RetryConfig, RetryResult};
