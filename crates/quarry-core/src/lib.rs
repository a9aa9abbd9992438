// Configuration types shared across all Quarry crates
pub mod config;
pub mod error;

pub use config::{
    AuthConfig, AuthMode, BigQueryConfig, CLOUD_PLATFORM_SCOPE, LoggingConfig, McpConfig,
    OAuthConfig, QuarryConfig, Transport,
};
pub use error::ConfigError;
