pub mod env_resolver;
pub mod error;
pub mod loader;
pub mod schema;

pub use env_resolver::{EnvResolver, EnvResolverError};
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, FileFormat, DEFAULT_CONFIG_FILE};
pub use schema::{BackendConfig, RunnerConfig, DEFAULT_MAX_SUB_ACTION_DEPTH};
