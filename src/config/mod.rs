mod loader_config;

pub use loader_config::{default_cache_dir, LoaderConfig, CACHE_ENV_VAR};
