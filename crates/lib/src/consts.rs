//! Crate-wide constants.

pub const APP_NAME: &str = "kiln";

/// File suffix picked up when a directory is passed as configuration.
pub const CONFIG_FILE_SUFFIX: &str = ".pkr.json";

/// Environment variable overriding the worker pool size.
pub const ENV_PARALLELISM: &str = "KILN_PARALLELISM";

/// Environment variable setting the per-datasource timeout (e.g. `30s`, `2m`).
pub const ENV_DATASOURCE_TIMEOUT: &str = "KILN_DATASOURCE_TIMEOUT";

/// Fallback worker count when available parallelism cannot be queried.
pub const DEFAULT_PARALLELISM: usize = 4;
