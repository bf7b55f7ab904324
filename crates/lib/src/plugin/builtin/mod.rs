//! Datasources that ship with kiln.

mod env;
mod http;
mod null;

pub use env::EnvDatasource;
pub use http::HttpDatasource;
pub use null::NullDatasource;

use super::PluginRegistry;

/// Register `null`, `env` and `http`.
pub fn register_all(registry: &mut PluginRegistry) {
  registry.register("null", NullDatasource::default);
  registry.register("env", EnvDatasource::default);
  let client = reqwest::Client::new();
  registry.register("http", move || HttpDatasource::new(client.clone()));
}
