//! The `env` datasource: reads an environment variable.
//!
//! Config: `name` (required), `default` (optional, used when unset).
//! Result: `value`.

use std::env;

use async_trait::async_trait;
use tracing::debug;

use crate::plugin::{Datasource, PluginContext, PluginError};
use crate::value::{Value, ValueMap};

#[derive(Debug, Default)]
pub struct EnvDatasource {
  name: String,
  default: Option<Value>,
}

#[async_trait]
impl Datasource for EnvDatasource {
  async fn configure(&mut self, mut config: ValueMap) -> Result<(), PluginError> {
    self.name = match config.remove("name") {
      Some(Value::String(name)) if !name.is_empty() => name,
      Some(other) => {
        return Err(PluginError::Config(format!(
          "'name' must be a non-empty string, got {}",
          other.kind_name()
        )));
      }
      None => return Err(PluginError::Config("'name' is required".to_string())),
    };
    self.default = config.remove("default");
    if let Some(key) = config.keys().next() {
      return Err(PluginError::Config(format!("unknown field '{}'", key)));
    }
    Ok(())
  }

  async fn execute(&self, _ctx: &PluginContext) -> Result<ValueMap, PluginError> {
    let value = match env::var(&self.name) {
      Ok(value) => Value::String(value),
      Err(env::VarError::NotPresent) => match &self.default {
        Some(default) => {
          debug!(variable = %self.name, "environment variable unset, using default");
          default.clone()
        }
        None => {
          return Err(PluginError::Execute(format!(
            "environment variable {} is not set",
            self.name
          )));
        }
      },
      Err(env::VarError::NotUnicode(_)) => {
        return Err(PluginError::Execute(format!(
          "environment variable {} is not valid unicode",
          self.name
        )));
      }
    };
    Ok(ValueMap::from([("value".to_string(), value)]))
  }
}
