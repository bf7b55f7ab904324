//! The `null` datasource: returns its `input` unchanged as `output`.
//!
//! Mostly useful for wiring values between blocks and for tests.

use async_trait::async_trait;

use crate::plugin::{Datasource, PluginContext, PluginError};
use crate::value::{Value, ValueMap};

#[derive(Debug, Default)]
pub struct NullDatasource {
  input: Option<Value>,
}

#[async_trait]
impl Datasource for NullDatasource {
  async fn configure(&mut self, mut config: ValueMap) -> Result<(), PluginError> {
    let input = config
      .remove("input")
      .ok_or_else(|| PluginError::Config("'input' is required".to_string()))?;
    if let Some(key) = config.keys().next() {
      return Err(PluginError::Config(format!("unknown field '{}'", key)));
    }
    self.input = Some(input);
    Ok(())
  }

  async fn execute(&self, _ctx: &PluginContext) -> Result<ValueMap, PluginError> {
    let input = self
      .input
      .clone()
      .ok_or_else(|| PluginError::Execute("datasource was not configured".to_string()))?;
    Ok(ValueMap::from([("output".to_string(), input)]))
  }
}
