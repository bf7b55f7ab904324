use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kiln_lib::plugin::{Datasource, PluginContext, PluginError, PluginRegistry};
use kiln_lib::{Value, ValueMap};
use tempfile::TempDir;

/// Labels of recorder datasources in the order they finished.
pub type FinishLog = Arc<Mutex<Vec<String>>>;

/// Test datasource configured with `label`, optional `delay_ms` and `fail`.
/// Returns `{"output": <label>}` or, when `value` is given, `{"output": <value>}`.
pub struct Recorder {
  log: FinishLog,
  label: String,
  delay: Duration,
  fail: bool,
  value: Option<Value>,
}

impl Recorder {
  pub fn new(log: FinishLog) -> Self {
    Self {
      log,
      label: String::new(),
      delay: Duration::ZERO,
      fail: false,
      value: None,
    }
  }
}

#[async_trait]
impl Datasource for Recorder {
  async fn configure(&mut self, mut config: ValueMap) -> Result<(), PluginError> {
    self.label = match config.remove("label") {
      Some(Value::String(label)) => label,
      _ => return Err(PluginError::Config("'label' is required".to_string())),
    };
    if let Some(Value::Number(ms)) = config.remove("delay_ms") {
      self.delay = Duration::from_millis(ms.as_u64().unwrap_or_default());
    }
    self.fail = matches!(config.remove("fail"), Some(Value::Bool(true)));
    self.value = config.remove("value");
    Ok(())
  }

  async fn execute(&self, _ctx: &PluginContext) -> Result<ValueMap, PluginError> {
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    if self.fail {
      return Err(PluginError::Execute(format!("{} exploded", self.label)));
    }
    self.log.lock().unwrap().push(self.label.clone());
    let output = self.value.clone().unwrap_or_else(|| Value::from(self.label.as_str()));
    Ok(ValueMap::from([("output".to_string(), output)]))
  }
}

/// Built-in registry plus the `recorder` type.
pub fn registry() -> (PluginRegistry, FinishLog) {
  let log = FinishLog::default();
  let mut registry = PluginRegistry::with_builtins();
  let shared = log.clone();
  registry.register("recorder", move || Recorder::new(shared.clone()));
  (registry, log)
}

pub fn finished(log: &FinishLog) -> Vec<String> {
  log.lock().unwrap().clone()
}

/// A temporary configuration directory holding the given files.
pub fn config_dir(files: &[(&str, &str)]) -> TempDir {
  let dir = TempDir::new().unwrap();
  for (name, text) in files {
    write(dir.path(), name, text);
  }
  dir
}

pub fn write(dir: &Path, name: &str, text: &str) {
  std::fs::write(dir.join(name), text).unwrap();
}

pub fn position(order: &[String], label: &str) -> usize {
  order
    .iter()
    .position(|l| l == label)
    .unwrap_or_else(|| panic!("{} did not finish: {:?}", label, order))
}
