use anyhow::Result;
use serde_json::json;

use kiln_lib::plugin::PluginRegistry;

use crate::output::{OutputFormat, print_json};

pub fn cmd_plugins(registry: &PluginRegistry, format: OutputFormat) -> Result<()> {
  let types: Vec<&str> = registry.types().collect();
  if format.is_json() {
    return print_json(&json!({ "datasources": types }));
  }
  println!("Datasource types:");
  for type_name in types {
    println!("  {}", type_name);
  }
  Ok(())
}
