mod eval;
mod plan;
mod plugins;
mod validate;

pub use eval::{EvalArgs, cmd_eval};
pub use plan::cmd_plan;
pub use plugins::cmd_plugins;
pub use validate::cmd_validate;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use kiln_lib::eval::{CheckedConfig, EvalError, check_config};
use kiln_lib::plugin::PluginRegistry;
use kiln_lib::{AggregateError, ValueMap};

use crate::output::{OutputFormat, print_diagnostics, print_json};

/// Load and validate, reporting every problem before failing.
fn checked_or_report(
  paths: &[PathBuf],
  registry: &PluginRegistry,
  variables: &ValueMap,
  format: OutputFormat,
) -> Result<CheckedConfig> {
  match check_config(paths, registry, variables) {
    Ok(checked) => Ok(checked),
    Err(EvalError::Invalid(aggregate)) => report_invalid(&aggregate, format),
    Err(e) => Err(e).context("Failed to load configuration"),
  }
}

fn report_invalid<T>(aggregate: &AggregateError, format: OutputFormat) -> Result<T> {
  let diagnostics = aggregate.diagnostics();
  if format.is_json() {
    print_json(&serde_json::json!({ "valid": false, "diagnostics": diagnostics }))?;
  } else {
    print_diagnostics(&diagnostics);
  }
  bail!("configuration is invalid: {} error(s)", aggregate.errors.len())
}
