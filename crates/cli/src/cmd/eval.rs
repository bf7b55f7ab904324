//! Implementation of the `kiln eval` command.
//!
//! Evaluates every datasource on a bounded worker pool and prints the outcome
//! per datasource. With `--show-values` (or JSON output) the resolved
//! configuration is printed as well. Ctrl-C cancels the evaluation; nodes not
//! yet finished are reported as cancelled.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use kiln_lib::ValueMap;
use kiln_lib::evaluate::EvaluateConfig;
use kiln_lib::eval::evaluate_checked;
use kiln_lib::plugin::PluginRegistry;

use super::checked_or_report;
use crate::output::{
  OutputFormat, format_duration, print_diagnostics, print_json, print_state, print_success, print_warning,
};

pub struct EvalArgs {
  pub paths: Vec<PathBuf>,
  pub variables: ValueMap,
  pub settings: EvaluateConfig,
  pub show_values: bool,
}

pub fn cmd_eval(args: EvalArgs, registry: &PluginRegistry, format: OutputFormat) -> Result<()> {
  let checked = checked_or_report(&args.paths, registry, &args.variables, format)?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let outcome = rt.block_on(async {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, cancelling evaluation");
        on_interrupt.cancel();
      }
    });
    evaluate_checked(checked, registry, &args.settings, cancel).await
  });
  let elapsed = started.elapsed();

  let evaluation = &outcome.evaluation;
  let diagnostics = outcome.error().map(|e| e.diagnostics()).unwrap_or_default();

  if format.is_json() {
    let states: serde_json::Map<_, _> = evaluation
      .order
      .iter()
      .filter_map(|reference| {
        evaluation
          .state(reference)
          .map(|state| (reference.to_string(), json!(state.as_str())))
      })
      .collect();
    print_json(&json!({
      "success": outcome.is_success(),
      "states": states,
      "config": outcome.config.to_json(),
      "diagnostics": diagnostics,
    }))?;
  } else {
    println!("Datasources:");
    for reference in &evaluation.order {
      if let Some(state) = evaluation.state(reference) {
        print_state(&reference.to_string(), state);
      }
    }
    println!();
    print_diagnostics(&diagnostics);

    if args.show_values {
      let rendered =
        serde_json::to_string_pretty(&outcome.config.to_json()).context("Failed to serialize resolved config")?;
      println!("{}", rendered);
    }

    if outcome.is_success() {
      print_success(&format!(
        "Resolved {} datasource(s) in {}",
        evaluation.resolved(),
        format_duration(elapsed)
      ));
    } else if evaluation.cancelled() > 0 {
      print_warning(&format!(
        "Evaluation cancelled: {} resolved, {} cancelled",
        evaluation.resolved(),
        evaluation.cancelled()
      ));
    }
  }

  if !outcome.is_success() {
    bail!(
      "evaluation failed: {} failed, {} skipped, {} cancelled",
      evaluation.failed(),
      evaluation.skipped(),
      evaluation.cancelled()
    );
  }
  Ok(())
}
