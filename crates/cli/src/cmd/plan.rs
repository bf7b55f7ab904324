//! Implementation of the `kiln plan` command.
//!
//! Prints the order in which datasources would be dispatched with a single
//! worker, with each datasource's direct dependencies.

use std::path::PathBuf;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};
use serde_json::json;

use kiln_lib::ValueMap;
use kiln_lib::plugin::PluginRegistry;

use super::checked_or_report;
use crate::output::{OutputFormat, print_info, print_json, symbols};

pub fn cmd_plan(paths: &[PathBuf], registry: &PluginRegistry, variables: &ValueMap, format: OutputFormat) -> Result<()> {
  let checked = checked_or_report(paths, registry, variables, format)?;
  let graph = &checked.graph;

  let steps: Vec<(String, Vec<String>)> = checked
    .plan()
    .iter()
    .filter_map(|reference| graph.index_of(reference).map(|idx| (reference, idx)))
    .map(|(reference, idx)| {
      let deps = graph
        .dependencies(idx)
        .into_iter()
        .map(|dep| graph.reference(dep).to_string())
        .collect();
      (reference.to_string(), deps)
    })
    .collect();

  if format.is_json() {
    let order: Vec<_> = steps
      .iter()
      .map(|(reference, deps)| json!({ "datasource": reference, "depends_on": deps }))
      .collect();
    return print_json(&json!({ "order": order }));
  }

  if steps.is_empty() {
    print_info("No datasources to evaluate.");
    return Ok(());
  }

  println!("Evaluation order:");
  for (position, (reference, deps)) in steps.iter().enumerate() {
    if deps.is_empty() {
      println!("  {:>3}. {}", position + 1, reference);
    } else {
      println!(
        "  {:>3}. {} {}",
        position + 1,
        reference,
        format!("{} {}", symbols::ARROW, deps.join(", ")).if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    }
  }
  Ok(())
}
