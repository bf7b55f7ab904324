mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kiln_lib::evaluate::{EvaluateConfig, parse_parallelism, parse_timeout};
use kiln_lib::plugin::PluginRegistry;
use kiln_lib::{Value, ValueMap};

use cmd::{cmd_eval, cmd_plan, cmd_plugins, cmd_validate};
use output::{OutputFormat, print_error};

/// kiln - evaluate machine-image build configuration
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
  /// Configuration files or directories (directories are scanned for *.pkr.json)
  #[arg(default_value = ".")]
  paths: Vec<PathBuf>,

  /// Override a variable (value parsed as JSON, falling back to a plain string)
  #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_variable)]
  vars: Vec<(String, Value)>,
}

impl ConfigArgs {
  fn variables(&self) -> ValueMap {
    self.vars.iter().cloned().collect()
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Check the configuration without evaluating any datasource
  Validate {
    #[command(flatten)]
    config: ConfigArgs,
  },

  /// Show the order datasources would be evaluated in
  Plan {
    #[command(flatten)]
    config: ConfigArgs,
  },

  /// Evaluate all datasources and resolve the configuration
  Eval {
    #[command(flatten)]
    config: ConfigArgs,

    /// Maximum number of datasources evaluated at once
    #[arg(short = 'j', long, value_parser = parse_parallelism)]
    parallelism: Option<usize>,

    /// Per-datasource timeout (e.g. 30s, 2m)
    #[arg(long, value_parser = parse_timeout)]
    timeout: Option<Duration>,

    /// Print the resolved configuration
    #[arg(long)]
    show_values: bool,
  },

  /// List registered datasource types
  Plugins,
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  if let Err(e) = run(cli) {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}

fn init_logging(verbose: bool) {
  let default_level = if verbose { "kiln_lib=debug,kiln=debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<()> {
  let registry = PluginRegistry::with_builtins();
  let format = cli.output;

  match cli.command {
    Commands::Validate { config } => cmd_validate(&config.paths, &registry, &config.variables(), format),
    Commands::Plan { config } => cmd_plan(&config.paths, &registry, &config.variables(), format),
    Commands::Eval {
      config,
      parallelism,
      timeout,
      show_values,
    } => {
      let mut settings = EvaluateConfig::from_env().context("Invalid evaluation settings")?;
      if let Some(parallelism) = parallelism {
        settings.parallelism = parallelism;
      }
      if timeout.is_some() {
        settings.timeout = timeout;
      }
      let args = cmd::EvalArgs {
        variables: config.variables(),
        paths: config.paths,
        settings,
        show_values,
      };
      cmd_eval(args, &registry, format)
    }
    Commands::Plugins => cmd_plugins(&registry, format),
  }
}

fn parse_variable(raw: &str) -> Result<(String, Value), String> {
  let (name, text) = raw
    .split_once('=')
    .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
  if name.is_empty() {
    return Err(format!("variable name is empty in '{}'", raw));
  }
  let value = serde_json::from_str::<serde_json::Value>(text)
    .ok()
    .and_then(|json| Value::from_json(json, name).ok())
    .unwrap_or_else(|| Value::from(text));
  Ok((name.to_string(), value))
}
