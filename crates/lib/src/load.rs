//! Configuration file loading.
//!
//! Configuration is read from `*.pkr.json` files. Each file is a JSON object
//! with optional `variables`, `data`, `source` and `build` members. Blocks are
//! written as lists so declaration order (and duplicate declarations) survive
//! decoding:
//!
//! ```json
//! {
//!   "variables": { "region": "us-east-1" },
//!   "data": [
//!     { "type": "null", "name": "base", "config": { "input": "ami-${var.region}" } },
//!     { "type": "null", "name": "tagged", "depends_on": ["data.null.base"],
//!       "config": { "input": "${data.null.base.output}" } }
//!   ],
//!   "source": [{ "type": "null", "name": "vm", "config": { "image": "${data.null.tagged.output}" } }],
//!   "build": [{ "name": "main", "sources": ["source.null.vm"] }]
//! }
//! ```
//!
//! Decoding only fails on I/O and JSON errors. Problems with individual blocks
//! (malformed references, bad placeholders, duplicate variables) are collected
//! in [`Declarations::errors`] so validation can report them together with
//! everything else.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::block::scan;
use crate::block::{BuildBlock, DatasourceBlock, DeclSite, PluginUse, SourceBlock, merge_dependencies};
use crate::consts::CONFIG_FILE_SUFFIX;
use crate::error::ConfigError;
use crate::placeholder::PlaceholderError;
use crate::reference::{RawReference, Reference};
use crate::value::{ValueError, ValueMap, map_from_json};

/// Errors that stop loading altogether.
#[derive(Debug, Error)]
pub enum LoadError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to scan {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to parse {file}: {source}")]
  Parse {
    file: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("{file}: {source}")]
  Value {
    file: String,
    #[source]
    source: ValueError,
  },

  #[error("no {suffix} files found in {}", .path.display())]
  NoConfigFiles { path: PathBuf, suffix: &'static str },
}

/// Everything declared across the loaded files, in declaration order.
#[derive(Debug, Default)]
pub struct Declarations {
  pub datasources: Vec<DatasourceBlock>,
  pub sources: Vec<SourceBlock>,
  pub builds: Vec<BuildBlock>,
  /// Input variables with their default values.
  pub variables: ValueMap,
  /// Per-block problems found while decoding.
  pub errors: Vec<ConfigError>,
  variable_files: HashMap<String, String>,
}

impl Declarations {
  /// Override variable values, e.g. from `--var` flags. Overrides may also
  /// introduce variables that have no default.
  pub fn apply_overrides(&mut self, overrides: &ValueMap) {
    for (name, value) in overrides {
      self.variables.insert(name.clone(), value.clone());
    }
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileBody {
  #[serde(default)]
  variables: serde_json::Map<String, serde_json::Value>,
  #[serde(default)]
  data: Vec<RawBlock>,
  #[serde(default)]
  source: Vec<RawBlock>,
  #[serde(default)]
  build: Vec<RawBuild>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBlock {
  #[serde(default, rename = "type")]
  type_name: String,
  #[serde(default)]
  name: String,
  #[serde(default)]
  depends_on: Vec<RawDependency>,
  #[serde(default)]
  config: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBuild {
  #[serde(default)]
  name: String,
  #[serde(default)]
  sources: Vec<RawDependency>,
  #[serde(default)]
  provisioners: Vec<RawPluginUse>,
  #[serde(default)]
  post_processors: Vec<RawPluginUse>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPluginUse {
  #[serde(default, rename = "type")]
  type_name: String,
  #[serde(default)]
  config: serde_json::Map<String, serde_json::Value>,
}

/// A reference as written: `"data.null.foo"` or `["data", "null", "foo"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
  Dotted(String),
  Triple(String, String, String),
}

impl RawDependency {
  fn to_raw(&self) -> Result<RawReference, crate::reference::ReferenceError> {
    match self {
      RawDependency::Dotted(text) => RawReference::parse_dotted(text),
      RawDependency::Triple(kind, type_name, name) => Ok(RawReference::new(kind, type_name, name)),
    }
  }
}

/// Load every configuration file under `paths`.
///
/// Directories are scanned recursively for `*.pkr.json` files in file name
/// order; plain files are loaded as given.
///
/// # Errors
///
/// Fails on unreadable files, invalid JSON, `null` values, or when no
/// configuration file is found at all.
pub fn load_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Declarations, LoadError> {
  let mut declarations = Declarations::default();
  for path in paths {
    let path = path.as_ref();
    let files = config_files(path)?;
    if files.is_empty() {
      return Err(LoadError::NoConfigFiles {
        path: path.to_path_buf(),
        suffix: CONFIG_FILE_SUFFIX,
      });
    }
    for file in files {
      load_file(&file, &mut declarations)?;
    }
  }
  info!(
    datasources = declarations.datasources.len(),
    sources = declarations.sources.len(),
    builds = declarations.builds.len(),
    "configuration loaded"
  );
  Ok(declarations)
}

fn config_files(path: &Path) -> Result<Vec<PathBuf>, LoadError> {
  if !path.is_dir() {
    return Ok(vec![path.to_path_buf()]);
  }
  let mut files = Vec::new();
  for entry in WalkDir::new(path).sort_by_file_name() {
    let entry = entry.map_err(|source| LoadError::Walk {
      path: path.to_path_buf(),
      source,
    })?;
    let is_config = entry
      .file_name()
      .to_str()
      .is_some_and(|name| name.ends_with(CONFIG_FILE_SUFFIX));
    if entry.file_type().is_file() && is_config {
      files.push(entry.into_path());
    }
  }
  Ok(files)
}

/// Read one file and append its declarations.
pub fn load_file(path: &Path, declarations: &mut Declarations) -> Result<(), LoadError> {
  let text = fs::read_to_string(path).map_err(|source| LoadError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  debug!(path = %path.display(), "reading configuration file");
  decode_into(&path.display().to_string(), &text, declarations)
}

/// Decode a single configuration document named `file`.
pub fn parse_str(file: &str, text: &str) -> Result<Declarations, LoadError> {
  let mut declarations = Declarations::default();
  decode_into(file, text, &mut declarations)?;
  Ok(declarations)
}

fn decode_into(file: &str, text: &str, out: &mut Declarations) -> Result<(), LoadError> {
  let body: FileBody = serde_json::from_str(text).map_err(|source| LoadError::Parse {
    file: file.to_string(),
    source,
  })?;
  let value_error = |source| LoadError::Value {
    file: file.to_string(),
    source,
  };

  for (name, default) in map_from_json(body.variables, "variables").map_err(value_error)? {
    match out.variable_files.get(&name) {
      Some(first) => out.errors.push(ConfigError::DuplicateVariable {
        name,
        first: first.clone(),
        second: file.to_string(),
      }),
      None => {
        out.variable_files.insert(name.clone(), file.to_string());
        out.variables.insert(name, default);
      }
    }
  }

  for (index, raw) in body.data.into_iter().enumerate() {
    let site = DeclSite::new(file, format!("data[{}]", index));
    let config = map_from_json(raw.config, &format!("{}.config", site.path)).map_err(value_error)?;
    let mut dependencies = explicit_dependencies(&raw.depends_on, &site, &mut out.errors);
    merge_dependencies(&mut dependencies, implicit_dependencies([&config], &site, &mut out.errors));
    out.datasources.push(DatasourceBlock {
      type_name: raw.type_name,
      name: raw.name,
      config,
      dependencies,
      site,
    });
  }

  for (index, raw) in body.source.into_iter().enumerate() {
    let site = DeclSite::new(file, format!("source[{}]", index));
    let config = map_from_json(raw.config, &format!("{}.config", site.path)).map_err(value_error)?;
    let mut dependencies = explicit_dependencies(&raw.depends_on, &site, &mut out.errors);
    merge_dependencies(&mut dependencies, implicit_dependencies([&config], &site, &mut out.errors));
    out.sources.push(SourceBlock {
      type_name: raw.type_name,
      name: raw.name,
      config,
      dependencies,
      site,
    });
  }

  for (index, raw) in body.build.into_iter().enumerate() {
    let site = DeclSite::new(file, format!("build[{}]", index));
    let sources = explicit_dependencies(&raw.sources, &site, &mut out.errors);
    let provisioners = plugin_uses(raw.provisioners, &site, "provisioners").map_err(value_error)?;
    let post_processors = plugin_uses(raw.post_processors, &site, "post_processors").map_err(value_error)?;
    let dependencies = implicit_dependencies(
      provisioners.iter().chain(&post_processors).map(|step| &step.config),
      &site,
      &mut out.errors,
    );
    out.builds.push(BuildBlock {
      name: raw.name,
      sources,
      provisioners,
      post_processors,
      dependencies,
      site,
    });
  }

  Ok(())
}

fn plugin_uses(raw: Vec<RawPluginUse>, site: &DeclSite, field: &str) -> Result<Vec<PluginUse>, ValueError> {
  raw
    .into_iter()
    .enumerate()
    .map(|(index, step)| {
      let site = site.child(&format!("{}[{}]", field, index));
      let config = map_from_json(step.config, &format!("{}.config", site.path))?;
      Ok(PluginUse {
        type_name: step.type_name,
        config,
        site,
      })
    })
    .collect()
}

fn explicit_dependencies(raw: &[RawDependency], site: &DeclSite, errors: &mut Vec<ConfigError>) -> Vec<Reference> {
  let mut resolved = Vec::new();
  for entry in raw {
    match entry.to_raw().and_then(|raw| Reference::resolve(&raw)) {
      Ok(reference) => merge_dependencies(&mut resolved, [reference]),
      Err(source) => errors.push(ConfigError::MalformedReference {
        site: site.clone(),
        source,
      }),
    }
  }
  resolved
}

fn implicit_dependencies<'a>(
  configs: impl IntoIterator<Item = &'a ValueMap>,
  site: &DeclSite,
  errors: &mut Vec<ConfigError>,
) -> Vec<Reference> {
  let (found, problems) = scan::references_in(configs);
  for problem in problems {
    errors.push(match problem {
      PlaceholderError::Reference(source) => ConfigError::MalformedReference {
        site: site.clone(),
        source,
      },
      source => ConfigError::InvalidExpression {
        site: site.clone(),
        source,
      },
    });
  }
  found
}
