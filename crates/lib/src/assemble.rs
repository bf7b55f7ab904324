//! The resolved configuration handed to later build stages.
//!
//! Assembled once after evaluation and never mutated. Source and build
//! configuration stays raw until asked for; interpolating it reads the
//! published datasource values and the input variables.

use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

use crate::block::{BuildBlock, PluginUse, SourceBlock, source_reference};
use crate::evaluate::{StoreResolver, ValueStore};
use crate::placeholder::{PlaceholderError, substitute_map};
use crate::reference::Reference;
use crate::value::{ValueMap, map_to_json};

#[derive(Debug, Error)]
pub enum AssembleError {
  #[error("source {0} is not declared")]
  UnknownSource(Reference),

  #[error("build \"{0}\" is not declared")]
  UnknownBuild(String),

  #[error("{context}: {source}")]
  Interpolate {
    context: String,
    #[source]
    source: PlaceholderError,
  },
}

/// A provisioner or post-processor with interpolated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
  pub type_name: String,
  pub config: ValueMap,
}

/// A build with every source and step interpolated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBuild {
  pub name: String,
  pub sources: Vec<(Reference, ValueMap)>,
  pub provisioners: Vec<ResolvedStep>,
  pub post_processors: Vec<ResolvedStep>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
  datasources: ValueStore,
  sources: IndexMap<Reference, SourceBlock>,
  builds: Vec<BuildBlock>,
  variables: ValueMap,
}

impl ResolvedConfig {
  pub fn assemble(
    sources: Vec<SourceBlock>,
    builds: Vec<BuildBlock>,
    variables: ValueMap,
    datasources: ValueStore,
  ) -> Self {
    let mut by_reference = IndexMap::new();
    for source in sources {
      match source_reference(&source) {
        Ok(reference) => {
          by_reference.entry(reference).or_insert(source);
        }
        Err(e) => warn!(error = %e, "dropping invalid source block"),
      }
    }
    Self {
      datasources,
      sources: by_reference,
      builds,
      variables,
    }
  }

  /// The published value of a datasource.
  pub fn datasource(&self, reference: &Reference) -> Option<&ValueMap> {
    self.datasources.get(reference)
  }

  pub fn datasources(&self) -> &ValueStore {
    &self.datasources
  }

  pub fn variables(&self) -> &ValueMap {
    &self.variables
  }

  pub fn sources(&self) -> impl Iterator<Item = (&Reference, &SourceBlock)> {
    self.sources.iter()
  }

  pub fn builds(&self) -> &[BuildBlock] {
    &self.builds
  }

  fn resolver(&self) -> StoreResolver<'_> {
    StoreResolver::new(&self.datasources, &self.variables)
  }

  /// Interpolated configuration of a source.
  ///
  /// # Errors
  ///
  /// Fails when the source is unknown or references a datasource that has
  /// no value (because it failed or was skipped).
  pub fn source_config(&self, reference: &Reference) -> Result<ValueMap, AssembleError> {
    let source = self
      .sources
      .get(reference)
      .ok_or_else(|| AssembleError::UnknownSource(reference.clone()))?;
    substitute_map(&source.config, &self.resolver()).map_err(|source| AssembleError::Interpolate {
      context: reference.to_string(),
      source,
    })
  }

  /// A build with its sources and steps interpolated.
  pub fn build_config(&self, name: &str) -> Result<ResolvedBuild, AssembleError> {
    let build = self
      .builds
      .iter()
      .find(|b| b.name == name)
      .ok_or_else(|| AssembleError::UnknownBuild(name.to_string()))?;

    let sources = build
      .sources
      .iter()
      .map(|reference| Ok((reference.clone(), self.source_config(reference)?)))
      .collect::<Result<Vec<_>, AssembleError>>()?;

    let resolve_steps = |steps: &[PluginUse], kind: &str| {
      steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
          let config = substitute_map(&step.config, &self.resolver()).map_err(|source| AssembleError::Interpolate {
            context: format!("build \"{}\" {}[{}]", name, kind, i),
            source,
          })?;
          Ok(ResolvedStep {
            type_name: step.type_name.clone(),
            config,
          })
        })
        .collect::<Result<Vec<_>, AssembleError>>()
    };

    Ok(ResolvedBuild {
      name: build.name.clone(),
      sources,
      provisioners: resolve_steps(&build.provisioners, "provisioners")?,
      post_processors: resolve_steps(&build.post_processors, "post_processors")?,
    })
  }

  /// JSON view: variables, datasource values, and every source and build
  /// interpolated where possible. Entries that cannot be interpolated carry
  /// an `error` string instead.
  pub fn to_json(&self) -> serde_json::Value {
    let sources: serde_json::Map<_, _> = self
      .sources
      .keys()
      .map(|reference| {
        let value = match self.source_config(reference) {
          Ok(config) => map_to_json(&config),
          Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        (reference.to_string(), value)
      })
      .collect();

    let builds: Vec<serde_json::Value> = self
      .builds
      .iter()
      .map(|build| match self.build_config(&build.name) {
        Ok(resolved) => serde_json::json!({
          "name": resolved.name,
          "sources": resolved.sources.iter().map(|(r, _)| r.to_string()).collect::<Vec<_>>(),
          "provisioners": steps_json(&resolved.provisioners),
          "post_processors": steps_json(&resolved.post_processors),
        }),
        Err(e) => serde_json::json!({ "name": build.name, "error": e.to_string() }),
      })
      .collect();

    serde_json::json!({
      "variables": map_to_json(&self.variables),
      "datasources": self.datasources.to_json(),
      "sources": sources,
      "builds": builds,
    })
  }
}

fn steps_json(steps: &[ResolvedStep]) -> serde_json::Value {
  serde_json::Value::Array(
    steps
      .iter()
      .map(|step| serde_json::json!({ "type": step.type_name, "config": map_to_json(&step.config) }))
      .collect(),
  )
}
