//! Structural checks on decoded blocks.
//!
//! Datasource checks feed the graph builder; source and build checks run
//! alongside it so a single pass reports every problem in the configuration.

use std::collections::{HashMap, HashSet};

use crate::block::types::{BlockId, BuildBlock, DatasourceBlock, DeclSite, SourceBlock};
use crate::error::ConfigError;
use crate::reference::{Kind, RawReference, Reference};

/// Check that a datasource block carries a type and a name and return its
/// canonical reference.
///
/// # Errors
///
/// [`ConfigError::UntypedBlock`] when the type is empty (this takes precedence
/// over a missing name), [`ConfigError::UnnamedBlock`] when only the name is
/// empty.
pub fn datasource_reference(block: &DatasourceBlock) -> Result<Reference, ConfigError> {
  labels(Kind::Data, &block.type_name, &block.name, &block.site)
}

/// Same as [`datasource_reference`] for a source block.
pub fn source_reference(block: &SourceBlock) -> Result<Reference, ConfigError> {
  labels(Kind::Source, &block.type_name, &block.name, &block.site)
}

fn labels(kind: Kind, type_name: &str, name: &str, site: &DeclSite) -> Result<Reference, ConfigError> {
  if type_name.is_empty() {
    return Err(ConfigError::UntypedBlock { site: site.clone() });
  }
  if name.is_empty() {
    return Err(ConfigError::UnnamedBlock { site: site.clone() });
  }
  Reference::resolve(&RawReference::new(kind.as_str(), type_name, name)).map_err(|source| {
    ConfigError::MalformedReference {
      site: site.clone(),
      source,
    }
  })
}

/// Validate source and build blocks against the declared datasources.
///
/// Reports missing labels, duplicates, builds naming undeclared sources and
/// datasource references that resolve to nothing.
pub fn validate_sources_and_builds(
  sources: &[SourceBlock],
  builds: &[BuildBlock],
  datasources: &HashSet<Reference>,
) -> Vec<ConfigError> {
  let mut errors = Vec::new();

  let mut declared_sources: HashMap<Reference, &DeclSite> = HashMap::new();
  for source in sources {
    let reference = match source_reference(source) {
      Ok(reference) => reference,
      Err(e) => {
        errors.push(e);
        continue;
      }
    };
    if let Some(first) = declared_sources.get(&reference) {
      errors.push(ConfigError::DuplicateBlock {
        id: BlockId::Block(reference),
        first: (*first).clone(),
        second: source.site.clone(),
      });
      continue;
    }
    check_datasources(&BlockId::Block(reference.clone()), &source.dependencies, datasources, &mut errors);
    declared_sources.insert(reference, &source.site);
  }

  let mut declared_builds: HashMap<&str, &DeclSite> = HashMap::new();
  for build in builds {
    if build.name.is_empty() {
      errors.push(ConfigError::UnnamedBlock {
        site: build.site.clone(),
      });
      continue;
    }
    if let Some(first) = declared_builds.get(build.name.as_str()) {
      errors.push(ConfigError::DuplicateBlock {
        id: BlockId::Build(build.name.clone()),
        first: (*first).clone(),
        second: build.site.clone(),
      });
      continue;
    }
    declared_builds.insert(&build.name, &build.site);

    let id = BlockId::Build(build.name.clone());
    for source in &build.sources {
      if !declared_sources.contains_key(source) {
        errors.push(ConfigError::UnknownReference {
          referrer: id.clone(),
          missing: source.clone(),
        });
      }
    }
    for step in build.provisioners.iter().chain(&build.post_processors) {
      if step.type_name.is_empty() {
        errors.push(ConfigError::UntypedBlock {
          site: step.site.clone(),
        });
      }
    }
    check_datasources(&id, &build.dependencies, datasources, &mut errors);
  }

  errors
}

fn check_datasources(
  referrer: &BlockId,
  dependencies: &[Reference],
  datasources: &HashSet<Reference>,
  errors: &mut Vec<ConfigError>,
) {
  for dependency in dependencies {
    if !datasources.contains(dependency) {
      errors.push(ConfigError::UnknownReference {
        referrer: referrer.clone(),
        missing: dependency.clone(),
      });
    }
  }
}
