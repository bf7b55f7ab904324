//! Typed configuration blocks.
//!
//! Blocks are produced once per configuration load by [`crate::load`]. They
//! carry their raw (uninterpolated) configuration plus the site they were
//! declared at, so every diagnostic can point back at the input.

use std::fmt;

use serde::Serialize;

use crate::reference::Reference;
use crate::value::ValueMap;

/// Where a block was declared, e.g. `images.pkr.json:data[2]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeclSite {
  /// The file the block was read from.
  pub file: String,
  /// Location inside the file, e.g. `data[2]` or `build[0].provisioners[1]`.
  pub path: String,
}

impl DeclSite {
  pub fn new(file: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      file: file.into(),
      path: path.into(),
    }
  }

  /// A site nested below this one.
  pub fn child(&self, path: &str) -> Self {
    Self {
      file: self.file.clone(),
      path: format!("{}.{}", self.path, path),
    }
  }
}

impl fmt::Display for DeclSite {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.file, self.path)
  }
}

/// Identity of a block in diagnostics.
///
/// Datasources and sources are identified by their reference; builds only
/// carry a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockId {
  Block(Reference),
  Build(String),
}

impl BlockId {
  pub fn reference(&self) -> Option<&Reference> {
    match self {
      BlockId::Block(reference) => Some(reference),
      BlockId::Build(_) => None,
    }
  }
}

impl fmt::Display for BlockId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BlockId::Block(reference) => write!(f, "{}", reference),
      BlockId::Build(name) => write!(f, "build \"{}\"", name),
    }
  }
}

/// A `data` block: an external lookup evaluated by a datasource plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasourceBlock {
  /// Plugin type, e.g. `amazon-ami`. Empty when the declaration had no type.
  pub type_name: String,
  /// Block name. Empty when the declaration had no name.
  pub name: String,
  /// Raw configuration; strings may contain placeholders.
  pub config: ValueMap,
  /// Explicit `depends_on` entries followed by references discovered in
  /// `config`, without duplicates.
  pub dependencies: Vec<Reference>,
  pub site: DeclSite,
}

/// A `source` block: an image source handed to a builder.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBlock {
  pub type_name: String,
  pub name: String,
  pub config: ValueMap,
  /// Datasources this source reads from.
  pub dependencies: Vec<Reference>,
  pub site: DeclSite,
}

/// A provisioner or post-processor step inside a build.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginUse {
  pub type_name: String,
  pub config: ValueMap,
  pub site: DeclSite,
}

/// A `build` block combining sources with provisioning steps.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildBlock {
  pub name: String,
  pub sources: Vec<Reference>,
  pub provisioners: Vec<PluginUse>,
  pub post_processors: Vec<PluginUse>,
  /// Datasources referenced from provisioner or post-processor configuration.
  pub dependencies: Vec<Reference>,
  pub site: DeclSite,
}

/// Append `extra` to `deps`, skipping references already present.
pub fn merge_dependencies(deps: &mut Vec<Reference>, extra: impl IntoIterator<Item = Reference>) {
  for reference in extra {
    if !deps.contains(&reference) {
      deps.push(reference);
    }
  }
}
