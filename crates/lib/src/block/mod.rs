//! Configuration blocks and their structural validation.

pub mod scan;
pub mod types;
pub mod validate;

pub use types::{BlockId, BuildBlock, DatasourceBlock, DeclSite, PluginUse, SourceBlock, merge_dependencies};
pub use validate::{datasource_reference, source_reference, validate_sources_and_builds};
