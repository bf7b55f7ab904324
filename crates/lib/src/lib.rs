//! kiln-lib: configuration evaluation core for kiln
//!
//! This crate turns machine-image build configuration into resolved values:
//! - `load`: decodes `*.pkr.json` files into datasource, source and build blocks
//! - `graph`: the datasource dependency graph, validated and acyclic
//! - `evaluate`: runs datasource plugins in dependency order on a bounded worker pool
//! - `assemble`: the resolved configuration handed to later build stages
//! - `eval`: the pipeline tying the stages together

pub mod assemble;
pub mod block;
pub mod consts;
pub mod error;
pub mod eval;
pub mod evaluate;
pub mod graph;
pub mod load;
pub mod placeholder;
pub mod plugin;
pub mod reference;
pub mod value;

pub use error::{AggregateError, ConfigError, Diagnostic};
pub use eval::{ConfigEvaluation, EvalError, EvalOptions, check_config, evaluate_config};
pub use reference::Reference;
pub use value::{Value, ValueMap};
