//! Implicit dependency discovery.
//!
//! Walks a raw configuration tree and collects every `${data...}` traversal
//! as a [`Reference`]. The walk only parses placeholders; it never resolves
//! them, so it can run long before any datasource has a value.

use crate::placeholder::{self, Placeholder, PlaceholderError, Segment};
use crate::reference::Reference;
use crate::value::{Value, ValueMap};

/// Datasource references found in `config`, in first-occurrence order, plus
/// any placeholder syntax errors encountered on the way.
pub fn references(config: &ValueMap) -> (Vec<Reference>, Vec<PlaceholderError>) {
  references_in([config])
}

/// Same as [`references`] for a list of configuration maps.
pub fn references_in<'a>(configs: impl IntoIterator<Item = &'a ValueMap>) -> (Vec<Reference>, Vec<PlaceholderError>) {
  let mut found = Vec::new();
  let mut errors = Vec::new();
  for config in configs {
    for value in config.values() {
      walk(value, &mut found, &mut errors);
    }
  }
  (found, errors)
}

fn walk(value: &Value, found: &mut Vec<Reference>, errors: &mut Vec<PlaceholderError>) {
  match value {
    Value::String(text) => match placeholder::parse(text) {
      Ok(segments) => {
        for segment in segments {
          if let Segment::Placeholder(Placeholder::Data { reference, .. }) = segment
            && !found.contains(&reference)
          {
            found.push(reference);
          }
        }
      }
      Err(e) => errors.push(e),
    },
    Value::List(items) => {
      for item in items {
        walk(item, found, errors);
      }
    }
    Value::Map(map) => {
      for item in map.values() {
        walk(item, found, errors);
      }
    }
    Value::Bool(_) | Value::Number(_) => {}
  }
}
