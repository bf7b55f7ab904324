//! Memoized datasource results.
//!
//! A result is reused only when both the reference and the effective
//! (interpolated) configuration match, so a changed upstream value or variable
//! always forces a fresh plugin call.

use std::collections::HashMap;

use serde_json::json;
use sha2::{Digest, Sha256};

use crate::reference::Reference;
use crate::value::{ValueMap, map_to_json};

/// Content hash of a datasource invocation: type plus effective configuration.
pub fn config_hash(type_name: &str, config: &ValueMap) -> String {
  let document = json!({ "type": type_name, "config": map_to_json(config) });
  let mut hasher = Sha256::new();
  hasher.update(document.to_string().as_bytes());
  hex::encode(hasher.finalize())
}

/// Results keyed by reference and configuration hash.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
  entries: HashMap<(Reference, String), ValueMap>,
}

impl ResultCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, reference: &Reference, hash: &str) -> Option<&ValueMap> {
    self.entries.get(&(reference.clone(), hash.to_string()))
  }

  pub fn insert(&mut self, reference: Reference, hash: String, value: ValueMap) {
    self.entries.insert((reference, hash), value);
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }
}
