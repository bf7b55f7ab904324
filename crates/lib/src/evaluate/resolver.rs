//! Placeholder resolution against published datasource values.

use crate::placeholder::{PlaceholderError, Resolver};
use crate::reference::Reference;
use crate::value::{Value, ValueMap};

use super::types::ValueStore;

/// Resolves `${data...}` from a [`ValueStore`] and `${var...}` from the
/// configuration's variables.
pub struct StoreResolver<'a> {
  store: &'a ValueStore,
  variables: &'a ValueMap,
}

impl<'a> StoreResolver<'a> {
  pub fn new(store: &'a ValueStore, variables: &'a ValueMap) -> Self {
    Self { store, variables }
  }
}

impl Resolver for StoreResolver<'_> {
  fn resolve_data(&self, reference: &Reference) -> Result<&ValueMap, PlaceholderError> {
    self
      .store
      .get(reference)
      .ok_or_else(|| PlaceholderError::UnresolvedData(reference.clone()))
  }

  fn resolve_var(&self, name: &str) -> Result<&Value, PlaceholderError> {
    self
      .variables
      .get(name)
      .ok_or_else(|| PlaceholderError::UnknownVariable(name.to_string()))
  }
}
