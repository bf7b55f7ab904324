//! Configuration errors and diagnostics.
//!
//! Validation and evaluation never stop at the first problem. Every error is
//! collected into an [`AggregateError`], which keeps root causes apart from
//! blocks that were merely skipped because of them.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::block::{BlockId, DeclSite};
use crate::evaluate::NodeError;
use crate::placeholder::PlaceholderError;
use crate::reference::{Reference, ReferenceError};

/// A single problem found in a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("{site}: {source}")]
  MalformedReference {
    site: DeclSite,
    #[source]
    source: ReferenceError,
  },

  #[error("{site}: invalid expression: {source}")]
  InvalidExpression {
    site: DeclSite,
    #[source]
    source: PlaceholderError,
  },

  #[error("{site}: block is missing a type")]
  UntypedBlock { site: DeclSite },

  #[error("{site}: block is missing a name")]
  UnnamedBlock { site: DeclSite },

  #[error("duplicate {id}: first declared at {first}, declared again at {second}")]
  DuplicateBlock {
    id: BlockId,
    first: DeclSite,
    second: DeclSite,
  },

  #[error("duplicate variable '{name}': first declared in {first}, declared again in {second}")]
  DuplicateVariable { name: String, first: String, second: String },

  #[error("{referrer} depends on {missing}, which is not declared")]
  UnknownReference { referrer: BlockId, missing: Reference },

  #[error("{reference}: no datasource plugin registered for type '{type_name}'")]
  UnregisteredType { reference: Reference, type_name: String },

  #[error("dependency cycle: {}", format_cycle(.members))]
  Cycle { members: Vec<Reference> },

  #[error("{reference}: {source}")]
  Evaluation {
    reference: Reference,
    #[source]
    source: NodeError,
  },
}

fn format_cycle(members: &[Reference]) -> String {
  members.iter().map(Reference::to_string).collect::<Vec<_>>().join(" -> ")
}

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Error,
  Warning,
}

/// Machine-readable category of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
  MalformedReference,
  InvalidExpression,
  UntypedBlock,
  UnnamedBlock,
  DuplicateBlock,
  DuplicateVariable,
  UnknownReference,
  UnregisteredType,
  Cycle,
  Evaluation,
  DependencyFailed,
  Cancelled,
}

/// A user-facing report of one problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
  pub severity: Severity,
  pub kind: DiagnosticKind,
  /// The blocks involved, most relevant first.
  pub references: Vec<Reference>,
  pub message: String,
}

impl ConfigError {
  pub fn kind(&self) -> DiagnosticKind {
    match self {
      ConfigError::MalformedReference { .. } => DiagnosticKind::MalformedReference,
      ConfigError::InvalidExpression { .. } => DiagnosticKind::InvalidExpression,
      ConfigError::UntypedBlock { .. } => DiagnosticKind::UntypedBlock,
      ConfigError::UnnamedBlock { .. } => DiagnosticKind::UnnamedBlock,
      ConfigError::DuplicateBlock { .. } => DiagnosticKind::DuplicateBlock,
      ConfigError::DuplicateVariable { .. } => DiagnosticKind::DuplicateVariable,
      ConfigError::UnknownReference { .. } => DiagnosticKind::UnknownReference,
      ConfigError::UnregisteredType { .. } => DiagnosticKind::UnregisteredType,
      ConfigError::Cycle { .. } => DiagnosticKind::Cycle,
      ConfigError::Evaluation { .. } => DiagnosticKind::Evaluation,
    }
  }

  /// The blocks this error is about.
  pub fn references(&self) -> Vec<Reference> {
    match self {
      ConfigError::DuplicateBlock { id, .. } => id.reference().cloned().into_iter().collect(),
      ConfigError::UnknownReference { referrer, missing } => {
        referrer.reference().cloned().into_iter().chain([missing.clone()]).collect()
      }
      ConfigError::UnregisteredType { reference, .. } | ConfigError::Evaluation { reference, .. } => {
        vec![reference.clone()]
      }
      ConfigError::Cycle { members } => members.clone(),
      ConfigError::MalformedReference { .. }
      | ConfigError::InvalidExpression { .. }
      | ConfigError::UntypedBlock { .. }
      | ConfigError::UnnamedBlock { .. }
      | ConfigError::DuplicateVariable { .. } => vec![],
    }
  }

  pub fn to_diagnostic(&self) -> Diagnostic {
    Diagnostic {
      severity: Severity::Error,
      kind: self.kind(),
      references: self.references(),
      message: self.to_string(),
    }
  }
}

/// Why a datasource was never evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  /// A direct dependency failed or was itself skipped.
  DependencyFailed(Reference),
  /// Evaluation was cancelled before the datasource finished.
  Cancelled,
}

/// A datasource that was not evaluated, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotEvaluated {
  pub reference: Reference,
  pub reason: SkipReason,
}

impl fmt::Display for NotEvaluated {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.reason {
      SkipReason::DependencyFailed(dependency) => {
        write!(f, "{} not evaluated: dependency {} failed", self.reference, dependency)
      }
      SkipReason::Cancelled => write!(f, "{} not evaluated: cancelled", self.reference),
    }
  }
}

impl NotEvaluated {
  /// Skips caused by a failed dependency are warnings; the failure itself is
  /// reported separately. Cancellation is an error of its own.
  pub fn to_diagnostic(&self) -> Diagnostic {
    let (severity, kind, mut references) = match &self.reason {
      SkipReason::DependencyFailed(dependency) => (
        Severity::Warning,
        DiagnosticKind::DependencyFailed,
        vec![self.reference.clone(), dependency.clone()],
      ),
      SkipReason::Cancelled => (Severity::Error, DiagnosticKind::Cancelled, vec![self.reference.clone()]),
    };
    references.dedup();
    Diagnostic {
      severity,
      kind,
      references,
      message: self.to_string(),
    }
  }
}

/// Every problem found while validating or evaluating a configuration.
#[derive(Debug, Default)]
pub struct AggregateError {
  /// Root causes, in the order they were found.
  pub errors: Vec<ConfigError>,
  /// Datasources skipped because of a root cause or cancellation.
  pub not_evaluated: Vec<NotEvaluated>,
}

impl AggregateError {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, error: ConfigError) {
    self.errors.push(error);
  }

  pub fn extend(&mut self, other: AggregateError) {
    self.errors.extend(other.errors);
    self.not_evaluated.extend(other.not_evaluated);
  }

  pub fn is_empty(&self) -> bool {
    self.errors.is_empty() && self.not_evaluated.is_empty()
  }

  /// `Ok(())` when nothing was collected.
  pub fn into_result(self) -> Result<(), AggregateError> {
    if self.is_empty() { Ok(()) } else { Err(self) }
  }

  /// Root causes first, then skipped datasources.
  pub fn diagnostics(&self) -> Vec<Diagnostic> {
    self
      .errors
      .iter()
      .map(ConfigError::to_diagnostic)
      .chain(self.not_evaluated.iter().map(NotEvaluated::to_diagnostic))
      .collect()
  }
}

impl From<Vec<ConfigError>> for AggregateError {
  fn from(errors: Vec<ConfigError>) -> Self {
    Self {
      errors,
      not_evaluated: Vec::new(),
    }
  }
}

impl fmt::Display for AggregateError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} error(s)", self.errors.len())?;
    if !self.not_evaluated.is_empty() {
      write!(f, ", {} datasource(s) not evaluated", self.not_evaluated.len())?;
    }
    for error in &self.errors {
      write!(f, "\n  {}", error)?;
    }
    for skipped in &self.not_evaluated {
      write!(f, "\n  {}", skipped)?;
    }
    Ok(())
  }
}

impl std::error::Error for AggregateError {}
