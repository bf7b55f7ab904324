//! Placeholder parsing and substitution for datasource values and variables.
//!
//! Raw block configuration may reference values that only exist once other
//! datasources have been evaluated. Those references are written as
//! placeholders inside strings and substituted right before a block is handed
//! to its plugin.
//!
//! # Placeholder Formats
//!
//! - `${data.<type>.<name>}` - the whole result map of a datasource
//! - `${data.<type>.<name>.<attr>[.<attr>...]}` - one attribute of that result
//! - `${var.<name>[.<attr>...]}` - an input variable
//!
//! # Typed substitution
//!
//! A string that consists of exactly one placeholder is replaced by the
//! referenced value itself, keeping its kind (a list stays a list). Anywhere
//! else a placeholder is rendered as text, which only works for strings,
//! numbers and booleans.
//!
//! # Escaping
//!
//! `$${` produces a literal `${`. A lone `$` passes through unchanged, so
//! shell variables like `$HOME` need no escaping.
//!
//! # Example
//!
//! ```
//! use kiln_lib::placeholder::{parse, Placeholder, Segment};
//! use kiln_lib::reference::Reference;
//!
//! let segments = parse("ami-${data.null.base.output}").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("ami-".to_string()),
//!     Segment::Placeholder(Placeholder::Data {
//!         reference: Reference::data("null", "base"),
//!         attribute: vec!["output".to_string()],
//!     }),
//! ]);
//! ```

use std::fmt;

use thiserror::Error;

use crate::reference::{RawReference, Reference, ReferenceError};
use crate::value::{Value, ValueMap};

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  /// `${data.<type>.<name>...}` - a datasource result or one of its attributes
  Data { reference: Reference, attribute: Vec<String> },

  /// `${var.<name>...}` - an input variable
  Var { name: String, attribute: Vec<String> },
}

impl fmt::Display for Placeholder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (head, attribute) = match self {
      Placeholder::Data { reference, attribute } => (reference.to_string(), attribute),
      Placeholder::Var { name, attribute } => (format!("var.{}", name), attribute),
    };
    f.write_str(&head)?;
    for part in attribute {
      write!(f, ".{}", part)?;
    }
    Ok(())
  }
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A placeholder to be resolved
  Placeholder(Placeholder),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder root '{0}' (expected data or var)")]
  UnknownRoot(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("malformed reference: {0}")]
  Reference(#[from] ReferenceError),

  #[error("{0} has no resolved value")]
  UnresolvedData(Reference),

  #[error("variable '{0}' is not defined")]
  UnknownVariable(String),

  #[error("'{placeholder}' has no attribute '{attribute}'")]
  UnknownAttribute { placeholder: String, attribute: String },

  #[error("'{placeholder}' is a {kind} and cannot be rendered into a string")]
  NotRenderable { placeholder: String, kind: &'static str },
}

/// Trait for looking up placeholder targets.
pub trait Resolver {
  /// Resolve the full result map of a datasource.
  fn resolve_data(&self, reference: &Reference) -> Result<&ValueMap, PlaceholderError>;

  /// Resolve an input variable by name.
  fn resolve_var(&self, name: &str) -> Result<&Value, PlaceholderError>;
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is malformed (unclosed, unknown root,
/// bad reference, empty traversal step).
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next(); // consume the second $

        match chars.peek() {
          Some((_, '{')) => {
            // Escaped: $${ -> ${ (literal)
            chars.next();
            literal.push_str("${");
          }
          _ => literal.push_str("$$"),
        }
      }
      Some((_, '{')) => {
        chars.next(); // consume the {

        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }

        let mut content = String::new();
        let mut found_close = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            found_close = true;
            break;
          }
          content.push(c);
        }

        if !found_close {
          return Err(PlaceholderError::Unclosed(pos));
        }

        segments.push(Segment::Placeholder(parse_placeholder_content(content.trim())?));
      }
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Parse the content inside a placeholder (everything between `${` and `}`).
fn parse_placeholder_content(content: &str) -> Result<Placeholder, PlaceholderError> {
  if content.is_empty() {
    return Err(PlaceholderError::Malformed("empty placeholder".to_string()));
  }

  let parts: Vec<&str> = content.split('.').collect();
  if parts.iter().any(|p| p.is_empty()) {
    return Err(PlaceholderError::Malformed(format!("empty traversal step in '{}'", content)));
  }

  match parts[0] {
    "data" => {
      let [_, type_name, name, attribute @ ..] = parts.as_slice() else {
        return Err(ReferenceError::WrongArity(content.to_string()).into());
      };
      let reference = Reference::resolve(&RawReference::new("data", *type_name, *name))?;
      Ok(Placeholder::Data {
        reference,
        attribute: attribute.iter().map(|s| s.to_string()).collect(),
      })
    }
    "var" => {
      let [_, name, attribute @ ..] = parts.as_slice() else {
        return Err(PlaceholderError::Malformed(format!("variable placeholder missing name: '{}'", content)));
      };
      Ok(Placeholder::Var {
        name: name.to_string(),
        attribute: attribute.iter().map(|s| s.to_string()).collect(),
      })
    }
    other => Err(PlaceholderError::UnknownRoot(other.to_string())),
  }
}

/// Look up the value a placeholder points at.
pub fn lookup<R: Resolver + ?Sized>(placeholder: &Placeholder, resolver: &R) -> Result<Value, PlaceholderError> {
  match placeholder {
    Placeholder::Data { reference, attribute } => {
      let result = resolver.resolve_data(reference)?;
      let Some((first, rest)) = attribute.split_first() else {
        return Ok(Value::Map(result.clone()));
      };
      let start = result.get(first).ok_or_else(|| PlaceholderError::UnknownAttribute {
        placeholder: placeholder.to_string(),
        attribute: first.clone(),
      })?;
      traverse(start, rest, placeholder)
    }
    Placeholder::Var { name, attribute } => {
      let value = resolver.resolve_var(name)?;
      traverse(value, attribute, placeholder)
    }
  }
}

fn traverse(start: &Value, attribute: &[String], placeholder: &Placeholder) -> Result<Value, PlaceholderError> {
  let mut current = start;
  for part in attribute {
    current = current
      .as_map()
      .and_then(|map| map.get(part))
      .ok_or_else(|| PlaceholderError::UnknownAttribute {
        placeholder: placeholder.to_string(),
        attribute: part.clone(),
      })?;
  }
  Ok(current.clone())
}

/// Substitute all placeholders in a string.
///
/// A string made of exactly one placeholder yields the referenced value with
/// its kind preserved; otherwise the result is a string.
///
/// # Errors
///
/// Returns an error if parsing fails, a target cannot be resolved, or a list
/// or map would have to be rendered as text.
pub fn substitute_str<R: Resolver + ?Sized>(input: &str, resolver: &R) -> Result<Value, PlaceholderError> {
  let segments = parse(input)?;

  if let [Segment::Placeholder(placeholder)] = segments.as_slice() {
    return lookup(placeholder, resolver);
  }

  let mut result = String::new();
  for segment in &segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(placeholder) => {
        let value = lookup(placeholder, resolver)?;
        let text = value.render().ok_or_else(|| PlaceholderError::NotRenderable {
          placeholder: placeholder.to_string(),
          kind: value.kind_name(),
        })?;
        result.push_str(&text);
      }
    }
  }

  Ok(Value::String(result))
}

/// Substitute placeholders anywhere inside a value tree.
pub fn substitute<R: Resolver + ?Sized>(value: &Value, resolver: &R) -> Result<Value, PlaceholderError> {
  match value {
    Value::String(s) => substitute_str(s, resolver),
    Value::List(items) => items
      .iter()
      .map(|item| substitute(item, resolver))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::List),
    Value::Map(map) => substitute_map(map, resolver).map(Value::Map),
    Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
  }
}

/// Substitute placeholders in every value of a map. Keys are left as written.
pub fn substitute_map<R: Resolver + ?Sized>(map: &ValueMap, resolver: &R) -> Result<ValueMap, PlaceholderError> {
  map
    .iter()
    .map(|(key, value)| substitute(value, resolver).map(|v| (key.clone(), v)))
    .collect()
}
