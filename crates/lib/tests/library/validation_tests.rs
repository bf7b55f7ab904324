use kiln_lib::error::{ConfigError, DiagnosticKind, Severity};
use kiln_lib::load::LoadError;
use kiln_lib::{EvalError, Reference, ValueMap, check_config};

use super::common::{config_dir, registry};

fn invalid(text: &str) -> Vec<ConfigError> {
  let dir = config_dir(&[("main.pkr.json", text)]);
  let (registry, _log) = registry();
  match check_config(&[dir.path()], &registry, &ValueMap::new()) {
    Err(EvalError::Invalid(aggregate)) => aggregate.errors,
    other => panic!("expected an invalid configuration, got {:?}", other.map(|c| c.plan())),
  }
}

#[test]
fn mutual_reference_is_a_cycle() {
  let errors = invalid(
    r#"{"data": [
      {"type": "null", "name": "gummy", "config": {"input": "${data.null.bear.output}"}},
      {"type": "null", "name": "bear", "config": {"input": "${data.null.gummy.output}"}}
    ]}"#,
  );
  assert_eq!(errors.len(), 1);
  let ConfigError::Cycle { members } = &errors[0] else {
    panic!("expected a cycle, got {}", errors[0]);
  };
  let names: Vec<_> = members.iter().map(Reference::name).collect();
  assert_eq!(names, vec!["gummy", "bear", "gummy"]);
  assert_eq!(
    errors[0].to_string(),
    "dependency cycle: data.null.gummy -> data.null.bear -> data.null.gummy"
  );
}

#[test]
fn untyped_and_unnamed_blocks_are_rejected() {
  let errors = invalid(
    r#"{"data": [
      {"name": "no_type", "config": {"input": "x"}},
      {"type": "null", "config": {"input": "x"}}
    ]}"#,
  );
  let kinds: Vec<_> = errors.iter().map(ConfigError::kind).collect();
  assert_eq!(kinds, vec![DiagnosticKind::UntypedBlock, DiagnosticKind::UnnamedBlock]);
  assert!(errors[0].to_string().contains("main.pkr.json:data[0]"));
}

#[test]
fn unregistered_type_is_rejected() {
  let errors = invalid(r#"{"data": [{"type": "nonexistent", "name": "x"}]}"#);
  assert!(matches!(
    &errors[0],
    ConfigError::UnregisteredType { type_name, .. } if type_name == "nonexistent"
  ));
}

#[test]
fn duplicates_across_files_are_rejected() {
  let dir = config_dir(&[
    ("a.pkr.json", r#"{"data": [{"type": "null", "name": "dup", "config": {"input": 1}}]}"#),
    ("b.pkr.json", r#"{"data": [{"type": "null", "name": "dup", "config": {"input": 2}}]}"#),
  ]);
  let (registry, _log) = registry();

  let Err(EvalError::Invalid(aggregate)) = check_config(&[dir.path()], &registry, &ValueMap::new()) else {
    panic!("expected a duplicate declaration error");
  };
  let message = aggregate.errors[0].to_string();
  assert!(message.contains("a.pkr.json:data[0]"), "{}", message);
  assert!(message.contains("b.pkr.json:data[0]"), "{}", message);
}

#[test]
fn undeclared_dependency_is_rejected() {
  let errors = invalid(
    r#"{"data": [{"type": "null", "name": "a", "depends_on": [["data", "null", "missing"]], "config": {"input": 1}}]}"#,
  );
  assert_eq!(
    errors[0].to_string(),
    "data.null.a depends on data.null.missing, which is not declared"
  );
}

#[test]
fn every_problem_is_reported_at_once() {
  let errors = invalid(
    r#"{
      "data": [
        {"type": "", "name": "a"},
        {"type": "null", "name": "loop", "config": {"input": "${data.null.loop.output}"}},
        {"type": "null", "name": "b", "config": {"input": "${data.null.nowhere.output}"}}
      ],
      "build": [{"sources": []}]
    }"#,
  );
  let kinds: Vec<_> = errors.iter().map(ConfigError::kind).collect();
  assert_eq!(
    kinds,
    vec![
      DiagnosticKind::UntypedBlock,
      DiagnosticKind::UnknownReference,
      DiagnosticKind::Cycle,
      DiagnosticKind::UnnamedBlock,
    ]
  );
  assert!(
    errors
      .iter()
      .map(ConfigError::to_diagnostic)
      .all(|d| d.severity == Severity::Error)
  );
}

#[test]
fn empty_directory_is_a_load_error() {
  let dir = config_dir(&[("notes.txt", "not configuration")]);
  let (registry, _log) = registry();
  assert!(matches!(
    check_config(&[dir.path()], &registry, &ValueMap::new()),
    Err(EvalError::Load(LoadError::NoConfigFiles { .. }))
  ));
}

#[test]
fn malformed_json_is_a_load_error() {
  let dir = config_dir(&[("broken.pkr.json", "{\"data\": [")]);
  let (registry, _log) = registry();
  assert!(matches!(
    check_config(&[dir.path()], &registry, &ValueMap::new()),
    Err(EvalError::Load(LoadError::Parse { .. }))
  ));
}
