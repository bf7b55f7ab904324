use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn valid_configuration_is_summarized() {
  let env = TestEnv::from_fixtures(&["chain.pkr.json"]);
  let (success, json) = env.json(&["validate"]);

  assert!(success);
  assert_eq!(json["valid"], true);
  assert_eq!(json["datasources"], 5);
  assert_eq!(json["sources"], 1);
  assert_eq!(json["builds"], 1);
}

#[test]
fn cycle_members_are_reported() {
  let env = TestEnv::from_fixtures(&["cycle.pkr.json"]);
  env
    .kiln(&["validate"])
    .assert()
    .failure()
    .stderr(predicate::str::contains(
      "dependency cycle: data.null.gummy -> data.null.bear -> data.null.gummy",
    ));
}

#[test]
fn every_problem_is_reported_as_a_diagnostic() {
  let env = TestEnv::from_fixtures(&["invalid.pkr.json"]);
  let (success, json) = env.json(&["validate"]);

  assert!(!success);
  assert_eq!(json["valid"], false);
  let kinds: Vec<_> = json["diagnostics"]
    .as_array()
    .unwrap()
    .iter()
    .map(|d| d["kind"].as_str().unwrap().to_string())
    .collect();
  assert_eq!(
    kinds,
    vec!["untyped_block", "unnamed_block", "unregistered_type", "duplicate_block"]
  );
  assert!(
    json["diagnostics"]
      .as_array()
      .unwrap()
      .iter()
      .all(|d| d["severity"] == "error")
  );
}

#[test]
fn files_in_a_directory_are_merged() {
  let env = TestEnv::empty();
  env.write_file(
    "a.pkr.json",
    r#"{"data": [{"type": "null", "name": "a", "config": {"input": "${data.null.b.output}"}}]}"#,
  );
  env.write_file("nested/b.pkr.json", r#"{"data": [{"type": "null", "name": "b", "config": {"input": 1}}]}"#);
  env.write_file("ignored.json", r#"{"data": [{"type": "broken"}]}"#);

  env.kiln(&["validate"]).assert().success();
}
