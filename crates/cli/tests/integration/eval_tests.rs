use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn chain_resolves_and_feeds_sources_and_builds() {
  let env = TestEnv::from_fixtures(&["chain.pkr.json"]);
  let (success, json) = env.json(&["eval", "-j", "2"]);

  assert!(success);
  assert_eq!(json["success"], true);
  assert!(json["states"].as_object().unwrap().values().all(|s| s == "resolved"));
  assert_eq!(json["config"]["datasources"]["data.null.yummy"]["output"], "foo-bar-base!");
  assert_eq!(json["config"]["sources"]["source.null.image"]["label"], "foo-bar-base!");
  assert_eq!(
    json["config"]["builds"][0]["provisioners"][0]["config"]["inline"][0],
    "echo foo-bar-base!"
  );
  assert_eq!(json["diagnostics"], serde_json::json!([]));
}

#[test]
fn variable_overrides_apply() {
  let env = TestEnv::from_fixtures(&["chain.pkr.json"]);
  let (success, json) = env.json(&["eval", "--var", "suffix=prod"]);

  assert!(success);
  assert_eq!(json["config"]["variables"]["suffix"], "prod");
  assert_eq!(json["config"]["datasources"]["data.null.yummy"]["output"], "foo-bar-prod!");
}

#[test]
fn failure_is_reported_and_dependents_skipped() {
  let env = TestEnv::from_fixtures(&["failing.pkr.json"]);
  let (success, json) = env.json(&["eval"]);

  assert!(!success);
  assert_eq!(json["success"], false);
  assert_eq!(json["states"]["data.env.missing"], "failed");
  assert_eq!(json["states"]["data.null.after"], "skipped");
  assert_eq!(json["states"]["data.null.independent"], "resolved");

  let diagnostics = json["diagnostics"].as_array().unwrap();
  assert_eq!(diagnostics[0]["kind"], "evaluation");
  assert_eq!(diagnostics[0]["severity"], "error");
  assert_eq!(diagnostics[1]["kind"], "dependency_failed");
  assert_eq!(diagnostics[1]["severity"], "warning");
  assert!(json["config"]["datasources"]["data.null.after"].is_null());
}

#[test]
fn text_output_marks_each_datasource() {
  let env = TestEnv::from_fixtures(&["failing.pkr.json"]);
  env
    .kiln(&["eval"])
    .assert()
    .failure()
    .stdout(predicate::str::contains("data.null.after (skipped)"))
    .stdout(predicate::str::contains("data.env.missing (failed)"))
    .stderr(predicate::str::contains("evaluation failed: 1 failed, 1 skipped, 0 cancelled"));
}

#[test]
fn invalid_configuration_is_not_evaluated() {
  let env = TestEnv::from_fixtures(&["cycle.pkr.json"]);
  env
    .kiln(&["eval"])
    .assert()
    .failure()
    .stdout(predicate::str::contains("Datasources:").not())
    .stderr(predicate::str::contains("configuration is invalid: 1 error(s)"));
}

#[test]
fn show_values_prints_resolved_configuration() {
  let env = TestEnv::from_fixtures(&["chain.pkr.json"]);
  env
    .kiln(&["eval", "--show-values"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"foo-bar-base!\""));
}
