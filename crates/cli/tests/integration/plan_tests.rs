use super::common::TestEnv;

#[test]
fn plan_lists_dependencies_before_dependents() {
  let env = TestEnv::from_fixtures(&["chain.pkr.json"]);
  let (success, json) = env.json(&["plan"]);

  assert!(success);
  let order: Vec<_> = json["order"]
    .as_array()
    .unwrap()
    .iter()
    .map(|step| step["datasource"].as_str().unwrap().to_string())
    .collect();
  assert_eq!(
    order,
    vec![
      "data.null.foo",
      "data.null.bar",
      "data.null.baz",
      "data.null.bang",
      "data.null.yummy"
    ]
  );
  assert_eq!(json["order"][2]["depends_on"], serde_json::json!(["data.null.foo", "data.null.bar"]));
}

#[test]
fn plan_text_output_numbers_steps() {
  let env = TestEnv::from_fixtures(&["chain.pkr.json"]);
  let output = env.kiln(&["plan"]).output().unwrap();
  let stdout = String::from_utf8_lossy(&output.stdout);

  assert!(output.status.success());
  assert!(stdout.contains("1. data.null.foo"), "{}", stdout);
  assert!(stdout.contains("5. data.null.yummy"), "{}", stdout);
}
