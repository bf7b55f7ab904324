use kiln_lib::error::{ConfigError, SkipReason};
use kiln_lib::evaluate::{EvaluateConfig, FailureReason, NodeError, NodeState};
use kiln_lib::plugin::PluginError;
use kiln_lib::{EvalOptions, Reference, Value, ValueMap, evaluate_config};
use tokio_util::sync::CancellationToken;

use super::common::{config_dir, finished, position, registry};

const CHAIN: &str = r#"{
  "data": [
    {"type": "recorder", "name": "yummy", "config": {"label": "yummy", "value": "${data.recorder.bang.output}!"}},
    {"type": "recorder", "name": "bang", "config": {"label": "bang", "value": "${data.recorder.baz.output}"}},
    {"type": "recorder", "name": "baz", "config": {
      "label": "baz",
      "value": "${data.recorder.foo.output}+${data.recorder.bar.output}"
    }},
    {"type": "recorder", "name": "foo", "config": {"label": "foo", "delay_ms": 20}},
    {"type": "recorder", "name": "bar", "config": {"label": "bar"}}
  ]
}"#;

fn options(parallelism: usize) -> EvalOptions {
  EvalOptions {
    settings: EvaluateConfig {
      parallelism,
      timeout: None,
    },
    variables: ValueMap::new(),
  }
}

fn data(name: &str) -> Reference {
  Reference::data("recorder", name)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chained_datasources_resolve_in_dependency_order() {
  let dir = config_dir(&[("chain.pkr.json", CHAIN)]);
  let (registry, log) = registry();

  let outcome = evaluate_config(&[dir.path()], &registry, &options(4), CancellationToken::new())
    .await
    .unwrap();

  assert!(outcome.is_success(), "{:?}", outcome.error());
  let order = finished(&log);
  assert_eq!(order.len(), 5);
  assert!(position(&order, "foo") < position(&order, "baz"));
  assert!(position(&order, "bar") < position(&order, "baz"));
  assert!(position(&order, "baz") < position(&order, "bang"));
  assert!(position(&order, "bang") < position(&order, "yummy"));

  let yummy = outcome.config.datasource(&data("yummy")).unwrap();
  assert_eq!(yummy["output"], Value::from("foo+bar!"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_runs_produce_identical_results() {
  let dir = config_dir(&[("chain.pkr.json", CHAIN)]);
  let (registry, _log) = registry();

  let mut outcomes = Vec::new();
  for _ in 0..3 {
    let outcome = evaluate_config(&[dir.path()], &registry, &options(3), CancellationToken::new())
      .await
      .unwrap();
    outcomes.push((
      outcome.evaluation.order.clone(),
      outcome.evaluation.states.clone(),
      outcome.config.to_json(),
    ));
  }
  assert!(outcomes.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn single_worker_follows_topological_order() {
  let dir = config_dir(&[("chain.pkr.json", CHAIN)]);
  let (registry, log) = registry();

  evaluate_config(&[dir.path()], &registry, &options(1), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(finished(&log), vec!["foo", "bar", "baz", "bang", "yummy"]);
}

#[tokio::test]
async fn failure_skips_dependents_and_spares_the_rest() {
  let dir = config_dir(&[(
    "fail.pkr.json",
    r#"{
      "data": [
        {"type": "recorder", "name": "root", "config": {"label": "root", "fail": true}},
        {"type": "recorder", "name": "child", "config": {"label": "child", "value": "${data.recorder.root.output}"}},
        {"type": "recorder", "name": "grandchild", "config": {"label": "grandchild", "value": "${data.recorder.child.output}"}},
        {"type": "recorder", "name": "other", "config": {"label": "other"}}
      ]
    }"#,
  )]);
  let (registry, log) = registry();

  let outcome = evaluate_config(&[dir.path()], &registry, &options(2), CancellationToken::new())
    .await
    .unwrap();

  let evaluation = &outcome.evaluation;
  assert!(!evaluation.is_success());
  assert_eq!(evaluation.state(&data("root")), Some(&NodeState::Failed(FailureReason::Error)));
  assert_eq!(
    evaluation.state(&data("child")),
    Some(&NodeState::Failed(FailureReason::Propagated(data("root"))))
  );
  assert_eq!(
    evaluation.state(&data("grandchild")),
    Some(&NodeState::Failed(FailureReason::Propagated(data("child"))))
  );
  assert_eq!(evaluation.state(&data("other")), Some(&NodeState::Resolved));
  assert_eq!(finished(&log), vec!["other"]);

  let error = outcome.error().unwrap();
  assert_eq!(error.errors.len(), 1);
  assert!(matches!(
    &error.errors[0],
    ConfigError::Evaluation { reference, source: NodeError::Plugin(PluginError::Execute(_)) } if *reference == data("root")
  ));
  let skipped: Vec<_> = error
    .not_evaluated
    .iter()
    .map(|n| (n.reference.name(), n.reason.clone()))
    .collect();
  assert_eq!(
    skipped,
    vec![
      ("child", SkipReason::DependencyFailed(data("root"))),
      ("grandchild", SkipReason::DependencyFailed(data("child"))),
    ]
  );
}

#[tokio::test]
async fn independent_failures_are_all_reported() {
  let dir = config_dir(&[(
    "fail.pkr.json",
    r#"{
      "data": [
        {"type": "recorder", "name": "a", "config": {"label": "a", "fail": true}},
        {"type": "recorder", "name": "b", "config": {"label": "b", "fail": true}}
      ]
    }"#,
  )]);
  let (registry, _log) = registry();

  let outcome = evaluate_config(&[dir.path()], &registry, &options(2), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(outcome.error().unwrap().errors.len(), 2);
  assert_eq!(outcome.evaluation.failed(), 2);
}

#[tokio::test]
async fn timed_out_datasource_fails() {
  let dir = config_dir(&[(
    "slow.pkr.json",
    r#"{
      "data": [
        {"type": "recorder", "name": "slow", "config": {"label": "slow", "delay_ms": 5000}},
        {"type": "recorder", "name": "after", "config": {"label": "after", "value": "${data.recorder.slow.output}"}}
      ]
    }"#,
  )]);
  let (registry, log) = registry();
  let options = EvalOptions {
    settings: EvaluateConfig {
      parallelism: 2,
      timeout: Some(std::time::Duration::from_millis(50)),
    },
    variables: ValueMap::new(),
  };

  let outcome = evaluate_config(&[dir.path()], &registry, &options, CancellationToken::new())
    .await
    .unwrap();

  let error = outcome.error().unwrap();
  assert!(matches!(
    &error.errors[0],
    ConfigError::Evaluation { source: NodeError::Plugin(PluginError::Timeout(_)), .. }
  ));
  assert_eq!(
    outcome.evaluation.state(&data("after")),
    Some(&NodeState::Failed(FailureReason::Propagated(data("slow"))))
  );
  assert!(finished(&log).is_empty());
}

#[tokio::test]
async fn variables_and_overrides_are_interpolated() {
  let dir = config_dir(&[(
    "vars.pkr.json",
    r#"{
      "variables": {"region": "eu-west-1", "count": 2},
      "data": [
        {"type": "recorder", "name": "where", "config": {"label": "where", "value": "${var.region}"}},
        {"type": "recorder", "name": "how_many", "config": {"label": "how_many", "value": "${var.count}"}}
      ]
    }"#,
  )]);
  let (registry, _log) = registry();
  let mut options = options(2);
  options.variables.insert("region".to_string(), Value::from("us-east-2"));

  let outcome = evaluate_config(&[dir.path()], &registry, &options, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(
    outcome.config.datasource(&data("where")).unwrap()["output"],
    Value::from("us-east-2")
  );
  assert_eq!(
    outcome.config.datasource(&data("how_many")).unwrap()["output"],
    Value::Number(2.into())
  );
}

#[tokio::test]
async fn sources_and_builds_see_datasource_values() {
  let dir = config_dir(&[
    (
      "data.pkr.json",
      r#"{"data": [{"type": "null", "name": "ami", "config": {"input": "ami-0abc"}}]}"#,
    ),
    (
      "build.pkr.json",
      r#"{
        "source": [{"type": "amazon-ebs", "name": "base", "config": {"source_ami": "${data.null.ami.output}"}}],
        "build": [{
          "name": "web",
          "sources": ["source.amazon-ebs.base"],
          "provisioners": [{"type": "shell", "config": {"inline": ["echo ${data.null.ami.output}"]}}]
        }]
      }"#,
    ),
  ]);
  let (registry, _log) = registry();

  let outcome = evaluate_config(&[dir.path()], &registry, &options(2), CancellationToken::new())
    .await
    .unwrap();

  let build = outcome.config.build_config("web").unwrap();
  assert_eq!(build.sources[0].1["source_ami"], Value::from("ami-0abc"));
  assert_eq!(
    build.provisioners[0].config["inline"],
    Value::List(vec![Value::from("echo ami-0abc")])
  );
}
