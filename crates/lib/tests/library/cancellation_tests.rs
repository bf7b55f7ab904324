use std::time::{Duration, Instant};

use kiln_lib::error::SkipReason;
use kiln_lib::evaluate::{EvaluateConfig, FailureReason, NodeState};
use kiln_lib::{EvalOptions, Reference, ValueMap, evaluate_config};
use tokio_util::sync::CancellationToken;

use super::common::{config_dir, finished, registry};

const SLOW_CHAIN: &str = r#"{
  "data": [
    {"type": "recorder", "name": "quick", "config": {"label": "quick"}},
    {"type": "recorder", "name": "slow", "config": {"label": "slow", "delay_ms": 10000}},
    {"type": "recorder", "name": "after", "config": {"label": "after", "value": "${data.recorder.slow.output}"}}
  ]
}"#;

fn options() -> EvalOptions {
  EvalOptions {
    settings: EvaluateConfig {
      parallelism: 1,
      timeout: None,
    },
    variables: ValueMap::new(),
  }
}

#[tokio::test]
async fn cancelling_before_start_evaluates_nothing() {
  let dir = config_dir(&[("slow.pkr.json", SLOW_CHAIN)]);
  let (registry, log) = registry();
  let cancel = CancellationToken::new();
  cancel.cancel();

  let outcome = evaluate_config(&[dir.path()], &registry, &options(), cancel).await.unwrap();

  assert!(finished(&log).is_empty());
  assert_eq!(outcome.evaluation.cancelled(), 3);
  let error = outcome.error().unwrap();
  assert!(error.errors.is_empty());
  assert!(error.not_evaluated.iter().all(|n| n.reason == SkipReason::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_in_flight_stops_promptly() {
  let dir = config_dir(&[("slow.pkr.json", SLOW_CHAIN)]);
  let (registry, log) = registry();
  let cancel = CancellationToken::new();

  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(100)).await;
    trigger.cancel();
  });

  let started = Instant::now();
  let outcome = evaluate_config(&[dir.path()], &registry, &options(), cancel).await.unwrap();

  assert!(started.elapsed() < Duration::from_secs(5));
  assert_eq!(finished(&log), vec!["quick"]);
  let state = |name: &str| outcome.evaluation.state(&Reference::data("recorder", name)).cloned();
  assert_eq!(state("quick"), Some(NodeState::Resolved));
  assert_eq!(state("slow"), Some(NodeState::Failed(FailureReason::Cancelled)));
  assert_eq!(state("after"), Some(NodeState::Failed(FailureReason::Cancelled)));
  assert!(outcome.config.datasource(&Reference::data("recorder", "quick")).is_some());
}
