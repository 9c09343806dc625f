mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use conduit_config::{FlowVersion, StepType};
use conduit_context::{FlowExecutorContext, StepOutput, StepStatus};
use conduit_engine::{EngineConstants, EngineOperationType, FlowRunStatus};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const DOUBLE: &str = "return function(inputs) return { doubled = inputs.n * 2 } end";
const GREET: &str = "return function(inputs) return 'hello ' .. inputs.name end";
const FAIL: &str = "return function(inputs) error('boom') end";

fn branch_step(name: &str, first_value: &str, on_success: serde_json::Value, on_failure: serde_json::Value) -> serde_json::Value {
  json!({
    "type": "BRANCH",
    "name": name,
    "displayName": name,
    "settings": {
      "conditions": [[{
        "firstValue": first_value,
        "secondValue": "vip",
        "operator": "TEXT_EXACTLY_MATCHES",
      }]]
    },
    "onSuccessAction": on_success,
    "onFailureAction": on_failure,
  })
}

fn split_step(execution_type: &str, tier: &str) -> serde_json::Value {
  let branch = |name: &str, operator: &str, value: &str| {
    json!({
      "branchName": name,
      "branchType": "CONDITION",
      "conditions": [[{
        "firstValue": tier,
        "secondValue": value,
        "operator": operator,
      }]],
      "firstAction": gate_step(&format!("{}_step", name), name),
    })
  };
  json!({
    "type": "SPLIT",
    "name": "split_1",
    "displayName": "Split",
    "settings": { "executionType": execution_type },
    "branches": [
      branch("gold", "TEXT_CONTAINS", "gold"),
      branch("metal", "TEXT_ENDS_WITH", "d"),
      {
        "branchName": "otherwise",
        "branchType": "FALLBACK",
        "firstAction": gate_step("otherwise_step", "otherwise"),
      }
    ],
  })
}

#[tokio::test]
async fn test_code_chain_resolves_previous_outputs() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let flow = flow(chain(vec![
    code_step("step_1", DOUBLE, json!({ "n": "{{ trigger.n }}" })),
    code_step("step_2", GREET, json!({ "name": "#{{ step_1.doubled }}" })),
  ]));

  let details = harness.run_flow(flow, json!({ "n": 21 })).await;

  assert_eq!(details.status, FlowRunStatus::Succeeded);
  assert_eq!(details.tasks, 2);
  assert_eq!(details.steps["step_1"].output, Some(json!({ "doubled": 42 })));
  assert_eq!(details.steps["step_1"].input, json!({ "n": 21 }));
  assert_eq!(details.steps["step_2"].output, Some(json!("hello #42")));
  assert_eq!(details.steps["trigger"].step_type, StepType::EmptyTrigger);
}

#[tokio::test]
async fn test_failed_step_stops_the_chain() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let flow = flow(chain(vec![
    code_step("step_1", FAIL, json!({})),
    gate_step("step_2", "never"),
  ]));

  let details = harness.run_flow(flow, json!({})).await;

  assert_eq!(details.status, FlowRunStatus::Failed);
  let failed = details.failed_step.unwrap();
  assert_eq!(failed.name, "step_1");
  assert!(failed.message.contains("boom"), "{}", failed.message);
  assert_eq!(details.steps["step_1"].status, StepStatus::Failed);
  assert!(!details.steps.contains_key("step_2"));
}

#[tokio::test]
async fn test_continue_on_failure_keeps_running() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let flow = flow(chain(vec![
    with_error_handling(gate_step("step_1", "fail"), true, false),
    gate_step("step_2", "after"),
  ]));

  let details = harness.run_flow(flow, json!({})).await;

  assert_eq!(details.status, FlowRunStatus::Succeeded);
  assert_eq!(details.steps["step_1"].status, StepStatus::Failed);
  assert_eq!(
    details.steps["step_1"].error_message.as_deref(),
    Some("gate closed")
  );
  assert_eq!(details.steps["step_2"].output, Some(json!({ "value": "after" })));
}

#[tokio::test]
async fn test_completed_steps_are_not_run_again() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let flow: FlowVersion = serde_json::from_value(flow(chain(vec![
    code_step("step_1", FAIL, json!({})),
    gate_step("step_2", "fresh"),
  ])))
  .unwrap();

  let ctx = FlowExecutorContext::empty()
    .upsert_step(
      "trigger",
      StepOutput::succeeded(StepType::EmptyTrigger, json!({}), json!({})),
    )
    .upsert_step(
      "step_1",
      StepOutput::succeeded(StepType::Code, json!({}), json!("cached")),
    );
  let constants = EngineConstants::new(&flow, "run_1".to_string());

  let first = flow.trigger.next_action.as_deref().unwrap();
  let ctx = harness
    .engine
    .executor()
    .execute(first, ctx, &constants)
    .await
    .unwrap();

  assert!(ctx.is_running());
  assert_eq!(ctx.tasks(), 1);
  assert_eq!(ctx.get_step_output("step_1").unwrap().output, Some(json!("cached")));
  assert_eq!(
    ctx.get_step_output("step_2").unwrap().output,
    Some(json!({ "value": "fresh" }))
  );
}

#[tokio::test]
async fn test_branch_routes_on_condition() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let flow = flow(chain(vec![
    branch_step(
      "branch_1",
      "{{ trigger.tier }}",
      gate_step("vip_step", "vip"),
      gate_step("regular_step", "regular"),
    ),
    gate_step("after", "after"),
  ]));

  let details = harness.run_flow(flow.clone(), json!({ "tier": "vip" })).await;
  assert_eq!(details.status, FlowRunStatus::Succeeded);
  assert_eq!(details.steps["branch_1"].output, Some(json!({ "condition": true })));
  assert!(details.steps.contains_key("vip_step"));
  assert!(!details.steps.contains_key("regular_step"));
  assert!(details.steps.contains_key("after"));

  let details = harness.run_flow(flow, json!({ "tier": "basic" })).await;
  assert_eq!(details.steps["branch_1"].output, Some(json!({ "condition": false })));
  assert!(details.steps.contains_key("regular_step"));
  assert!(!details.steps.contains_key("vip_step"));
}

#[tokio::test]
async fn test_split_runs_first_match() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let details = harness
    .run_flow(flow(split_step("EXECUTE_FIRST_MATCH", "{{ trigger.tier }}")), json!({ "tier": "gold" }))
    .await;

  assert_eq!(details.status, FlowRunStatus::Succeeded);
  let output = details.steps["split_1"].output.clone().unwrap();
  assert_eq!(output["selectedBranches"], json!(["gold"]));
  assert_eq!(
    output["evaluations"],
    json!([
      { "branchName": "gold", "evaluation": true },
      { "branchName": "metal", "evaluation": true },
      { "branchName": "otherwise", "evaluation": false },
    ])
  );
  assert!(details.steps.contains_key("gold_step"));
  assert!(!details.steps.contains_key("metal_step"));
}

#[tokio::test]
async fn test_split_runs_all_matches_in_order() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let details = harness
    .run_flow(flow(split_step("EXECUTE_ALL_MATCH", "{{ trigger.tier }}")), json!({ "tier": "gold" }))
    .await;

  let output = details.steps["split_1"].output.clone().unwrap();
  assert_eq!(output["selectedBranches"], json!(["gold", "metal"]));
  assert!(details.steps.contains_key("gold_step"));
  assert!(details.steps.contains_key("metal_step"));
  assert!(!details.steps.contains_key("otherwise_step"));
  assert_eq!(details.tasks, 2);
}

#[tokio::test]
async fn test_split_falls_back() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let details = harness
    .run_flow(flow(split_step("EXECUTE_ALL_MATCH", "{{ trigger.tier }}")), json!({ "tier": "none" }))
    .await;

  let output = details.steps["split_1"].output.clone().unwrap();
  assert_eq!(output["selectedBranches"], json!(["otherwise"]));
  assert_eq!(
    details.steps["otherwise_step"].output,
    Some(json!({ "value": "otherwise" }))
  );
}

#[tokio::test]
async fn test_stop_ends_run_and_answers_webhook() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let details = harness
    .run(json!({
      "flowVersion": flow(chain(vec![
        gate_step("step_1", "stop"),
        gate_step("step_2", "never"),
      ])),
      "flowRunId": "run_1",
      "progressUpdateType": "WEBHOOK_RESPONSE",
      "workerHandlerId": "worker_1",
      "triggerPayload": {},
    }))
    .await;

  assert_eq!(details.status, FlowRunStatus::Stopped);
  assert_eq!(details.stop_response, Some(json!({ "stopped": true })));
  assert_eq!(details.steps["step_1"].status, StepStatus::Succeeded);
  assert!(!details.steps.contains_key("step_2"));

  let webhooks = harness.progress.webhooks();
  assert_eq!(webhooks.len(), 1);
  assert_eq!(webhooks[0].flow_run_id, "run_1");
  assert_eq!(webhooks[0].worker_handler_id.as_deref(), Some("worker_1"));
  assert_eq!(webhooks[0].response, json!({ "stopped": true }));
}

#[tokio::test(start_paused = true)]
async fn test_run_times_out() {
  let harness = TestEngine::new(TestOptions {
    code_sandbox: Some(Arc::new(FlakyCode::slow(Duration::from_secs(5), json!("slow")))),
    run_timeout: Some(Duration::from_secs(1)),
    ..TestOptions::default()
  })
  .await;
  let flow = flow(chain(vec![
    code_step("step_1", "return function() end", json!({})),
    code_step("step_2", "return function() end", json!({})),
  ]));

  let details = harness.run_flow(flow, json!({})).await;

  assert_eq!(details.status, FlowRunStatus::Timeout);
  assert!(details.error.is_some());
  assert_eq!(details.steps["step_1"].status, StepStatus::Succeeded);
  assert_eq!(details.steps["step_1"].output, Some(json!("slow")));
  assert!(!details.steps.contains_key("step_2"));

  let last = harness.progress.updates().pop().unwrap();
  assert_eq!(last.run_details.status, FlowRunStatus::Timeout);
  assert!(last.run_details.steps.contains_key("step_1"));
}

#[tokio::test]
async fn test_cancelled_run() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let cancel = CancellationToken::new();
  cancel.cancel();

  let response = harness
    .engine
    .execute_with_cancel(
      EngineOperationType::ExecuteFlow,
      json!({
        "flowVersion": flow(gate_step("step_1", "never")),
        "flowRunId": "run_1",
      }),
      cancel,
    )
    .await;

  assert!(response.is_ok());
  assert_eq!(response.response["status"], json!("CANCELLED"));
  assert!(response.response["steps"].get("step_1").is_none());
}
