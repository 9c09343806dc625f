mod common;

use common::*;
use conduit_blocks::builtin::{HTTP_BLOCK, STORE_BLOCK, WEBHOOK_BLOCK};
use conduit_engine::{EngineOperationType, EngineResponseStatus};
use conduit_host_kv::Store;
use serde_json::{Value, json};

fn webhook_flow() -> Value {
  json!({
    "id": "fv_1",
    "flowId": "flow_1",
    "trigger": {
      "name": "trigger",
      "type": "BLOCK",
      "settings": { "blockName": WEBHOOK_BLOCK, "triggerName": "catch_webhook" },
    }
  })
}

fn hook(hook_type: &str, body: Value) -> Value {
  json!({
    "hookType": hook_type,
    "flowVersion": webhook_flow(),
    "webhookUrl": "https://conduit.test/v1/webhooks/flow_1",
    "triggerPayload": { "body": body },
  })
}

#[tokio::test]
async fn test_extract_block_metadata() {
  let harness = TestEngine::new(TestOptions::default()).await;

  let response = harness
    .execute(
      EngineOperationType::ExtractBlockMetadata,
      json!({ "blockName": HTTP_BLOCK }),
    )
    .await;

  assert!(response.is_ok());
  assert_eq!(response.response["name"], json!(HTTP_BLOCK));
  assert_eq!(response.response["version"], json!("0.1.0"));
  assert!(response.response["actions"].get("send_request").is_some());
  assert!(response.response["auth"].is_object());
}

#[tokio::test]
async fn test_unknown_block_is_an_error() {
  let harness = TestEngine::new(TestOptions::default()).await;

  let response = harness
    .execute(
      EngineOperationType::ExtractBlockMetadata,
      json!({ "blockName": "@x/missing" }),
    )
    .await;

  assert_eq!(response.status, EngineResponseStatus::Error);
  assert_eq!(response.response, json!("block '@x/missing' not found"));
}

#[tokio::test]
async fn test_malformed_payload_is_an_error() {
  let harness = TestEngine::new(TestOptions::default()).await;

  let response = harness
    .execute(EngineOperationType::ExecuteFlow, json!({ "flowRunId": 3 }))
    .await;

  assert_eq!(response.status, EngineResponseStatus::Error);
  let message = response.response.as_str().unwrap();
  assert!(message.starts_with("invalid operation: malformed payload"), "{}", message);
}

#[tokio::test]
async fn test_validate_auth() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let validate = |auth: Value| json!({ "blockName": HTTP_BLOCK, "auth": auth });

  let response = harness
    .execute(EngineOperationType::ExecuteValidateAuth, validate(json!("  ")))
    .await;
  assert!(response.is_ok());
  assert_eq!(response.response["valid"], json!(false));
  assert!(response.response["error"].is_string());

  let response = harness
    .execute(EngineOperationType::ExecuteValidateAuth, validate(json!("tok_123")))
    .await;
  assert_eq!(response.response, json!({ "valid": true }));
}

#[tokio::test]
async fn test_property_options() {
  let harness = TestEngine::new(TestOptions::default()).await;

  let response = harness
    .execute(
      EngineOperationType::ExecuteProperty,
      json!({
        "blockName": HTTP_BLOCK,
        "actionOrTriggerName": "send_request",
        "propertyName": "method",
        "input": { "url": "{{ trigger.url }}" },
        "sampleData": { "trigger": { "url": "https://example.com" } },
      }),
    )
    .await;

  assert!(response.is_ok(), "{}", response.response);
  let options = response.response["options"].as_array().unwrap();
  assert_eq!(options.len(), 5);
  assert_eq!(options[0]["value"], json!("GET"));

  let response = harness
    .execute(
      EngineOperationType::ExecuteProperty,
      json!({
        "blockName": HTTP_BLOCK,
        "actionOrTriggerName": "send_request",
        "propertyName": "url",
      }),
    )
    .await;
  assert_eq!(response.status, EngineResponseStatus::Error);
}

#[tokio::test]
async fn test_webhook_trigger_hooks() {
  let harness = TestEngine::new(TestOptions::default()).await;

  let response = harness
    .execute(EngineOperationType::ExecuteTriggerHook, hook("TEST", Value::Null))
    .await;
  assert_eq!(response.response, json!({ "success": true, "output": [{}] }));

  let response = harness
    .execute(EngineOperationType::ExecuteTriggerHook, hook("RUN", json!({ "id": 7 })))
    .await;
  assert!(response.is_ok(), "{}", response.response);
  let event = response.response["output"][0].clone();
  assert_eq!(event["body"], json!({ "id": 7 }));

  let response = harness
    .execute(EngineOperationType::ExecuteTriggerHook, hook("TEST", Value::Null))
    .await;
  assert_eq!(response.response["output"], json!([event]));

  let response = harness
    .execute(EngineOperationType::ExecuteTriggerHook, hook("ON_DISABLE", Value::Null))
    .await;
  assert_eq!(response.response, json!({}));
  assert_eq!(harness.store.get("flow_flow_1/last_payload").await.unwrap(), None);
}

#[tokio::test]
async fn test_trigger_hook_requires_block_trigger() {
  let harness = TestEngine::new(TestOptions::default()).await;

  let response = harness
    .execute(
      EngineOperationType::ExecuteTriggerHook,
      json!({
        "hookType": "ON_ENABLE",
        "flowVersion": flow(Value::Null),
      }),
    )
    .await;

  assert_eq!(response.status, EngineResponseStatus::Error);
}

#[tokio::test]
async fn test_execute_step_uses_sample_data() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let flow = flow(chain(vec![
    gate_step("step_1", "first"),
    code_step(
      "step_2",
      "return function(inputs) return inputs.value .. '!' end",
      json!({ "value": "{{ step_1.value }}" }),
    ),
  ]));

  let response = harness
    .execute(
      EngineOperationType::ExecuteStep,
      json!({
        "flowVersion": flow,
        "stepName": "step_2",
        "sampleData": { "step_1": { "value": "sampled" } },
      }),
    )
    .await;

  assert!(response.is_ok(), "{}", response.response);
  assert_eq!(response.response["success"], json!(true));
  assert_eq!(response.response["input"], json!({ "value": "sampled" }));
  assert_eq!(response.response["output"], json!("sampled!"));
  assert!(harness.progress.updates().is_empty());
}

#[tokio::test]
async fn test_execute_step_reports_invalid_props() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let flow = flow(block_step("put_1", STORE_BLOCK, "put", json!({ "value": "v" })));

  let response = harness
    .execute(
      EngineOperationType::ExecuteStep,
      json!({ "flowVersion": flow, "stepName": "put_1" }),
    )
    .await;

  assert!(response.is_ok());
  assert_eq!(response.response["success"], json!(false));
  assert_eq!(
    response.response["errorMessage"],
    json!(r#"{"key":["expected value, but found none"]}"#)
  );
}

#[tokio::test]
async fn test_execute_step_on_loop_returns_first_item() {
  let harness = TestEngine::new(TestOptions::default()).await;
  let flow = flow(loop_step("loop_1", json!([4, 5]), gate_step("gate_1", "never")));

  let response = harness
    .execute(
      EngineOperationType::ExecuteStep,
      json!({ "flowVersion": flow, "stepName": "loop_1" }),
    )
    .await;

  assert_eq!(response.response["success"], json!(true));
  assert_eq!(response.response["output"], json!({ "item": 4, "index": 0 }));
}

#[tokio::test]
async fn test_execute_missing_step() {
  let harness = TestEngine::new(TestOptions::default()).await;

  let response = harness
    .execute(
      EngineOperationType::ExecuteStep,
      json!({ "flowVersion": flow(gate_step("step_1", "x")), "stepName": "nope" }),
    )
    .await;

  assert_eq!(response.status, EngineResponseStatus::Error);
  assert_eq!(response.response, json!("invalid operation: step 'nope' not found"));
}
