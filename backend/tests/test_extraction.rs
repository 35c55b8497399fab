//! Extraction: pattern rules, delegate acceptance, fallback on delegate failure

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use policy_simulator_core_rs::models::policy::{DEFAULT_BUDGET, DEFAULT_TIMELINE_DAYS};
use policy_simulator_core_rs::models::{PolicyType, Region, SimulationContext, TokenUsage};
use policy_simulator_core_rs::stages::extraction::{accept_payload, parse_completion};
use policy_simulator_core_rs::stages::{
    DelegateResponse, ExtractionDelegate, ExtractionError, ExtractionStage, PatternExtractor, Stage,
};

struct ScriptedDelegate {
    response: Result<Value, String>,
    calls: AtomicUsize,
}

impl ScriptedDelegate {
    fn ok(payload: Value) -> Self {
        Self {
            response: Ok(payload),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ExtractionDelegate for ScriptedDelegate {
    async fn extract(
        &self,
        _text: &str,
        _region: &Region,
    ) -> Result<DelegateResponse, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Ok(payload) => Ok(DelegateResponse {
                payload: payload.clone(),
                usage: TokenUsage {
                    input_tokens: 120,
                    output_tokens: 40,
                    total_tokens: 160,
                },
            }),
            Err(message) => Err(ExtractionError::Transport(message.clone())),
        }
    }
}

fn context(text: &str) -> SimulationContext {
    SimulationContext::new(text.to_string(), Region::new("Karnataka"), false)
}

#[test]
fn test_empty_text_gets_demo_defaults() {
    let policy = PatternExtractor.extract("", &Region::new("Goa"));
    assert_eq!(policy.budget(), DEFAULT_BUDGET);
    assert_eq!(policy.policy_type, PolicyType::Economic);
    assert_eq!(policy.implementation_timeline_days, DEFAULT_TIMELINE_DAYS);
    assert_eq!(policy.enforcement_level(), 0.7);
    assert_eq!(policy.infrastructure("new_lanes"), 2.0);
    assert_eq!(policy.infrastructure("charging_stations"), 50.0);
    assert_eq!(policy.infrastructure("bus_routes"), 10.0);
    assert_eq!(policy.infrastructure("metro_stations"), 3.0);
    assert_eq!(policy.incentive("tax_reduction_percent"), 15.0);
    assert_eq!(policy.incentive("subsidy_inr"), 5000.0);
    assert_eq!(policy.incentive("toll_discount_percent"), 50.0);
    assert_eq!(policy.region, Region::new("Goa"));
}

#[test]
fn test_counts_and_timeline_read_from_text() {
    let policy = PatternExtractor.extract(
        "Build 6 new lanes, 120 EV charging stations and 4 metro stations within 18 months for ₹40 lakh",
        &Region::new("Delhi"),
    );
    assert_eq!(policy.infrastructure("new_lanes"), 6.0);
    assert_eq!(policy.infrastructure("charging_stations"), 120.0);
    assert_eq!(policy.infrastructure("metro_stations"), 4.0);
    assert_eq!(policy.infrastructure("bus_routes"), 10.0);
    assert_eq!(policy.implementation_timeline_days, 540);
    assert_eq!(policy.budget(), 4_000_000.0);
    assert_eq!(policy.policy_type, PolicyType::Transportation);
}

#[test]
fn test_crore_wins_over_lakh() {
    let policy = PatternExtractor.extract("₹3 crore now and 50 lakh later", &Region::new("Goa"));
    assert_eq!(policy.budget(), 30_000_000.0);
}

#[test]
fn test_accept_payload_rejects_bad_schema() {
    let region = Region::new("Kerala");
    let unknown_type = json!({ "policy_type": "space_program", "budget_allocation_inr": 10.0 });
    assert!(matches!(
        accept_payload(unknown_type, &region),
        Err(ExtractionError::Schema(_))
    ));

    let negative = json!({ "policy_type": "housing", "budget_allocation_inr": -1.0 });
    assert!(accept_payload(negative, &region).is_err());

    let zero_days = json!({
        "policy_type": "housing",
        "budget_allocation_inr": 1.0,
        "implementation_timeline_days": 0
    });
    assert!(accept_payload(zero_days, &region).is_err());

    let negative_counts = json!({
        "policy_type": "transportation",
        "budget_allocation_inr": 1e8,
        "incentive_structure": { "subsidy_inr": -5000 },
        "infrastructure_changes": { "new_lanes": -40, "metro_stations": 5 }
    });
    assert!(matches!(
        accept_payload(negative_counts, &region),
        Err(ExtractionError::Schema(_))
    ));
}

#[test]
fn test_parse_completion_strips_code_fence() {
    let body = json!({
        "choices": [{ "message": { "content": "```json\n{\"policy_type\": \"economic\", \"budget_allocation_inr\": 5}\n```" } }],
        "usage": { "prompt_tokens": 11, "completion_tokens": 7, "total_tokens": 18 }
    });
    let response = parse_completion(&body).unwrap();
    assert_eq!(response.payload["policy_type"], "economic");
    assert_eq!(response.usage.total_tokens, 18);

    let empty = json!({ "choices": [] });
    assert!(matches!(parse_completion(&empty), Err(ExtractionError::Decode(_))));
}

#[tokio::test]
async fn test_delegate_result_is_used_with_token_usage() {
    let delegate = Arc::new(ScriptedDelegate::ok(json!({
        "policy_type": "electric_mobility",
        "budget_allocation_inr": 2.5e8,
        "implementation_timeline_days": 180,
        "enforcement_level": 0.6,
        "infrastructure_changes": { "charging_stations": 300 }
    })));
    let stage = ExtractionStage::delegated(delegate.clone());
    let mut ctx = context("Subsidise electric two-wheelers");

    stage.run(&mut ctx).await.unwrap();

    let policy = ctx.structured_policy().unwrap();
    assert_eq!(policy.policy_type, PolicyType::ElectricMobility);
    assert_eq!(policy.budget(), 2.5e8);
    assert_eq!(policy.implementation_timeline_days, 180);
    assert_eq!(policy.infrastructure("charging_stations"), 300.0);
    assert_eq!(ctx.token_usage.unwrap().total_tokens, 160);
    assert_eq!(delegate.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_delegate_failure_falls_back_to_patterns() {
    let delegate = Arc::new(ScriptedDelegate::failing("connection refused"));
    let stage = ExtractionStage::delegated(delegate.clone());
    let mut ctx = context("Add 3 new lanes with ₹12 crore");

    stage.run(&mut ctx).await.unwrap();

    let policy = ctx.structured_policy().unwrap();
    assert_eq!(policy.budget(), 120_000_000.0);
    assert_eq!(policy.infrastructure("new_lanes"), 3.0);
    assert_eq!(ctx.token_usage, Some(TokenUsage::default()));
    assert_eq!(delegate.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_negative_delegate_counts_fall_back_to_patterns() {
    let delegate = Arc::new(ScriptedDelegate::ok(json!({
        "policy_type": "transportation",
        "budget_allocation_inr": 1e8,
        "infrastructure_changes": { "new_lanes": -40 }
    })));
    let stage = ExtractionStage::delegated(delegate);
    let mut ctx = context("Add 4 lanes");

    stage.run(&mut ctx).await.unwrap();

    let policy = ctx.structured_policy().unwrap();
    assert_eq!(policy.infrastructure("new_lanes"), 4.0);
    assert!(policy.infrastructure_changes.values().all(|v| *v >= 0.0));
    assert_eq!(ctx.token_usage, Some(TokenUsage::default()));
}

#[tokio::test]
async fn test_invalid_delegate_payload_falls_back_to_patterns() {
    let delegate = Arc::new(ScriptedDelegate::ok(json!({ "budget_allocation_inr": "lots" })));
    let stage = ExtractionStage::delegated(delegate);
    let mut ctx = context("Affordable rent scheme");

    stage.run(&mut ctx).await.unwrap();

    let policy = ctx.structured_policy().unwrap();
    assert_eq!(policy.policy_type, PolicyType::Housing);
    assert_eq!(policy.budget(), DEFAULT_BUDGET);
}
