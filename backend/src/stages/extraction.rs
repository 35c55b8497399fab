//! Extraction Stage
//!
//! Turns raw policy text into `PolicyParameters`.
//!
//! Two strategies:
//! - **Pattern extraction** (`PatternExtractor`): budget from currency
//!   patterns, category from keyword sets, infrastructure counts and timeline
//!   from explicit mentions, demo defaults for everything else.
//! - **Delegated extraction** (`ExtractionDelegate`): an external
//!   text-to-structure service. Its payload is validated before acceptance;
//!   any transport or schema failure falls back to pattern extraction.
//!
//! # Budget patterns (first match wins)
//!
//! | pattern | multiplier |
//! |---|---|
//! | `<n> crore` | 10,000,000 |
//! | `<n> lakh` | 100,000 |
//! | `₹<n>`, `Rs <n>`, `INR <n>` | 1 |
//!
//! No match → 100,000,000 (10 crore).

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::Stage;
use crate::config::ExtractionConfig;
use crate::models::policy::{
    incentive, infrastructure, CRORE, DEFAULT_BUDGET, DEFAULT_ENFORCEMENT_LEVEL,
    DEFAULT_TIMELINE_DAYS, LAKH,
};
use crate::models::{PolicyParameters, PolicyType, Region, SimulationContext, StageId, TokenUsage};
use crate::orchestrator::PipelineError;

// ============================================================================
// Patterns
// ============================================================================

static CRORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*crores?\b").unwrap());

static LAKH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*lakhs?\b").unwrap());

static RUPEE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:₹|\brs\.?|\binr)\s*(\d[\d,]*(?:\.\d+)?)").unwrap());

static LANES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s+(?:new\s+)?lanes?\b").unwrap());

static CHARGING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+(?:new\s+)?(?:ev\s+)?charging\s+(?:stations?|points?)\b").unwrap()
});

static BUS_ROUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s+(?:new\s+)?bus\s+routes?\b").unwrap());

static METRO_STATIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s+(?:new\s+)?metro\s+stations?\b").unwrap());

static TIMELINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)\s*(days?|months?|years?)\b").unwrap());

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").unwrap());

/// Keyword sets, checked in order; the first category with a hit wins
///
/// Matching is per word (see `classify`), not raw substring, so "development"
/// does not hit "ev" and "current" does not hit "rent".
const CATEGORY_KEYWORDS: [(PolicyType, &[&str]); 4] = [
    (
        PolicyType::Transportation,
        &["transport", "traffic", "congestion", "road", "metro", "bus"],
    ),
    (
        PolicyType::ElectricMobility,
        &["electric", "ev", "vehicle", "charging"],
    ),
    (
        PolicyType::Environmental,
        &["environment", "pollution", "air quality", "green"],
    ),
    (PolicyType::Housing, &["housing", "affordable", "rent"]),
];

// ============================================================================
// Pattern extraction
// ============================================================================

/// Deterministic text-to-parameters extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    /// Extract parameters; never fails
    ///
    /// # Example
    ///
    /// ```rust
    /// use policy_simulator_core_rs::models::{PolicyType, Region};
    /// use policy_simulator_core_rs::stages::PatternExtractor;
    ///
    /// let policy = PatternExtractor.extract(
    ///     "Add 4 new lanes with a ₹25 crore budget",
    ///     &Region::new("Karnataka"),
    /// );
    /// assert_eq!(policy.budget(), 250_000_000.0);
    /// assert_eq!(policy.infrastructure("new_lanes"), 4.0);
    /// assert_eq!(policy.policy_type, PolicyType::Economic);
    /// ```
    pub fn extract(&self, text: &str, region: &Region) -> PolicyParameters {
        let timeline = extract_timeline_days(text).unwrap_or(DEFAULT_TIMELINE_DAYS);
        let count = |re: &Regex, default: f64| extract_count(re, text).unwrap_or(default);

        PolicyParameters::new(
            classify(text),
            region.clone(),
            extract_budget(text),
            timeline,
            DEFAULT_ENFORCEMENT_LEVEL,
        )
        .with_incentive(incentive::TAX_REDUCTION_PERCENT, 15.0)
        .with_incentive(incentive::SUBSIDY_INR, 5000.0)
        .with_incentive(incentive::TOLL_DISCOUNT_PERCENT, 50.0)
        .with_infrastructure(infrastructure::NEW_LANES, count(&LANES_RE, 2.0))
        .with_infrastructure(infrastructure::CHARGING_STATIONS, count(&CHARGING_RE, 50.0))
        .with_infrastructure(infrastructure::BUS_ROUTES, count(&BUS_ROUTES_RE, 10.0))
        .with_infrastructure(infrastructure::METRO_STATIONS, count(&METRO_STATIONS_RE, 3.0))
    }
}

/// Budget in rupees named by the text, or the default budget
pub fn extract_budget(text: &str) -> f64 {
    let patterns: [(&Lazy<Regex>, f64); 3] =
        [(&CRORE_RE, CRORE), (&LAKH_RE, LAKH), (&RUPEE_RE, 1.0)];

    patterns
        .iter()
        .find_map(|(re, multiplier)| {
            re.captures(text)
                .and_then(|caps| parse_amount(&caps[1]))
                .map(|amount| amount * multiplier)
                .filter(|budget| budget.is_finite())
        })
        .unwrap_or(DEFAULT_BUDGET)
}

/// Policy category by keyword set
///
/// Keywords of three letters or fewer must match a whole word ("ev", "bus"),
/// longer keywords match a word prefix ("transport" → "transportation"), and
/// multi-word keywords match as phrases.
pub fn classify(text: &str) -> PolicyType {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let hit = |keyword: &str| -> bool {
        if keyword.contains(' ') {
            lower.contains(keyword)
        } else if keyword.len() <= 3 {
            words.iter().any(|w| *w == keyword)
        } else {
            words.iter().any(|w| w.starts_with(keyword))
        }
    };

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| hit(k)))
        .map(|(category, _)| *category)
        .unwrap_or(PolicyType::Economic)
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn extract_count(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text).and_then(|caps| caps[1].parse::<f64>().ok())
}

fn extract_timeline_days(text: &str) -> Option<u32> {
    let caps = TIMELINE_RE.captures(text)?;
    let n: u32 = caps[1].parse().ok()?;
    let unit = caps[2].to_lowercase();
    let days = if unit.starts_with("month") {
        n.checked_mul(30)?
    } else if unit.starts_with("year") {
        n.checked_mul(365)?
    } else {
        n
    };
    (days > 0).then_some(days)
}

// ============================================================================
// Delegated extraction
// ============================================================================

/// Delegate failure (recovered by falling back to pattern extraction)
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("delegate transport failed: {0}")]
    Transport(String),

    #[error("delegate returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("delegate response could not be decoded: {0}")]
    Decode(String),

    #[error("delegate payload rejected: {0}")]
    Schema(String),
}

/// Raw structured output of a delegate, not yet validated
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateResponse {
    pub payload: Value,
    pub usage: TokenUsage,
}

/// External text-to-structure function
#[async_trait]
pub trait ExtractionDelegate: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        region: &Region,
    ) -> Result<DelegateResponse, ExtractionError>;
}

/// Fields a delegate payload must carry
#[derive(Debug, Deserialize)]
struct DelegatedPolicy {
    policy_type: PolicyType,
    budget_allocation_inr: f64,
    #[serde(default)]
    implementation_timeline_days: Option<f64>,
    #[serde(default)]
    enforcement_level: Option<f64>,
    #[serde(default)]
    incentive_structure: BTreeMap<String, f64>,
    #[serde(default)]
    infrastructure_changes: BTreeMap<String, f64>,
}

/// Validate a delegate payload and build parameters from it
pub fn accept_payload(
    payload: Value,
    region: &Region,
) -> Result<PolicyParameters, ExtractionError> {
    let fields: DelegatedPolicy =
        serde_json::from_value(payload).map_err(|e| ExtractionError::Schema(e.to_string()))?;

    if !fields.budget_allocation_inr.is_finite() || fields.budget_allocation_inr < 0.0 {
        return Err(ExtractionError::Schema(format!(
            "budget_allocation_inr must be a non-negative number, got {}",
            fields.budget_allocation_inr
        )));
    }

    let timeline = match fields.implementation_timeline_days {
        None => DEFAULT_TIMELINE_DAYS,
        Some(days) if days.is_finite() && days >= 1.0 && days <= f64::from(u32::MAX) => {
            days.round() as u32
        }
        Some(days) => {
            return Err(ExtractionError::Schema(format!(
                "implementation_timeline_days out of range: {}",
                days
            )))
        }
    };

    let enforcement = match fields.enforcement_level {
        None => DEFAULT_ENFORCEMENT_LEVEL,
        Some(level) if level.is_finite() => level,
        Some(level) => {
            return Err(ExtractionError::Schema(format!(
                "enforcement_level is not a number: {}",
                level
            )))
        }
    };

    let mut policy = PolicyParameters::new(
        fields.policy_type,
        region.clone(),
        fields.budget_allocation_inr,
        timeline,
        enforcement,
    );
    check_magnitudes("incentive_structure", &fields.incentive_structure)?;
    check_magnitudes("infrastructure_changes", &fields.infrastructure_changes)?;

    policy.incentive_structure = fields.incentive_structure;
    policy.infrastructure_changes = fields.infrastructure_changes;
    Ok(policy)
}

/// Counts and incentive magnitudes must be finite and non-negative
fn check_magnitudes(field: &str, values: &BTreeMap<String, f64>) -> Result<(), ExtractionError> {
    match values.iter().find(|(_, v)| !v.is_finite() || **v < 0.0) {
        Some((key, value)) => Err(ExtractionError::Schema(format!(
            "{}.{} must be a non-negative number, got {}",
            field, key, value
        ))),
        None => Ok(()),
    }
}

/// OpenRouter-compatible chat-completions delegate
#[derive(Debug, Clone)]
pub struct OpenRouterDelegate {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenRouterDelegate {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ExtractionError::Transport("no api key configured".to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ExtractionError::Transport(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl ExtractionDelegate for OpenRouterDelegate {
    async fn extract(
        &self,
        text: &str,
        region: &Region,
    ) -> Result<DelegateResponse, ExtractionError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "Extract policy parameters for {}, India. Return JSON with: policy_type \
                         (one of transportation, electric_mobility, environmental, housing, economic), \
                         budget_allocation_inr (in ₹), implementation_timeline_days, enforcement_level \
                         (0-1), incentive_structure, infrastructure_changes. Use Indian Rupees (₹) for \
                         all amounts.",
                        region.state
                    ),
                },
                { "role": "user", "content": text },
            ],
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let val: Value = resp
            .json()
            .await
            .map_err(|e| ExtractionError::Decode(e.to_string()))?;
        parse_completion(&val)
    }
}

/// Pull the JSON payload and token usage out of a chat-completions body
pub fn parse_completion(val: &Value) -> Result<DelegateResponse, ExtractionError> {
    let content = val
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| ExtractionError::Decode("response has no message content".to_string()))?;

    let json_text = match CODE_FENCE_RE.captures(content) {
        Some(caps) => caps[1].to_string(),
        None => content.trim().to_string(),
    };
    let payload: Value =
        serde_json::from_str(&json_text).map_err(|e| ExtractionError::Decode(e.to_string()))?;

    let usage = val.get("usage");
    let count = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    };

    Ok(DelegateResponse {
        payload,
        usage: TokenUsage {
            input_tokens: count("prompt_tokens"),
            output_tokens: count("completion_tokens"),
            total_tokens: count("total_tokens"),
        },
    })
}

// ============================================================================
// Stage
// ============================================================================

/// Writes `structured_policy` and `token_usage`
pub struct ExtractionStage {
    delegate: Option<Arc<dyn ExtractionDelegate>>,
}

impl ExtractionStage {
    pub fn deterministic() -> Self {
        Self { delegate: None }
    }

    pub fn delegated(delegate: Arc<dyn ExtractionDelegate>) -> Self {
        Self {
            delegate: Some(delegate),
        }
    }

    async fn try_delegate(
        &self,
        delegate: &dyn ExtractionDelegate,
        text: &str,
        region: &Region,
    ) -> Result<(PolicyParameters, TokenUsage), ExtractionError> {
        let response = delegate.extract(text, region).await?;
        let policy = accept_payload(response.payload, region)?;
        Ok((policy, response.usage))
    }
}

#[async_trait]
impl Stage for ExtractionStage {
    fn id(&self) -> StageId {
        StageId::Extraction
    }

    async fn run(&self, ctx: &mut SimulationContext) -> Result<(), PipelineError> {
        let text = ctx.policy_input().to_string();
        let region = ctx.region().clone();

        let (policy, usage) = match &self.delegate {
            Some(delegate) => match self.try_delegate(delegate.as_ref(), &text, &region).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        request_id = %ctx.request_id,
                        error = %e,
                        "delegated extraction failed, falling back to pattern extraction"
                    );
                    (PatternExtractor.extract(&text, &region), TokenUsage::default())
                }
            },
            None => {
                debug!(request_id = %ctx.request_id, "pattern extraction");
                (PatternExtractor.extract(&text, &region), TokenUsage::default())
            }
        };

        info!(
            request_id = %ctx.request_id,
            stage = "extraction",
            policy_type = %policy.policy_type,
            budget = policy.budget(),
            total_tokens = usage.total_tokens,
            "extracted policy parameters"
        );
        ctx.set_structured_policy(policy, usage);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_suffixes() {
        assert_eq!(extract_budget("₹10 crore budget"), 100_000_000.0);
        assert_eq!(extract_budget("2.5 Crore for buses"), 25_000_000.0);
        assert_eq!(extract_budget("allocate 40 lakh"), 4_000_000.0);
        assert_eq!(extract_budget("₹5,000 crore metro"), 50_000_000_000.0);
    }

    #[test]
    fn test_overflowing_budget_uses_default() {
        let huge = format!("{} crore", "9".repeat(305));
        assert_eq!(extract_budget(&huge), DEFAULT_BUDGET);
        assert_eq!(PatternExtractor.extract(&huge, &Region::new("Goa")).budget(), DEFAULT_BUDGET);
    }

    #[test]
    fn test_bare_amount_needs_currency_marker() {
        assert_eq!(extract_budget("₹2,50,000 for repairs"), 250_000.0);
        assert_eq!(extract_budget("Rs. 75000 grant"), 75_000.0);
        assert_eq!(extract_budget("INR 1200"), 1200.0);
        assert_eq!(extract_budget("Add 3 buses"), DEFAULT_BUDGET);
    }

    #[test]
    fn test_classify_order_and_word_rules() {
        assert_eq!(classify("Reduce traffic on roads"), PolicyType::Transportation);
        assert_eq!(classify("EV subsidy scheme"), PolicyType::ElectricMobility);
        // "ev" must be a whole word
        assert_eq!(classify("Every citizen gets a rebate"), PolicyType::Economic);
        assert_eq!(classify("Skill development fund for artisans"), PolicyType::Economic);
        assert_eq!(classify("Improve air quality"), PolicyType::Environmental);
        assert_eq!(classify("Affordable housing"), PolicyType::Housing);
        // "rent" is not a prefix of "current"
        assert_eq!(classify("Revise the current tax slabs"), PolicyType::Economic);
        // transportation beats electric mobility
        assert_eq!(classify("Electric bus fleet"), PolicyType::Transportation);
    }

    #[test]
    fn test_text_overrides_defaults() {
        let policy = PatternExtractor.extract(
            "Open 5 new metro stations and 12 bus routes within 6 months",
            &Region::new("Delhi"),
        );
        assert_eq!(policy.infrastructure(infrastructure::METRO_STATIONS), 5.0);
        assert_eq!(policy.infrastructure(infrastructure::BUS_ROUTES), 12.0);
        assert_eq!(policy.infrastructure(infrastructure::NEW_LANES), 2.0);
        assert_eq!(policy.implementation_timeline_days, 180);
        assert_eq!(policy.target_population, "Delhi residents");
    }

    #[test]
    fn test_empty_text_uses_defaults() {
        let policy = PatternExtractor.extract("", &Region::new("Goa"));
        assert_eq!(policy.budget(), DEFAULT_BUDGET);
        assert_eq!(policy.policy_type, PolicyType::Economic);
        assert_eq!(policy.implementation_timeline_days, 90);
        assert_eq!(policy.enforcement_level(), 0.7);
        assert_eq!(policy.incentive(incentive::SUBSIDY_INR), 5000.0);
    }

    #[test]
    fn test_accept_payload_validates() {
        let region = Region::new("Kerala");
        let ok = serde_json::json!({
            "policy_type": "housing",
            "budget_allocation_inr": 5.0e7,
            "enforcement_level": 1.3,
            "infrastructure_changes": {"new_lanes": 1}
        });
        let policy = accept_payload(ok, &region).unwrap();
        assert_eq!(policy.policy_type, PolicyType::Housing);
        assert_eq!(policy.enforcement_level(), 1.0);
        assert_eq!(policy.implementation_timeline_days, 90);

        let negative = serde_json::json!({"policy_type": "housing", "budget_allocation_inr": -1.0});
        assert!(matches!(accept_payload(negative, &region), Err(ExtractionError::Schema(_))));

        let unknown = serde_json::json!({"policy_type": "space", "budget_allocation_inr": 1.0});
        assert!(accept_payload(unknown, &region).is_err());
    }

    #[test]
    fn test_accept_payload_rejects_negative_magnitudes() {
        let region = Region::new("Kerala");
        let negative_lanes = serde_json::json!({
            "policy_type": "transportation",
            "budget_allocation_inr": 1e8,
            "infrastructure_changes": {"new_lanes": -40, "metro_stations": 5}
        });
        assert!(matches!(
            accept_payload(negative_lanes, &region),
            Err(ExtractionError::Schema(_))
        ));

        let negative_subsidy = serde_json::json!({
            "policy_type": "transportation",
            "budget_allocation_inr": 1e8,
            "incentive_structure": {"subsidy_inr": -5000}
        });
        assert!(matches!(
            accept_payload(negative_subsidy, &region),
            Err(ExtractionError::Schema(_))
        ));

        let zero_counts = serde_json::json!({
            "policy_type": "transportation",
            "budget_allocation_inr": 1e8,
            "infrastructure_changes": {"new_lanes": 0}
        });
        assert!(accept_payload(zero_counts, &region).is_ok());
    }

    #[test]
    fn test_parse_completion_strips_fences_and_reads_usage() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "```json\n{\"policy_type\": \"economic\"}\n```"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        });
        let response = parse_completion(&body).unwrap();
        assert_eq!(response.payload["policy_type"], "economic");
        assert_eq!(response.usage.total_tokens, 150);
        assert_eq!(response.usage.input_tokens, 120);
    }
}
