//! Structured policy parameters produced by the extraction stage.
//!
//! # Critical Invariants
//!
//! 1. `budget` is never negative
//! 2. `enforcement_level` always lies in [0, 1]
//!
//! Both are enforced by the constructor and setters. The fields are private,
//! and deserialization goes through the same setters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Rupees in one crore
pub const CRORE: f64 = 10_000_000.0;

/// Rupees in one lakh
pub const LAKH: f64 = 100_000.0;

/// Budget assumed when the policy text names no amount (10 crore)
pub const DEFAULT_BUDGET: f64 = 100_000_000.0;

/// Timeline assumed when the policy text names no duration
pub const DEFAULT_TIMELINE_DAYS: u32 = 90;

/// Enforcement assumed by deterministic extraction
pub const DEFAULT_ENFORCEMENT_LEVEL: f64 = 0.7;

/// Incentive structure keys
pub mod incentive {
    pub const TAX_REDUCTION_PERCENT: &str = "tax_reduction_percent";
    pub const SUBSIDY_INR: &str = "subsidy_inr";
    pub const TOLL_DISCOUNT_PERCENT: &str = "toll_discount_percent";
}

/// Infrastructure change keys
pub mod infrastructure {
    pub const NEW_LANES: &str = "new_lanes";
    pub const CHARGING_STATIONS: &str = "charging_stations";
    pub const BUS_ROUTES: &str = "bus_routes";
    pub const METRO_STATIONS: &str = "metro_stations";
}

/// Target region of a simulation request (state or union territory)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub state: String,
}

impl Region {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }

    /// Identifier used against the regional data provider
    pub fn id(&self) -> &str {
        &self.state
    }
}

/// Policy category, one of five fixed classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    Transportation,
    ElectricMobility,
    Environmental,
    Housing,
    Economic,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Transportation => "transportation",
            PolicyType::ElectricMobility => "electric_mobility",
            PolicyType::Environmental => "environmental",
            PolicyType::Housing => "housing",
            PolicyType::Economic => "economic",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured policy parameters
///
/// # Example
///
/// ```rust
/// use policy_simulator_core_rs::models::{PolicyParameters, PolicyType, Region};
///
/// let policy = PolicyParameters::new(PolicyType::Transportation, Region::new("Kerala"), -5.0, 90, 1.4)
///     .with_infrastructure("new_lanes", 2.0);
///
/// assert_eq!(policy.budget(), 0.0);
/// assert_eq!(policy.enforcement_level(), 1.0);
/// assert_eq!(policy.infrastructure("new_lanes"), 2.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPolicyParameters")]
pub struct PolicyParameters {
    pub policy_type: PolicyType,
    pub target_population: String,
    /// Budget in rupees
    budget: f64,
    pub implementation_timeline_days: u32,
    enforcement_level: f64,
    /// Named incentive → magnitude
    pub incentive_structure: BTreeMap<String, f64>,
    /// Named infrastructure change → count
    pub infrastructure_changes: BTreeMap<String, f64>,
    pub region: Region,
}

impl PolicyParameters {
    pub fn new(
        policy_type: PolicyType,
        region: Region,
        budget: f64,
        implementation_timeline_days: u32,
        enforcement_level: f64,
    ) -> Self {
        let mut policy = Self {
            policy_type,
            target_population: format!("{} residents", region.state),
            budget: 0.0,
            implementation_timeline_days,
            enforcement_level: 0.0,
            incentive_structure: BTreeMap::new(),
            infrastructure_changes: BTreeMap::new(),
            region,
        };
        policy.set_budget(budget);
        policy.set_enforcement_level(enforcement_level);
        policy
    }

    pub fn with_incentive(mut self, key: &str, magnitude: f64) -> Self {
        self.incentive_structure.insert(key.to_string(), magnitude);
        self
    }

    pub fn with_infrastructure(mut self, key: &str, count: f64) -> Self {
        self.infrastructure_changes.insert(key.to_string(), count);
        self
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    /// Set budget, clamping negatives (and NaN) to zero
    pub fn set_budget(&mut self, budget: f64) {
        self.budget = if budget.is_finite() { budget.max(0.0) } else { 0.0 };
    }

    pub fn enforcement_level(&self) -> f64 {
        self.enforcement_level
    }

    /// Set enforcement level, clamped into [0, 1]
    pub fn set_enforcement_level(&mut self, level: f64) {
        self.enforcement_level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    pub fn budget_in_lakhs(&self) -> f64 {
        self.budget / LAKH
    }

    pub fn budget_in_crores(&self) -> f64 {
        self.budget / CRORE
    }

    /// Incentive magnitude, zero when absent
    pub fn incentive(&self, key: &str) -> f64 {
        self.incentive_structure.get(key).copied().unwrap_or(0.0)
    }

    /// Infrastructure count, zero when absent
    pub fn infrastructure(&self, key: &str) -> f64 {
        self.infrastructure_changes.get(key).copied().unwrap_or(0.0)
    }
}

/// Wire shape of `PolicyParameters`, before the invariants are applied
#[derive(Deserialize)]
struct RawPolicyParameters {
    policy_type: PolicyType,
    target_population: String,
    budget: f64,
    implementation_timeline_days: u32,
    enforcement_level: f64,
    #[serde(default)]
    incentive_structure: BTreeMap<String, f64>,
    #[serde(default)]
    infrastructure_changes: BTreeMap<String, f64>,
    region: Region,
}

impl From<RawPolicyParameters> for PolicyParameters {
    fn from(raw: RawPolicyParameters) -> Self {
        let mut policy = PolicyParameters::new(
            raw.policy_type,
            raw.region,
            raw.budget,
            raw.implementation_timeline_days,
            raw.enforcement_level,
        );
        policy.target_population = raw.target_population;
        policy.incentive_structure = raw.incentive_structure;
        policy.infrastructure_changes = raw.infrastructure_changes;
        policy
    }
}

/// Language-model token accounting for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}
