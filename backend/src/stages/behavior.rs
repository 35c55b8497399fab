//! Behavior Stage
//!
//! Predicts citizen response with the `behavior_recurrent` artifact.
//!
//! # Feature vector (10)
//!
//! | # | feature |
//! |---|---|
//! | 0 | budget / 1,000,000 |
//! | 1 | timeline days / 365 |
//! | 2 | enforcement level |
//! | 3 | tax reduction percent / 100 |
//! | 4 | subsidy rupees / 1,000 |
//! | 5 | new lanes |
//! | 6 | charging stations / 100 |
//! | 7 | literacy rate / 100 (0.7 without a baseline) |
//! | 8 | median income / 50,000 (0.7 without a baseline) |
//! | 9 | urban percentage / 100 (0.7 without a baseline) |
//!
//! With a regional baseline, adaptation, compliance and satisfaction are then
//! blended toward 1.0 by literacy, income (capped at 1) and urbanisation:
//! `raw * (0.7 + 0.3 * factor)`. All four outputs are finally clamped.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::Stage;
use crate::artifacts::{ArtifactCache, BEHAVIOR_RECURRENT};
use crate::models::policy::{incentive, infrastructure};
use crate::models::{BehaviorIndicators, PolicyParameters, SimulationContext, StageId};
use crate::orchestrator::PipelineError;
use crate::region::{lookup_baseline, RegionBaseline, RegionalDataProvider};

/// Regional factor used when no baseline exists
const DEFAULT_REGIONAL_FACTOR: f64 = 0.7;

/// Monthly income treated as fully able to absorb policy costs
const REFERENCE_INCOME: f64 = 50_000.0;

pub fn behavior_features(policy: &PolicyParameters, baseline: Option<&RegionBaseline>) -> [f64; 10] {
    let (literacy, income, urban) = match baseline {
        Some(b) => (
            b.literacy_rate / 100.0,
            b.median_income / REFERENCE_INCOME,
            b.urban_percentage / 100.0,
        ),
        None => (
            DEFAULT_REGIONAL_FACTOR,
            DEFAULT_REGIONAL_FACTOR,
            DEFAULT_REGIONAL_FACTOR,
        ),
    };

    [
        policy.budget() / 1e6,
        f64::from(policy.implementation_timeline_days) / 365.0,
        policy.enforcement_level(),
        policy.incentive(incentive::TAX_REDUCTION_PERCENT) / 100.0,
        policy.incentive(incentive::SUBSIDY_INR) / 1000.0,
        policy.infrastructure(infrastructure::NEW_LANES),
        policy.infrastructure(infrastructure::CHARGING_STATIONS) / 100.0,
        literacy,
        income,
        urban,
    ]
}

/// Blend raw predictions by regional factors and clamp into range
pub fn adjust_for_region(raw: [f64; 4], baseline: Option<&RegionBaseline>) -> BehaviorIndicators {
    let mut adjusted = raw;
    if let Some(b) = baseline {
        let literacy = b.literacy_rate / 100.0;
        let income = (b.median_income / REFERENCE_INCOME).min(1.0);
        let urban = b.urban_percentage / 100.0;

        adjusted[0] *= 0.7 + 0.3 * literacy;
        adjusted[1] *= 0.7 + 0.3 * income;
        adjusted[2] *= 0.7 + 0.3 * urban;
    }
    BehaviorIndicators::clamped(adjusted)
}

/// Writes `behavior_output`
pub struct BehaviorStage {
    cache: Arc<ArtifactCache>,
    provider: Arc<dyn RegionalDataProvider>,
}

impl BehaviorStage {
    pub fn new(cache: Arc<ArtifactCache>, provider: Arc<dyn RegionalDataProvider>) -> Self {
        Self { cache, provider }
    }
}

#[async_trait]
impl Stage for BehaviorStage {
    fn id(&self) -> StageId {
        StageId::Behavior
    }

    async fn run(&self, ctx: &mut SimulationContext) -> Result<(), PipelineError> {
        let policy = ctx.require_structured_policy(StageId::Behavior)?.clone();
        let baseline = lookup_baseline(self.provider.as_ref(), policy.region.id()).await;
        let artifact = self.cache.get_or_load(&BEHAVIOR_RECURRENT).await;

        let features = behavior_features(&policy, baseline.as_ref());
        let out = artifact.predict(&features);
        let raw = [
            out.first().copied().unwrap_or(f64::NAN),
            out.get(1).copied().unwrap_or(f64::NAN),
            out.get(2).copied().unwrap_or(f64::NAN),
            out.get(3).copied().unwrap_or(f64::NAN),
        ];
        let behavior = adjust_for_region(raw, baseline.as_ref());

        info!(
            request_id = %ctx.request_id,
            stage = "behavior",
            region = policy.region.id(),
            adaptation = behavior.adaptation_rate,
            compliance = behavior.compliance_probability,
            satisfaction = behavior.satisfaction_score,
            "predicted behavior"
        );
        ctx.set_behavior_output(behavior);
        Ok(())
    }
}
