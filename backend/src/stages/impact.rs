//! Impact Stage
//!
//! Macro-level forecast from the simulation metrics.
//!
//! # Override policy
//!
//! The four boosted-tree ensembles are evaluated on an 8-feature vector, but
//! their outputs are advisory only:
//!
//! | indicator | authoritative source | ensemble output used for |
//! |---|---|---|
//! | congestion_score | simulation `congestion_score` | interval centre |
//! | dissatisfaction_index | simulation `dissatisfaction_index` | interval centre |
//! | energy_stress | simulation `energy_load` | interval centre |
//! | inflation_rate | regional economic indicators / 100 | interval centre |
//!
//! Every interval is `[prediction − 0.05, prediction + 0.05]`.
//!
//! # Feature vector (8)
//!
//! congestion, energy, dissatisfaction, economic stability, budget / 1e6,
//! enforcement, timeline days / 365, number of infrastructure stress
//! sub-indicators.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::Stage;
use crate::artifacts::{
    ArtifactCache, ArtifactSpec, IMPACT_CONGESTION, IMPACT_DISSATISFACTION, IMPACT_ENERGY,
    IMPACT_INFLATION,
};
use crate::models::{
    ImpactIndicators, PolicyParameters, SimulationContext, SimulationMetrics, StageId,
};
use crate::orchestrator::PipelineError;
use crate::region::{
    lookup_baseline, lookup_economics, lookup_traffic, EconomicIndicators, RegionalDataProvider,
    TrafficBaseline,
};

/// Half-width of every confidence interval
pub const CONFIDENCE_HALF_WIDTH: f64 = 0.05;

/// Indicator key → ensemble
const ENSEMBLES: [(&str, ArtifactSpec); 4] = [
    ("congestion", IMPACT_CONGESTION),
    ("inflation", IMPACT_INFLATION),
    ("dissatisfaction", IMPACT_DISSATISFACTION),
    ("energy", IMPACT_ENERGY),
];

pub fn impact_features(metrics: &SimulationMetrics, policy: &PolicyParameters) -> [f64; 8] {
    [
        metrics.congestion_score,
        metrics.energy_load,
        metrics.dissatisfaction_index,
        metrics.economic_stability,
        policy.budget() / 1e6,
        policy.enforcement_level(),
        f64::from(policy.implementation_timeline_days) / 365.0,
        metrics.infrastructure_stress.indicator_count() as f64,
    ]
}

/// Combine advisory predictions with the authoritative values
pub fn apply_overrides(
    metrics: &SimulationMetrics,
    advisory: BTreeMap<String, f64>,
    traffic: &TrafficBaseline,
    economics: &EconomicIndicators,
    real_data_used: bool,
) -> ImpactIndicators {
    let confidence_intervals = advisory
        .iter()
        .map(|(key, pred)| {
            (
                key.clone(),
                [pred - CONFIDENCE_HALF_WIDTH, pred + CONFIDENCE_HALF_WIDTH],
            )
        })
        .collect();

    ImpactIndicators {
        congestion_score: metrics.congestion_score,
        inflation_rate: economics.inflation_rate / 100.0,
        dissatisfaction_index: metrics.dissatisfaction_index,
        energy_stress: metrics.energy_load,
        confidence_intervals,
        baseline_congestion: traffic.congestion_level / 100.0,
        advisory_predictions: advisory,
        real_data_used,
    }
}

/// Writes `impact_predictions`
pub struct ImpactStage {
    cache: Arc<ArtifactCache>,
    provider: Arc<dyn RegionalDataProvider>,
}

impl ImpactStage {
    pub fn new(cache: Arc<ArtifactCache>, provider: Arc<dyn RegionalDataProvider>) -> Self {
        Self { cache, provider }
    }
}

#[async_trait]
impl Stage for ImpactStage {
    fn id(&self) -> StageId {
        StageId::Impact
    }

    async fn run(&self, ctx: &mut SimulationContext) -> Result<(), PipelineError> {
        let policy = ctx.require_structured_policy(StageId::Impact)?.clone();
        let metrics = ctx.require_simulation_metrics(StageId::Impact)?.clone();

        let region_id = policy.region.id();
        let real_data_used = lookup_baseline(self.provider.as_ref(), region_id)
            .await
            .is_some();
        let traffic = lookup_traffic(self.provider.as_ref(), region_id).await;
        let economics = lookup_economics(self.provider.as_ref()).await;

        let features = impact_features(&metrics, &policy);
        let mut advisory = BTreeMap::new();
        for (key, spec) in &ENSEMBLES {
            let artifact = self.cache.get_or_load(spec).await;
            advisory.insert(key.to_string(), artifact.predict_scalar(&features));
        }

        let impact = apply_overrides(&metrics, advisory, &traffic, &economics, real_data_used);
        info!(
            request_id = %ctx.request_id,
            stage = "impact",
            region = region_id,
            inflation = impact.inflation_rate,
            baseline_congestion = impact.baseline_congestion,
            real_data_used,
            "impact forecast complete"
        );
        ctx.set_impact_predictions(impact);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PolicyType, Region};

    #[test]
    fn test_overrides_ignore_advisory_values() {
        let metrics = SimulationMetrics::fallback();
        let advisory: BTreeMap<String, f64> = [
            ("congestion".to_string(), 0.91),
            ("inflation".to_string(), 0.12),
            ("dissatisfaction".to_string(), 0.77),
            ("energy".to_string(), 0.05),
        ]
        .into_iter()
        .collect();

        let impact = apply_overrides(
            &metrics,
            advisory,
            &TrafficBaseline::default(),
            &EconomicIndicators::default(),
            false,
        );

        assert_eq!(impact.congestion_score, 0.5);
        assert_eq!(impact.dissatisfaction_index, 0.3);
        assert_eq!(impact.energy_stress, 0.4);
        assert!((impact.inflation_rate - 0.052).abs() < 1e-12);
        assert_eq!(impact.baseline_congestion, 0.45);
        assert_eq!(impact.confidence_intervals["congestion"], [0.91 - 0.05, 0.91 + 0.05]);
        assert_eq!(impact.advisory_predictions["congestion"], 0.91);
    }

    #[test]
    fn test_feature_vector_counts_stress_indicators() {
        let policy = PolicyParameters::new(PolicyType::Economic, Region::new("X"), 5e6, 73, 0.4);
        let f = impact_features(&SimulationMetrics::fallback(), &policy);
        assert_eq!(f, [0.5, 0.4, 0.3, 0.7, 5.0, 0.4, 0.2, 1.0]);
    }
}
