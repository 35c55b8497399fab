//! Regional Data Provider
//!
//! Read-only lookups of demographic, traffic and economic baselines keyed by
//! region identifier. Stages reach the provider through the `lookup_*`
//! helpers, which turn provider failures into the documented degraded-data
//! branch instead of failing the stage.
//!
//! # Degraded data
//!
//! | lookup | on absence / failure |
//! |---|---|
//! | region baseline | `None` (stages use their fallback branch) |
//! | traffic baseline | `TrafficBaseline::default()` |
//! | economic indicators | `EconomicIndicators::default()` |

mod census;

pub use census::StaticRegionalData;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Provider failure (never surfaced past a stage)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("regional data unavailable: {0}")]
    Unavailable(String),

    #[error("malformed regional record for '{region}': {message}")]
    Malformed { region: String, message: String },
}

/// Demographic baseline of a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionBaseline {
    pub population: u64,
    pub vehicle_count: u64,
    pub area_sq_km: f64,
    /// Percent
    pub literacy_rate: f64,
    /// Rupees per month
    pub median_income: f64,
    /// Percent
    pub urban_percentage: f64,
    pub cities: Vec<String>,
    /// Geographic zone (North, South, ...)
    pub zone: Option<String>,
}

impl RegionBaseline {
    /// Reject records that would poison per-capita or density figures
    pub fn check(&self, region_id: &str) -> Result<(), ProviderError> {
        let malformed = |message: String| ProviderError::Malformed {
            region: region_id.to_string(),
            message,
        };
        if self.population == 0 {
            return Err(malformed("population is zero".to_string()));
        }
        if !(self.area_sq_km.is_finite() && self.area_sq_km > 0.0) {
            return Err(malformed(format!("area_sq_km must be positive, got {}", self.area_sq_km)));
        }
        if !(self.median_income.is_finite() && self.median_income >= 0.0) {
            return Err(malformed(format!(
                "median_income must be non-negative, got {}",
                self.median_income
            )));
        }
        for (name, pct) in [
            ("literacy_rate", self.literacy_rate),
            ("urban_percentage", self.urban_percentage),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                return Err(malformed(format!("{name} must be a percentage, got {pct}")));
            }
        }
        Ok(())
    }
}

/// Traffic baseline of a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficBaseline {
    /// Percent (traffic index)
    pub congestion_level: f64,
    pub avg_speed_kmph: f64,
    pub peak_hours: Vec<String>,
    /// Percent over free-flow travel time
    pub travel_time_increase: f64,
}

impl Default for TrafficBaseline {
    fn default() -> Self {
        Self {
            congestion_level: 45.0,
            avg_speed_kmph: 35.0,
            peak_hours: vec!["08:00-10:00".to_string(), "18:00-20:00".to_string()],
            travel_time_increase: 160.0,
        }
    }
}

/// National economic indicators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicIndicators {
    /// Percent
    pub inflation_rate: f64,
    /// Percent
    pub gdp_growth: f64,
    pub fuel_price_per_liter: f64,
    pub electricity_cost_per_unit: f64,
}

impl Default for EconomicIndicators {
    fn default() -> Self {
        Self {
            inflation_rate: 5.2,
            gdp_growth: 7.3,
            fuel_price_per_liter: 105.0,
            electricity_cost_per_unit: 8.5,
        }
    }
}

/// Read-only source of regional baselines
#[async_trait]
pub trait RegionalDataProvider: Send + Sync {
    /// Demographic baseline, `Ok(None)` for an unknown region
    async fn region_baseline(&self, region_id: &str)
        -> Result<Option<RegionBaseline>, ProviderError>;

    /// Traffic baseline, a default record for an unknown region
    async fn traffic_baseline(&self, region_id: &str) -> Result<TrafficBaseline, ProviderError>;

    async fn economic_indicators(&self) -> Result<EconomicIndicators, ProviderError>;
}

/// Region baseline, treating provider failure as absence
pub async fn lookup_baseline(
    provider: &dyn RegionalDataProvider,
    region_id: &str,
) -> Option<RegionBaseline> {
    let result = provider
        .region_baseline(region_id)
        .await
        .and_then(|baseline| match baseline {
            Some(b) => b.check(region_id).map(|()| Some(b)),
            None => Ok(None),
        });
    match result {
        Ok(baseline) => baseline,
        Err(e) => {
            warn!(
                region = region_id,
                error = %e,
                "region baseline lookup failed, using degraded branch"
            );
            None
        }
    }
}

/// Traffic baseline, defaulting on provider failure
pub async fn lookup_traffic(
    provider: &dyn RegionalDataProvider,
    region_id: &str,
) -> TrafficBaseline {
    match provider.traffic_baseline(region_id).await {
        Ok(traffic) => traffic,
        Err(e) => {
            warn!(region = region_id, error = %e, "traffic lookup failed, using default baseline");
            TrafficBaseline::default()
        }
    }
}

/// Economic indicators, defaulting on provider failure
pub async fn lookup_economics(provider: &dyn RegionalDataProvider) -> EconomicIndicators {
    match provider.economic_indicators().await {
        Ok(indicators) => indicators,
        Err(e) => {
            warn!(error = %e, "economic indicator lookup failed, using defaults");
            EconomicIndicators::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenProvider;

    #[async_trait]
    impl RegionalDataProvider for BrokenProvider {
        async fn region_baseline(
            &self,
            _region_id: &str,
        ) -> Result<Option<RegionBaseline>, ProviderError> {
            Err(ProviderError::Unavailable("offline".to_string()))
        }

        async fn traffic_baseline(
            &self,
            _region_id: &str,
        ) -> Result<TrafficBaseline, ProviderError> {
            Err(ProviderError::Unavailable("offline".to_string()))
        }

        async fn economic_indicators(&self) -> Result<EconomicIndicators, ProviderError> {
            Err(ProviderError::Unavailable("offline".to_string()))
        }
    }

    struct SkewedProvider(RegionBaseline);

    #[async_trait]
    impl RegionalDataProvider for SkewedProvider {
        async fn region_baseline(
            &self,
            _region_id: &str,
        ) -> Result<Option<RegionBaseline>, ProviderError> {
            Ok(Some(self.0.clone()))
        }

        async fn traffic_baseline(
            &self,
            _region_id: &str,
        ) -> Result<TrafficBaseline, ProviderError> {
            Ok(TrafficBaseline::default())
        }

        async fn economic_indicators(&self) -> Result<EconomicIndicators, ProviderError> {
            Ok(EconomicIndicators::default())
        }
    }

    fn sample_baseline() -> RegionBaseline {
        RegionBaseline {
            population: 1_000_000,
            vehicle_count: 200_000,
            area_sq_km: 500.0,
            literacy_rate: 80.0,
            median_income: 20_000.0,
            urban_percentage: 40.0,
            cities: vec!["Panaji".to_string()],
            zone: Some("West".to_string()),
        }
    }

    #[test]
    fn test_check_flags_malformed_records() {
        assert!(sample_baseline().check("Goa").is_ok());

        let mut empty = sample_baseline();
        empty.population = 0;
        assert!(matches!(
            empty.check("Goa"),
            Err(ProviderError::Malformed { ref region, .. }) if region == "Goa"
        ));

        let mut no_area = sample_baseline();
        no_area.area_sq_km = 0.0;
        assert!(no_area.check("Goa").is_err());

        let mut bad_pct = sample_baseline();
        bad_pct.literacy_rate = 140.0;
        assert!(bad_pct.check("Goa").is_err());

        let mut nan_income = sample_baseline();
        nan_income.median_income = f64::NAN;
        assert!(nan_income.check("Goa").is_err());
    }

    #[tokio::test]
    async fn test_malformed_baseline_takes_degraded_branch() {
        let good = SkewedProvider(sample_baseline());
        assert_eq!(lookup_baseline(&good, "Goa").await, Some(sample_baseline()));

        let mut broken = sample_baseline();
        broken.area_sq_km = -3.0;
        let provider = SkewedProvider(broken);
        assert!(lookup_baseline(&provider, "Goa").await.is_none());
    }

    #[tokio::test]
    async fn test_failures_degrade_to_defaults() {
        let provider = BrokenProvider;
        assert!(lookup_baseline(&provider, "Goa").await.is_none());
        assert_eq!(lookup_traffic(&provider, "Goa").await, TrafficBaseline::default());
        assert_eq!(lookup_economics(&provider).await, EconomicIndicators::default());
    }
}
