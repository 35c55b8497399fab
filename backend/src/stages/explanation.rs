//! Explanation Stage
//!
//! Assembles the terminal report: a static attribution table ranked into
//! feature importance, a sectioned narrative interpolating live values, and
//! a templated list of recommendations.
//!
//! # Narrative sections
//!
//! | section | shown when |
//! |---|---|
//! | header, policy overview | always |
//! | state profile | region baseline known |
//! | traffic status | region baseline known |
//! | economic indicators | always |
//! | predicted impact | always (traffic projection only when measured) |
//! | optimization insights | optimization ran |
//! | key drivers, risk assessment, data sources | always |

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::Stage;
use crate::models::policy::CRORE;
use crate::models::{
    ExplanationReport, FeatureWeight, ImpactIndicators, InfrastructureStress, OptimizationOutcome,
    PolicyParameters, Priority, Recommendation, SimulationContext, SimulationMetrics, StageId,
};
use crate::orchestrator::PipelineError;
use crate::region::{
    lookup_baseline, lookup_economics, lookup_traffic, EconomicIndicators, RegionBaseline,
    RegionalDataProvider, TrafficBaseline,
};

/// Static attribution weights, not derived from the run
pub const ATTRIBUTIONS: [(&str, f64); 6] = [
    ("budget", 0.25),
    ("enforcement", 0.18),
    ("timeline", 0.12),
    ("tax_reduction", 0.22),
    ("subsidy", 0.15),
    ("infrastructure", 0.08),
];

/// Improvement above which the optimization recommendation is emitted
pub const OPTIMIZATION_RECOMMENDATION_THRESHOLD: f64 = 10.0;

const RULE_WIDTH: usize = 80;

// ============================================================================
// Attributions
// ============================================================================

pub fn attributions() -> BTreeMap<String, f64> {
    ATTRIBUTIONS
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

/// Attributions ordered by descending magnitude
pub fn rank_features(attributions: &BTreeMap<String, f64>) -> Vec<FeatureWeight> {
    let mut ranked: Vec<FeatureWeight> = attributions
        .iter()
        .map(|(feature, weight)| FeatureWeight {
            feature: feature.clone(),
            weight: *weight,
        })
        .collect();
    ranked.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));
    ranked
}

// ============================================================================
// Narrative
// ============================================================================

/// Everything the narrative interpolates
pub struct NarrativeInputs<'a> {
    pub policy: &'a PolicyParameters,
    pub metrics: &'a SimulationMetrics,
    pub impact: &'a ImpactIndicators,
    pub optimization: Option<&'a OptimizationOutcome>,
    pub baseline: Option<&'a RegionBaseline>,
    pub traffic: &'a TrafficBaseline,
    pub economics: &'a EconomicIndicators,
}

struct Report {
    lines: Vec<String>,
}

impl Report {
    fn new() -> Self {
        Self { lines: Vec::new() }
    }

    fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    fn section(&mut self, title: &str) {
        self.line(title);
        self.line("-".repeat(RULE_WIDTH));
    }

    fn finish(self) -> String {
        self.lines.join("\n")
    }
}

/// Traffic severity tier for a congestion index (percent)
pub fn severity(congestion_level: f64) -> &'static str {
    if congestion_level > 70.0 {
        "CRITICAL - Severe congestion requiring immediate intervention"
    } else if congestion_level > 60.0 {
        "HIGH - Significant congestion impacting daily commute"
    } else if congestion_level > 50.0 {
        "MODERATE - Noticeable delays during peak hours"
    } else {
        "LOW - Manageable traffic flow"
    }
}

/// Threshold-triggered risk bullets
pub fn risk_flags(
    policy: &PolicyParameters,
    baseline: Option<&RegionBaseline>,
    traffic: &TrafficBaseline,
) -> Vec<&'static str> {
    let mut risks = Vec::new();
    if policy.budget() < CRORE {
        risks.push("LOW BUDGET: May limit policy effectiveness and reach");
    }
    if policy.implementation_timeline_days < 60 {
        risks.push("RAPID IMPLEMENTATION: Short timeline may cause implementation challenges");
    }
    if let Some(b) = baseline {
        if traffic.congestion_level > 70.0 {
            risks.push("HIGH CONGESTION: Severe traffic requires aggressive intervention");
        }
        if b.literacy_rate < 70.0 {
            risks.push("LITERACY CONCERNS: Lower literacy may affect policy awareness");
        }
    }
    risks
}

/// Round to a whole number and group thousands with commas
///
/// ```rust
/// use policy_simulator_core_rs::stages::explanation::group_thousands;
///
/// assert_eq!(group_thousands(100_000_000.0), "100,000,000");
/// assert_eq!(group_thousands(-1234.6), "-1,235");
/// assert_eq!(group_thousands(999.0), "999");
/// ```
pub fn group_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

pub fn build_narrative(inputs: &NarrativeInputs<'_>) -> String {
    let policy = inputs.policy;
    let location = policy.region.state.as_str();
    let mut r = Report::new();

    r.line("=".repeat(RULE_WIDTH));
    r.line(format!("POLICY ANALYSIS REPORT: {}", location.to_uppercase()));
    r.line("=".repeat(RULE_WIDTH));
    r.blank();

    r.section("POLICY OVERVIEW");
    r.line(format!("Policy Type: {}", policy.policy_type.as_str().to_uppercase()));
    r.line(format!("Target Population: {}", policy.target_population));
    r.line(format!(
        "Budget Allocation: ₹{} ({:.2} crore)",
        group_thousands(policy.budget()),
        policy.budget_in_crores()
    ));
    r.line(format!(
        "Implementation Timeline: {} days ({} months)",
        policy.implementation_timeline_days,
        policy.implementation_timeline_days / 30
    ));
    r.line(format!("Enforcement Level: {:.2}", policy.enforcement_level()));
    r.blank();

    if let Some(b) = inputs.baseline {
        r.section(&format!("STATE/UT PROFILE: {}", location));
        r.line(format!("Total Population: {} people", group_thousands(b.population as f64)));
        r.line(format!(
            "Total Vehicles: {} registered vehicles",
            group_thousands(b.vehicle_count as f64)
        ));
        r.line(format!("Average Literacy Rate: {:.1}%", b.literacy_rate));
        r.line(format!("Median Monthly Income: ₹{}", group_thousands(b.median_income)));
        r.line(format!("Urbanization: {:.1}% urban population", b.urban_percentage));
        if let Some(zone) = &b.zone {
            r.line(format!("Zone: {}", zone));
        }
        r.line(format!("Geographic Coverage: {} major cities", b.cities.len()));
        r.line(format!("Cities: {}", b.cities.join(", ")));
        r.blank();

        let t = inputs.traffic;
        r.section("CURRENT TRAFFIC & INFRASTRUCTURE STATUS");
        r.line(format!("Congestion Level: {:.1}% (traffic index)", t.congestion_level));
        r.line(format!("Average Speed: {:.1} km/h", t.avg_speed_kmph));
        r.line(format!("Peak Hours: {}", t.peak_hours.join(", ")));
        r.line(format!(
            "Travel Time Increase: {:.0}% vs free-flow",
            t.travel_time_increase
        ));
        r.line(format!("Severity Assessment: {}", severity(t.congestion_level)));
        r.blank();
    }

    let e = inputs.economics;
    r.section("ECONOMIC INDICATORS (National)");
    r.line(format!("Current Inflation Rate: {:.1}%", e.inflation_rate));
    r.line(format!("GDP Growth Rate: {:.1}%", e.gdp_growth));
    r.line(format!("Fuel Price: ₹{:.2}/liter", e.fuel_price_per_liter));
    r.line(format!("Electricity Cost: ₹{:.2}/unit", e.electricity_cost_per_unit));
    r.blank();

    r.section("PREDICTED POLICY IMPACT");
    if let (
        Some(b),
        InfrastructureStress::Measured {
            current_congestion_percent,
            projected_congestion_percent,
            congestion_reduction_percent,
            ..
        },
    ) = (inputs.baseline, &inputs.metrics.infrastructure_stress)
    {
        r.line("Traffic Congestion:");
        r.line(format!("  • Current: {:.1}%", current_congestion_percent));
        r.line(format!("  • Projected: {:.1}%", projected_congestion_percent));
        r.line(format!("  • Reduction: {:.1}% improvement", congestion_reduction_percent));

        let commuters = (b.population as f64 * 0.3).floor();
        let hours_per_day = commuters * congestion_reduction_percent * 2.5 / 60.0;
        r.line(format!(
            "  • Estimated Time Savings: {} person-hours/day",
            group_thousands(hours_per_day)
        ));
        r.line(format!(
            "  • Annual Time Savings: {} person-hours/year",
            group_thousands(hours_per_day * 365.0)
        ));
        r.blank();
    }

    let dissatisfaction = inputs.impact.dissatisfaction_index;
    r.line("Citizen Satisfaction:");
    r.line(format!(
        "  • Projected Satisfaction Score: {:.1}%",
        (1.0 - dissatisfaction) * 100.0
    ));
    r.line(format!("  • Dissatisfaction Index: {:.2}", dissatisfaction));
    r.blank();

    let stability = inputs.metrics.economic_stability;
    r.line("Economic Stability:");
    r.line(format!("  • Economic Stability Score: {:.2}/1.0", stability));
    r.line(format!("  • Budget Efficiency: {:.1}%", stability * 100.0));

    if let Some(b) = inputs.baseline {
        r.blank();
        r.line("Population Impact:");
        r.line(format!(
            "  • Directly Affected: {} people (60%)",
            group_thousands((b.population as f64 * 0.6).floor())
        ));
        r.line(format!(
            "  • Vehicles Impacted: {} (70%)",
            group_thousands((b.vehicle_count as f64 * 0.7).floor())
        ));
    }
    r.blank();

    if let Some(opt) = inputs.optimization {
        r.section("OPTIMIZATION INSIGHTS");
        r.line(format!(
            "Improvement Potential: {:.1}% (heuristic estimate)",
            opt.improvement_percentage
        ));
        r.line(format!("Optimization Method: {}", opt.method));
        r.line(format!("Reward Score: {:.3}", opt.reward_score));
        r.blank();
        r.line("The optimizer suggests parameter adjustments that could improve policy");
        r.line(format!(
            "effectiveness by an estimated {:.1}% within budget and feasibility limits.",
            opt.improvement_percentage
        ));
        r.blank();
    }

    r.section("KEY IMPACT DRIVERS");
    r.line("Primary factors influencing policy outcomes:");
    r.line("  1. Budget Allocation (25% influence)");
    r.line("  2. Tax Incentive Structure (22% influence)");
    r.line("  3. Enforcement Level (18% influence)");
    r.line("  4. Subsidy Programs (15% influence)");
    r.line("  5. Implementation Timeline (12% influence)");
    r.line("  6. Infrastructure Changes (8% influence)");
    r.blank();

    r.section("RISK ASSESSMENT");
    let risks = risk_flags(policy, inputs.baseline, inputs.traffic);
    if risks.is_empty() {
        r.line("• No major risks identified - Policy parameters are well-balanced");
    } else {
        for risk in risks {
            r.line(format!("• {}", risk));
        }
    }
    r.blank();

    r.section("DATA SOURCES & METHODOLOGY");
    r.line("  • Census India (population, literacy, demographics)");
    r.line("  • Traffic index (congestion, speed, travel time)");
    r.line("  • Reserve Bank of India (inflation, economic indicators)");
    r.line("  • Ministry of Road Transport (vehicle registrations)");
    r.blank();
    r.line("=".repeat(RULE_WIDTH));
    r.line("END OF REPORT");
    r.line("=".repeat(RULE_WIDTH));

    r.finish()
}

// ============================================================================
// Recommendations
// ============================================================================

fn rec(
    priority: Priority,
    category: &str,
    recommendation: impl Into<String>,
    rationale: &str,
    action_items: &[&str],
) -> Recommendation {
    Recommendation {
        priority,
        category: category.to_string(),
        recommendation: recommendation.into(),
        rationale: rationale.to_string(),
        action_items: action_items.iter().map(|s| s.to_string()).collect(),
    }
}

/// Ordered advisory records
pub fn recommendations(optimization: Option<&OptimizationOutcome>) -> Vec<Recommendation> {
    let mut out = Vec::with_capacity(8);

    if let Some(opt) = optimization {
        if opt.improvement_percentage > OPTIMIZATION_RECOMMENDATION_THRESHOLD {
            out.push(rec(
                Priority::High,
                "Optimization",
                format!(
                    "Adopt optimized parameters for an estimated {:.1}% improvement",
                    opt.improvement_percentage
                ),
                "The optimizer found parameter combinations expected to enhance policy effectiveness",
                &[
                    "Review optimized parameter suggestions",
                    "Conduct cost-benefit analysis of proposed changes",
                    "Pilot test optimized parameters in 2-3 districts",
                    "Monitor KPIs for 30 days before full rollout",
                ],
            ));
        }
    }

    out.push(rec(
        Priority::High,
        "Budget Allocation",
        "Increase budget allocation by 10-15% to maximize impact",
        "Budget allocation carries 25% influence on outcomes, the highest of all factors",
        &[
            "Identify additional funding sources (state reserves, central schemes)",
            "Reallocate from lower-priority programs",
            "Explore public-private partnership opportunities",
            "Phase budget increase over 2-3 quarters if needed",
        ],
    ));
    out.push(rec(
        Priority::Medium,
        "Implementation",
        "Implement gradual enforcement ramp-up over first 30-60 days",
        "Gradual enforcement allows citizens to adapt, reduces resistance, and enables real-time adjustments",
        &[
            "Week 1-2: Awareness campaign and education phase",
            "Week 3-4: Warning period with no penalties",
            "Week 5-8: Partial enforcement (50% penalties)",
            "Week 9+: Full enforcement with regular monitoring",
        ],
    ));
    out.push(rec(
        Priority::Medium,
        "Infrastructure",
        "Focus infrastructure investments on high-stress nodes and corridors",
        "Targeted investments in congestion hotspots yield better returns than uniform distribution",
        &[
            "Conduct traffic flow analysis to identify top 10 bottlenecks",
            "Prioritize investments in peak-hour corridors",
            "Implement quick-win solutions (signal optimization, lane management)",
            "Plan long-term infrastructure for chronic problem areas",
        ],
    ));
    out.push(rec(
        Priority::Medium,
        "Monitoring",
        "Establish comprehensive monitoring system with weekly KPI tracking",
        "Real-time monitoring enables rapid course correction and demonstrates accountability",
        &[
            "Set up automated data collection for traffic, satisfaction, compliance",
            "Weekly review meetings with implementation team",
            "Monthly public reports on progress and outcomes",
            "Quarterly impact assessment and policy adjustments",
        ],
    ));
    out.push(rec(
        Priority::Low,
        "Risk Mitigation",
        "Consider pilot program in 2-3 representative districts before full rollout",
        "Pilot testing reduces implementation risks and provides valuable learnings",
        &[
            "Select diverse pilot districts (urban, semi-urban, rural)",
            "Run 60-90 day pilot with intensive monitoring",
            "Gather citizen feedback through surveys and town halls",
            "Refine policy based on pilot learnings before state-wide launch",
        ],
    ));
    out.push(rec(
        Priority::Medium,
        "Public Engagement",
        "Launch multi-channel awareness campaign 30 days before implementation",
        "Citizen awareness and buy-in are critical for policy success and compliance",
        &[
            "Social media campaign with infographics and videos",
            "Radio and TV spots in regional languages",
            "Community meetings and stakeholder consultations",
            "Dedicated helpline and FAQ portal",
        ],
    ));
    out.push(rec(
        Priority::Low,
        "Technology",
        "Leverage technology for enforcement, monitoring, and citizen services",
        "Technology reduces manual effort, improves accuracy, and enhances transparency",
        &[
            "Deploy automated traffic monitoring systems",
            "Mobile app for citizen feedback and grievances",
            "Real-time dashboard for public transparency",
            "Analytics for predictive insights",
        ],
    ));

    out
}

// ============================================================================
// Stage
// ============================================================================

/// Writes `explanation`
pub struct ExplanationStage {
    provider: Arc<dyn RegionalDataProvider>,
}

impl ExplanationStage {
    pub fn new(provider: Arc<dyn RegionalDataProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Stage for ExplanationStage {
    fn id(&self) -> StageId {
        StageId::Explanation
    }

    async fn run(&self, ctx: &mut SimulationContext) -> Result<(), PipelineError> {
        let policy = ctx.require_structured_policy(StageId::Explanation)?.clone();
        let metrics = ctx.require_simulation_metrics(StageId::Explanation)?.clone();
        let impact = ctx.require_impact_predictions(StageId::Explanation)?.clone();
        let optimization = ctx.optimization_result().cloned();

        let region_id = policy.region.id();
        let baseline = lookup_baseline(self.provider.as_ref(), region_id).await;
        let traffic = lookup_traffic(self.provider.as_ref(), region_id).await;
        let economics = lookup_economics(self.provider.as_ref()).await;

        let narrative = build_narrative(&NarrativeInputs {
            policy: &policy,
            metrics: &metrics,
            impact: &impact,
            optimization: optimization.as_ref(),
            baseline: baseline.as_ref(),
            traffic: &traffic,
            economics: &economics,
        });
        let attributions = attributions();
        let report = ExplanationReport {
            feature_importance: rank_features(&attributions),
            attributions,
            narrative,
            recommendations: recommendations(optimization.as_ref()),
        };

        info!(
            request_id = %ctx.request_id,
            stage = "explanation",
            recommendations = report.recommendations.len(),
            "explanation report assembled"
        );
        ctx.set_explanation(report);
        Ok(())
    }
}
