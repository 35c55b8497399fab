//! Property tests: stage outputs stay inside their documented ranges

use proptest::prelude::*;

use policy_simulator_core_rs::models::{
    BehaviorIndicators, InfrastructureStress, PolicyParameters, PolicyType, Region,
};
use policy_simulator_core_rs::region::{RegionBaseline, TrafficBaseline};
use policy_simulator_core_rs::stages::behavior::adjust_for_region;
use policy_simulator_core_rs::stages::optimization::{apply_action, ACTION_BOUND};
use policy_simulator_core_rs::stages::simulation::{
    congestion_reduction, simulate, MAX_CONGESTION_REDUCTION, MIN_CONGESTION,
};

fn baseline(population: u64, vehicles: u64, area: f64) -> RegionBaseline {
    RegionBaseline {
        population,
        vehicle_count: vehicles,
        area_sq_km: area,
        literacy_rate: 80.0,
        median_income: 35_000.0,
        urban_percentage: 60.0,
        cities: vec!["Testpur".to_string()],
        zone: None,
    }
}

fn traffic(level: f64) -> TrafficBaseline {
    TrafficBaseline {
        congestion_level: level,
        ..TrafficBaseline::default()
    }
}

fn policy(budget: f64, enforcement: f64, lanes: f64, metro: f64, bus: f64, charging: f64) -> PolicyParameters {
    PolicyParameters::new(PolicyType::Transportation, Region::new("Testland"), budget, 90, enforcement)
        .with_infrastructure("new_lanes", lanes)
        .with_infrastructure("metro_stations", metro)
        .with_infrastructure("bus_routes", bus)
        .with_infrastructure("charging_stations", charging)
}

proptest! {
    #[test]
    fn prop_behavior_always_clamped(
        raw in prop::array::uniform4(-10.0f64..10.0),
        with_baseline in any::<bool>(),
    ) {
        let b = baseline(1_000_000, 200_000, 400.0);
        let out = adjust_for_region(raw, with_baseline.then_some(&b));
        for v in [out.adaptation_rate, out.compliance_probability, out.satisfaction_score] {
            prop_assert!((0.1..=0.95).contains(&v));
        }
        prop_assert!((0.05..=0.95).contains(&out.economic_impact_personal));
    }

    #[test]
    fn prop_reduction_capped_and_monotone(
        lanes in 0.0f64..200.0,
        metro in 0.0f64..200.0,
        bus in 0.0f64..200.0,
        extra in 0.0f64..50.0,
        compliance in 0.1f64..0.95,
    ) {
        let r = congestion_reduction(lanes, metro, bus, compliance);
        prop_assert!((0.0..=MAX_CONGESTION_REDUCTION).contains(&r));
        prop_assert!(congestion_reduction(lanes + extra, metro, bus, compliance) >= r);
        prop_assert!(congestion_reduction(lanes, metro + extra, bus, compliance) >= r);
        prop_assert!(congestion_reduction(lanes, metro, bus + extra, compliance) >= r);
    }

    #[test]
    fn prop_simulation_metrics_in_range(
        population in 1u64..50_000_000,
        vehicles in 0u64..20_000_000,
        area in 1.0f64..100_000.0,
        level in 0.0f64..100.0,
        budget in 0.0f64..1e12,
        enforcement in 0.0f64..1.0,
        lanes in 0.0f64..20.0,
        charging in 0.0f64..5_000.0,
        satisfaction in 0.1f64..0.95,
    ) {
        let p = policy(budget, enforcement, lanes, 3.0, 10.0, charging);
        let behavior = BehaviorIndicators::clamped([0.5, 0.6, satisfaction, 0.3]);
        let m = simulate(&p, &behavior, Some(&baseline(population, vehicles, area)), &traffic(level));

        prop_assert!(m.congestion_score >= MIN_CONGESTION);
        prop_assert!(m.congestion_score <= (level / 100.0).max(MIN_CONGESTION) + 5e-4);
        prop_assert!((0.3..=0.6).contains(&m.energy_load));
        prop_assert!(m.dissatisfaction_index >= 0.1);
        prop_assert!((0.0..=1.0).contains(&m.economic_stability));
        match m.infrastructure_stress {
            InfrastructureStress::Measured { stress_level, congestion_reduction_percent, .. } => {
                prop_assert!((0.0..=1.0).contains(&stress_level));
                prop_assert!(congestion_reduction_percent <= 25.0);
            }
            InfrastructureStress::Unavailable { .. } => prop_assert!(false, "baseline was present"),
        }
    }

    #[test]
    fn prop_tuned_policy_keeps_invariants(
        action in prop::array::uniform5(-2.0f64..2.0),
        budget in 0.0f64..1e10,
        enforcement in 0.0f64..1.0,
        timeline in 1u32..3_650,
    ) {
        let mut p = policy(budget, enforcement, 2.0, 3.0, 10.0, 50.0);
        p.implementation_timeline_days = timeline;
        let tuned = apply_action(&p, &action);

        prop_assert!(tuned.budget() >= 0.0);
        prop_assert!(tuned.budget() <= budget * (1.0 + ACTION_BOUND) + 1e-6);
        prop_assert!((0.0..=1.0).contains(&tuned.enforcement_level()));
        prop_assert!(tuned.implementation_timeline_days >= 1);
        prop_assert_eq!(tuned.infrastructure_changes, p.infrastructure_changes);
    }
}

#[test]
fn test_unusable_baseline_degrades_to_fallback() {
    let p = policy(1e8, 0.7, 2.0, 3.0, 10.0, 50.0);
    let behavior = BehaviorIndicators::clamped([0.5; 4]);
    let fallback = simulate(&p, &behavior, None, &traffic(74.4));

    assert_eq!(fallback.congestion_score, 0.5);
    assert!(!fallback.infrastructure_stress.is_measured());
    assert_eq!(simulate(&p, &behavior, Some(&baseline(0, 10, 10.0)), &traffic(74.4)), fallback);
    assert_eq!(simulate(&p, &behavior, Some(&baseline(10, 10, 0.0)), &traffic(74.4)), fallback);
}
