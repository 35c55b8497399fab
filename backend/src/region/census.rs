//! Static census, traffic and economic tables
//!
//! All 28 states and 8 union territories, one or more cities each. A state's
//! baseline aggregates its cities: population, vehicles and area are summed,
//! literacy, income and urbanisation are averaged. The first city listed for a
//! state is its capital and stands in for the state's traffic.

use async_trait::async_trait;

use crate::models::round_to;

use super::{EconomicIndicators, ProviderError, RegionBaseline, RegionalDataProvider, TrafficBaseline};

struct CityRecord {
    state: &'static str,
    city: &'static str,
    population: u64,
    area_sq_km: f64,
    literacy_rate: f64,
    urban_percentage: f64,
    median_income: f64,
    vehicles: u64,
}

#[allow(clippy::too_many_arguments)]
const fn city(
    state: &'static str,
    city: &'static str,
    population: u64,
    area_sq_km: f64,
    literacy_rate: f64,
    urban_percentage: f64,
    median_income: f64,
    vehicles: u64,
) -> CityRecord {
    CityRecord {
        state,
        city,
        population,
        area_sq_km,
        literacy_rate,
        urban_percentage,
        median_income,
        vehicles,
    }
}

// state, city, population, area (sq km), literacy %, urban %, median income, vehicles
#[rustfmt::skip]
const CITIES: &[CityRecord] = &[
    city("Andhra Pradesh", "Amaravati", 400_000, 217.23, 67.66, 33.4, 35_000.0, 180_000),
    city("Arunachal Pradesh", "Itanagar", 59_490, 25.43, 66.95, 22.9, 32_000.0, 25_000),
    city("Assam", "Dispur", 957_352, 216.0, 73.18, 14.1, 30_000.0, 420_000),
    city("Bihar", "Patna", 2_046_652, 250.0, 63.82, 11.3, 28_000.0, 850_000),
    city("Chhattisgarh", "Raipur", 1_010_087, 226.0, 71.04, 23.2, 32_000.0, 450_000),
    city("Goa", "Panaji", 114_759, 8.0, 87.4, 62.2, 48_000.0, 65_000),
    city("Gujarat", "Gandhinagar", 292_797, 205.0, 79.31, 42.6, 42_000.0, 150_000),
    city("Haryana", "Chandigarh", 1_055_450, 114.0, 86.43, 34.8, 52_000.0, 580_000),
    city("Himachal Pradesh", "Shimla", 169_578, 35.34, 83.78, 10.0, 38_000.0, 85_000),
    city("Jharkhand", "Ranchi", 1_126_741, 652.0, 67.63, 24.1, 30_000.0, 480_000),
    city("Karnataka", "Bengaluru", 8_443_675, 741.0, 88.71, 100.0, 48_000.0, 7_200_000),
    city("Kerala", "Thiruvananthapuram", 957_730, 214.86, 93.91, 47.7, 40_000.0, 520_000),
    city("Madhya Pradesh", "Bhopal", 1_883_381, 463.0, 70.59, 27.6, 33_000.0, 820_000),
    city("Maharashtra", "Mumbai", 12_442_373, 603.4, 89.21, 100.0, 55_000.0, 3_500_000),
    city("Maharashtra", "Pune", 3_124_458, 331.26, 86.15, 100.0, 42_000.0, 2_800_000),
    city("Manipur", "Imphal", 268_243, 57.0, 79.85, 32.0, 31_000.0, 125_000),
    city("Meghalaya", "Shillong", 143_229, 64.36, 75.48, 20.1, 33_000.0, 72_000),
    city("Mizoram", "Aizawl", 293_416, 457.0, 91.58, 51.5, 34_000.0, 145_000),
    city("Nagaland", "Kohima", 99_039, 20.0, 80.11, 28.9, 32_000.0, 48_000),
    city("Odisha", "Bhubaneswar", 881_988, 422.0, 73.45, 16.7, 32_000.0, 410_000),
    city("Punjab", "Chandigarh", 1_055_450, 114.0, 76.68, 37.5, 45_000.0, 580_000),
    city("Rajasthan", "Jaipur", 3_046_163, 467.0, 67.06, 24.9, 36_000.0, 1_450_000),
    city("Sikkim", "Gangtok", 100_286, 50.0, 82.2, 25.2, 37_000.0, 52_000),
    city("Tamil Nadu", "Chennai", 7_088_000, 426.0, 90.33, 100.0, 45_000.0, 3_200_000),
    city("Telangana", "Hyderabad", 6_809_970, 650.0, 66.5, 100.0, 46_000.0, 3_100_000),
    city("Tripura", "Agartala", 400_004, 76.5, 87.75, 26.2, 30_000.0, 185_000),
    city("Uttar Pradesh", "Lucknow", 2_817_105, 631.0, 69.72, 22.3, 34_000.0, 1_320_000),
    city("Uttarakhand", "Dehradun", 578_420, 300.0, 79.59, 30.6, 38_000.0, 285_000),
    city("West Bengal", "Kolkata", 4_496_694, 205.0, 87.14, 100.0, 40_000.0, 2_100_000),
    city("Andaman and Nicobar Islands", "Port Blair", 100_608, 17.84, 86.27, 37.7, 35_000.0, 48_000),
    city("Chandigarh", "Chandigarh", 1_055_450, 114.0, 86.43, 97.2, 52_000.0, 580_000),
    city("Dadra and Nagar Haveli and Daman and Diu", "Daman", 44_104, 72.0, 87.1, 75.2, 42_000.0, 24_000),
    city("Delhi", "New Delhi", 16_787_941, 1484.0, 86.34, 100.0, 50_000.0, 11_000_000),
    city("Jammu and Kashmir", "Srinagar", 1_180_570, 294.0, 68.74, 27.4, 33_000.0, 520_000),
    city("Ladakh", "Leh", 30_870, 45.0, 77.7, 36.3, 35_000.0, 18_000),
    city("Lakshadweep", "Kavaratti", 11_210, 4.22, 92.28, 78.1, 38_000.0, 5_500),
    city("Puducherry", "Puducherry", 244_377, 19.0, 86.55, 68.3, 40_000.0, 125_000),
];

struct TrafficRecord {
    city: &'static str,
    congestion_level: f64,
    avg_speed_kmph: f64,
    peak_hours: [&'static str; 2],
    travel_time_increase: f64,
}

#[rustfmt::skip]
const TRAFFIC: &[TrafficRecord] = &[
    TrafficRecord { city: "Bengaluru", congestion_level: 74.4, avg_speed_kmph: 18.5, peak_hours: ["08:00-10:00", "18:00-20:00"], travel_time_increase: 243.0 },
    TrafficRecord { city: "Mumbai", congestion_level: 65.0, avg_speed_kmph: 22.0, peak_hours: ["08:30-11:00", "18:00-21:00"], travel_time_increase: 210.0 },
    TrafficRecord { city: "Pune", congestion_level: 59.0, avg_speed_kmph: 25.0, peak_hours: ["08:00-10:00", "17:30-19:30"], travel_time_increase: 195.0 },
    TrafficRecord { city: "New Delhi", congestion_level: 62.0, avg_speed_kmph: 24.0, peak_hours: ["08:00-10:30", "18:00-20:30"], travel_time_increase: 205.0 },
    TrafficRecord { city: "Chennai", congestion_level: 54.0, avg_speed_kmph: 28.0, peak_hours: ["08:30-10:00", "18:00-19:30"], travel_time_increase: 180.0 },
    TrafficRecord { city: "Kolkata", congestion_level: 58.0, avg_speed_kmph: 26.0, peak_hours: ["08:00-10:00", "17:30-19:30"], travel_time_increase: 190.0 },
    TrafficRecord { city: "Hyderabad", congestion_level: 56.0, avg_speed_kmph: 27.0, peak_hours: ["08:30-10:30", "18:00-20:00"], travel_time_increase: 185.0 },
    TrafficRecord { city: "Jaipur", congestion_level: 52.0, avg_speed_kmph: 29.0, peak_hours: ["08:00-10:00", "17:30-19:30"], travel_time_increase: 175.0 },
    TrafficRecord { city: "Lucknow", congestion_level: 50.0, avg_speed_kmph: 30.0, peak_hours: ["08:30-10:00", "18:00-19:30"], travel_time_increase: 170.0 },
    TrafficRecord { city: "Chandigarh", congestion_level: 48.0, avg_speed_kmph: 32.0, peak_hours: ["08:00-09:30", "17:30-19:00"], travel_time_increase: 165.0 },
];

#[rustfmt::skip]
const ZONES: &[(&str, &[&str])] = &[
    ("North", &["Delhi", "Haryana", "Himachal Pradesh", "Jammu and Kashmir", "Ladakh", "Punjab", "Chandigarh", "Uttarakhand"]),
    ("South", &["Andhra Pradesh", "Karnataka", "Kerala", "Tamil Nadu", "Telangana", "Puducherry", "Lakshadweep", "Andaman and Nicobar Islands"]),
    ("East", &["Bihar", "Jharkhand", "Odisha", "West Bengal"]),
    ("West", &["Goa", "Gujarat", "Maharashtra", "Rajasthan", "Dadra and Nagar Haveli and Daman and Diu"]),
    ("Central", &["Chhattisgarh", "Madhya Pradesh", "Uttar Pradesh"]),
    ("Northeast", &["Arunachal Pradesh", "Assam", "Manipur", "Meghalaya", "Mizoram", "Nagaland", "Sikkim", "Tripura"]),
];

/// In-process provider backed by the static tables
///
/// # Example
///
/// ```rust
/// use policy_simulator_core_rs::region::StaticRegionalData;
///
/// let data = StaticRegionalData::new();
/// let baseline = data.baseline("Maharashtra").unwrap();
/// assert_eq!(baseline.cities, vec!["Mumbai", "Pune"]);
/// assert!(data.baseline("Atlantis").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticRegionalData;

impl StaticRegionalData {
    pub fn new() -> Self {
        Self
    }

    /// Aggregated baseline for a state, `None` if unknown
    pub fn baseline(&self, state: &str) -> Option<RegionBaseline> {
        let cities: Vec<&CityRecord> = CITIES.iter().filter(|c| c.state == state).collect();
        if cities.is_empty() {
            return None;
        }
        let n = cities.len() as f64;

        Some(RegionBaseline {
            population: cities.iter().map(|c| c.population).sum(),
            vehicle_count: cities.iter().map(|c| c.vehicles).sum(),
            area_sq_km: cities.iter().map(|c| c.area_sq_km).sum(),
            literacy_rate: round_to(cities.iter().map(|c| c.literacy_rate).sum::<f64>() / n, 2),
            median_income: round_to(cities.iter().map(|c| c.median_income).sum::<f64>() / n, 0),
            urban_percentage: round_to(cities.iter().map(|c| c.urban_percentage).sum::<f64>() / n, 2),
            cities: cities.iter().map(|c| c.city.to_string()).collect(),
            zone: self.zone(state).map(str::to_string),
        })
    }

    /// Traffic of the state's capital, or the default record
    pub fn traffic(&self, state: &str) -> TrafficBaseline {
        CITIES
            .iter()
            .find(|c| c.state == state)
            .and_then(|capital| TRAFFIC.iter().find(|t| t.city == capital.city))
            .map(|t| TrafficBaseline {
                congestion_level: t.congestion_level,
                avg_speed_kmph: t.avg_speed_kmph,
                peak_hours: t.peak_hours.iter().map(|h| h.to_string()).collect(),
                travel_time_increase: t.travel_time_increase,
            })
            .unwrap_or_default()
    }

    pub fn zone(&self, state: &str) -> Option<&'static str> {
        ZONES
            .iter()
            .find(|(_, states)| states.contains(&state))
            .map(|(zone, _)| *zone)
    }

    /// All known states and union territories, sorted
    pub fn states(&self) -> Vec<&'static str> {
        let mut states: Vec<&'static str> = CITIES.iter().map(|c| c.state).collect();
        states.sort_unstable();
        states.dedup();
        states
    }
}

#[async_trait]
impl RegionalDataProvider for StaticRegionalData {
    async fn region_baseline(&self, region_id: &str) -> Result<Option<RegionBaseline>, ProviderError> {
        Ok(self.baseline(region_id))
    }

    async fn traffic_baseline(&self, region_id: &str) -> Result<TrafficBaseline, ProviderError> {
        Ok(self.traffic(region_id))
    }

    async fn economic_indicators(&self) -> Result<EconomicIndicators, ProviderError> {
        Ok(EconomicIndicators::default())
    }
}
