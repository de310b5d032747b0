//! AQI conversion helpers.
//!
//! Converts raw concentrations into the 0–500 index scale and maps index
//! values onto the EPA category bands. Three conversion paths exist:
//!
//! - [`pm25_to_index`]: the EPA piecewise-linear breakpoint table
//! - [`aod_to_index`]: a coarse step function for satellite aerosol optical
//!   depth; approximate and lower-confidence by nature
//! - [`ground_station_index`]: the multiplier shortcut applied to live
//!   ground-station measurements (PM2.5 × 4, else PM10 × 2)
//!
//! The last one disagrees with the EPA table for the same input. Both paths
//! are kept as observed; callers pick the one matching their source.

use serde::{Deserialize, Serialize};

/// Upper bound of the index scale.
pub const MAX_INDEX: u16 = 500;

/// PM2.5 concentration bands in µg/m³, paired with their index bands.
const PM25_BREAKPOINTS: [(f64, f64, f64, f64); 7] = [
    (0.0, 12.0, 0.0, 50.0),        // Good
    (12.1, 35.4, 51.0, 100.0),     // Moderate
    (35.5, 55.4, 101.0, 150.0),    // Unhealthy for Sensitive Groups
    (55.5, 150.4, 151.0, 200.0),   // Unhealthy
    (150.5, 250.4, 201.0, 300.0),  // Very Unhealthy
    (250.5, 350.4, 301.0, 400.0),  // Hazardous
    (350.5, 500.4, 401.0, 500.0),  // Hazardous (upper)
];

// ---

/// Clamp any numeric index estimate into `[0, 500]` and round it.
pub fn clamp_index(value: f64) -> u16 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    value.round().min(MAX_INDEX as f64) as u16
}

/// Calculate the index for a PM2.5 concentration (µg/m³).
///
/// Each value is placed in the first band whose upper breakpoint it does
/// not exceed, then linearly interpolated within that band:
///
/// `I = (I_hi - I_lo) / (C_hi - C_lo) * (C - C_lo) + I_lo`
///
/// Negative input yields 0, anything above 500.4 clamps to 500.
pub fn pm25_to_index(pm25: f64) -> u16 {
    // ---
    if !pm25.is_finite() || pm25 <= 0.0 {
        return 0;
    }

    for (c_lo, c_hi, i_lo, i_hi) in PM25_BREAKPOINTS {
        if pm25 <= c_hi {
            let index = (i_hi - i_lo) / (c_hi - c_lo) * (pm25 - c_lo) + i_lo;
            return clamp_index(index);
        }
    }

    MAX_INDEX
}

/// Approximate index from satellite aerosol optical depth.
pub fn aod_to_index(aod: f64) -> u16 {
    match aod {
        a if a <= 0.05 => 25,
        a if a <= 0.1 => 50,
        a if a <= 0.2 => 75,
        a if a <= 0.3 => 100,
        a if a <= 0.5 => 150,
        a if a <= 1.0 => 200,
        _ => 300,
    }
}

/// Which measurement drove a ground-station index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundIndexBasis {
    Pm25,
    Pm10,
    Default,
}

/// Index for a live ground-station measurement set.
///
/// Uses the station shortcut multipliers rather than the EPA table: PM2.5 × 4
/// when present, else PM10 × 2, else a neutral 50.
pub fn ground_station_index(pm25: Option<f64>, pm10: Option<f64>) -> (u16, GroundIndexBasis) {
    match (pm25, pm10) {
        (Some(pm25), _) => (clamp_index(pm25 * 4.0), GroundIndexBasis::Pm25),
        (None, Some(pm10)) => (clamp_index(pm10 * 2.0), GroundIndexBasis::Pm10),
        (None, None) => (50, GroundIndexBasis::Default),
    }
}

/// EPA index categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    // ---
    pub fn from_index(index: u16) -> Self {
        match index {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    /// One sentence describing the health impact of this band.
    pub fn summary(&self) -> &'static str {
        match self {
            AqiCategory::Good => {
                "Air quality is satisfactory, and air pollution poses little or no risk."
            }
            AqiCategory::Moderate => {
                "Air quality is acceptable. However, there may be a risk for some people, \
                 particularly those who are unusually sensitive to air pollution."
            }
            AqiCategory::UnhealthyForSensitiveGroups => {
                "Members of sensitive groups may experience health effects. \
                 The general public is less likely to be affected."
            }
            AqiCategory::Unhealthy => {
                "Some members of the general public may experience health effects; \
                 members of sensitive groups may experience more serious health effects."
            }
            AqiCategory::VeryUnhealthy => {
                "Health alert: The risk of health effects is increased for everyone."
            }
            AqiCategory::Hazardous => {
                "Health warning of emergency conditions: everyone is more likely to be affected."
            }
        }
    }

    pub fn health_advisory(&self) -> Vec<String> {
        let lines: &[&str] = match self {
            AqiCategory::Good => &[
                "Enjoy outdoor activities without restrictions",
                "Perfect time for exercising outside",
            ],
            AqiCategory::Moderate => &[
                "Most people can enjoy outdoor activities",
                "Sensitive individuals should limit prolonged outdoor exertion",
                "Consider reducing intense outdoor activities if you experience symptoms",
            ],
            AqiCategory::UnhealthyForSensitiveGroups => &[
                "Sensitive groups should reduce prolonged or heavy outdoor exertion",
                "Take more breaks during outdoor activities",
                "Consider moving activities indoors if you experience symptoms",
                "People with asthma should follow their asthma action plans",
            ],
            AqiCategory::Unhealthy => &[
                "Everyone should reduce prolonged or heavy outdoor exertion",
                "Sensitive groups should avoid prolonged outdoor activities",
                "Keep windows closed to minimize indoor pollution",
                "Use air purifiers if available",
            ],
            AqiCategory::VeryUnhealthy => &[
                "Everyone should avoid all outdoor physical activities",
                "Sensitive groups should remain indoors",
                "Keep windows and doors closed",
                "Run air purifiers on high settings",
            ],
            AqiCategory::Hazardous => &[
                "Stay indoors with windows and doors closed",
                "Avoid all physical activities, even indoors",
                "Use N95 masks if you must go outside",
                "Seek medical attention if experiencing symptoms",
            ],
        };
        lines.iter().map(|s| s.to_string()).collect()
    }
}

/// Standard unit for a pollutant short name.
pub fn unit_for(parameter: &str) -> &'static str {
    match parameter.to_lowercase().as_str() {
        "co" => "mg/m³",
        _ => "µg/m³",
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_pm25_band_edges() {
        // ---
        assert_eq!(pm25_to_index(0.0), 0);
        assert_eq!(pm25_to_index(6.0), 25);
        assert_eq!(pm25_to_index(12.0), 50);
        assert_eq!(pm25_to_index(12.1), 51);
        assert_eq!(pm25_to_index(35.4), 100);
        assert_eq!(pm25_to_index(35.5), 101);
        assert_eq!(pm25_to_index(55.4), 150);
        assert_eq!(pm25_to_index(150.4), 200);
        assert_eq!(pm25_to_index(250.4), 300);
        assert_eq!(pm25_to_index(350.4), 400);
        assert_eq!(pm25_to_index(500.4), 500);
    }

    #[test]
    fn test_pm25_clamps() {
        // ---
        assert_eq!(pm25_to_index(-3.0), 0);
        assert_eq!(pm25_to_index(900.0), 500);
        assert_eq!(pm25_to_index(f64::NAN), 0);
    }

    #[test]
    fn test_pm25_monotonic_over_range() {
        // ---
        let mut previous = 0;
        let mut c = 0.0;
        while c <= 600.0 {
            let index = pm25_to_index(c);
            assert!(index >= previous, "index dropped at {c}: {index} < {previous}");
            assert!(index <= 500);
            previous = index;
            c += 0.05;
        }
    }

    #[test]
    fn test_aod_steps() {
        // ---
        assert_eq!(aod_to_index(0.01), 25);
        assert_eq!(aod_to_index(0.05), 25);
        assert_eq!(aod_to_index(0.08), 50);
        assert_eq!(aod_to_index(0.15), 75);
        assert_eq!(aod_to_index(0.3), 100);
        assert_eq!(aod_to_index(0.45), 150);
        assert_eq!(aod_to_index(0.9), 200);
        assert_eq!(aod_to_index(2.5), 300);
    }

    #[test]
    fn test_ground_station_multipliers() {
        // ---
        assert_eq!(ground_station_index(Some(20.0), Some(80.0)), (80, GroundIndexBasis::Pm25));
        assert_eq!(ground_station_index(None, Some(40.0)), (80, GroundIndexBasis::Pm10));
        assert_eq!(ground_station_index(None, None), (50, GroundIndexBasis::Default));
        assert_eq!(ground_station_index(Some(300.0), None).0, 500);
    }

    #[test]
    fn test_category_bands() {
        // ---
        assert_eq!(AqiCategory::from_index(0), AqiCategory::Good);
        assert_eq!(AqiCategory::from_index(50), AqiCategory::Good);
        assert_eq!(AqiCategory::from_index(51), AqiCategory::Moderate);
        assert_eq!(AqiCategory::from_index(150), AqiCategory::UnhealthyForSensitiveGroups);
        assert_eq!(AqiCategory::from_index(151), AqiCategory::Unhealthy);
        assert_eq!(AqiCategory::from_index(300), AqiCategory::VeryUnhealthy);
        assert_eq!(AqiCategory::from_index(301), AqiCategory::Hazardous);
        assert_eq!(AqiCategory::from_index(500), AqiCategory::Hazardous);
        assert!(!AqiCategory::Hazardous.health_advisory().is_empty());
    }

    #[test]
    fn test_units() {
        // ---
        assert_eq!(unit_for("CO"), "mg/m³");
        assert_eq!(unit_for("pm25"), "µg/m³");
    }
}
