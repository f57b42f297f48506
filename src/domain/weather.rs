use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherObservation {
    pub timestamp: DateTime<Utc>,
    pub temp_c: Option<f64>,
    pub clouds_pct: Option<f64>,
    pub uvi: Option<f64>,
    pub condition: Option<String>,
}

impl WeatherObservation {
    pub fn is_clear(&self) -> bool {
        self.clouds_pct.is_some_and(|c| c < 30.0)
    }

    pub fn is_overcast(&self) -> bool {
        self.clouds_pct.is_some_and(|c| c > 70.0)
    }

    /// Modeled peak sun hours: 5h at 0% cloud cover, degrading linearly to
    /// 2h at 100% cloud cover. A pluggable solar model would be better
    /// (spec open question); this constant-with-linear-degradation model
    /// is the policy in force.
    pub fn modeled_sun_hours(&self) -> f64 {
        let clouds = self.clouds_pct.unwrap_or(0.0).clamp(0.0, 100.0);
        5.0 - (clouds / 100.0) * 3.0
    }
}
