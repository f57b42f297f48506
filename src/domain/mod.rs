pub mod conversation;
pub mod record;
pub mod snapshot;
pub mod system;
pub mod tool;
pub mod validate;
pub mod weather;

pub use conversation::{Role, Turn};
pub use record::{clamped_delta_hours, HistoricalRecord};
pub use snapshot::Snapshot;
pub use system::{GeoLocation, SystemProfile};
pub use tool::ToolInvocationRecord;
pub use validate::{validate_snapshot, FlagSeverity, ValidationFlag};
pub use weather::WeatherObservation;

use serde::{Deserialize, Serialize};

/// Operating mode requested by the caller of `generate_insights`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Sync,
    Background,
}

/// Facts about the pack derived from its configured capacity and observed
/// cycle count, independent of any particular snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatteryFacts {
    pub rated_capacity_ah: Option<f64>,
    pub cycle_count: Option<u32>,
    pub chemistry: Option<String>,
    pub reference_voltage: Option<f64>,
    /// True when `cycle_count <= 50` - the pack is likely a recent
    /// install, so capacity-decline claims should be downgraded to
    /// monitoring items rather than firm findings.
    pub brand_new_likely: bool,
}

impl BatteryFacts {
    pub fn from_profile_and_snapshot(
        profile: Option<&SystemProfile>,
        snapshot: &Snapshot,
    ) -> Self {
        let cycle_count = snapshot.cycle_count;
        let chemistry = snapshot
            .chemistry
            .clone()
            .or_else(|| profile.and_then(|p| p.chemistry.clone()));
        Self {
            rated_capacity_ah: profile.map(|p| p.rated_capacity_ah),
            cycle_count,
            chemistry,
            reference_voltage: profile.map(|p| p.nominal_voltage),
            brand_new_likely: cycle_count.is_some_and(|c| c <= 50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_new_likely_threshold_is_50_cycles() {
        let snap = Snapshot {
            cycle_count: Some(50),
            ..Default::default()
        };
        assert!(BatteryFacts::from_profile_and_snapshot(None, &snap).brand_new_likely);

        let snap = Snapshot {
            cycle_count: Some(51),
            ..Default::default()
        };
        assert!(!BatteryFacts::from_profile_and_snapshot(None, &snap).brand_new_likely);
    }
}
