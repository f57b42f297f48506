use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Static configuration describing one battery system/installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemProfile {
    pub id: String,
    pub name: String,
    pub chemistry: Option<String>,
    pub nominal_voltage: f64,
    pub rated_capacity_ah: f64,
    pub max_solar_charge_current: Option<f64>,
    pub max_generator_charge_current: Option<f64>,
    pub location: Option<GeoLocation>,
    pub associated_devices: Vec<String>,
}

impl SystemProfile {
    /// Expected cycle life for the configured chemistry, used by the
    /// predictive-models analysis. LiFePO4 gets 3000 cycles, everything
    /// else (including unknown chemistry) gets 1000 - this is the policy
    /// call recorded in DESIGN.md, not a measured fact.
    pub fn expected_cycle_life(&self) -> u32 {
        match self.chemistry.as_deref() {
            Some(c) if c.eq_ignore_ascii_case("LiFePO4") => 3000,
            _ => 1000,
        }
    }
}
