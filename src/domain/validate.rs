use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;

/// Severity of a validation flag raised against an incoming snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlagSeverity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationFlag {
    pub severity: FlagSeverity,
    pub field: String,
    pub message: String,
}

/// Checks the physical invariants in the spec's data model against one
/// snapshot. Violations are recorded, never raised - per the error-handling
/// design, a `ValidationError` is reported on the result but does not abort
/// the reasoning loop.
pub fn validate_snapshot(snapshot: &Snapshot) -> Vec<ValidationFlag> {
    let mut flags = Vec::new();

    if let Some(soc) = snapshot.soc {
        if !(0.0..=100.0).contains(&soc) {
            flags.push(ValidationFlag {
                severity: FlagSeverity::Critical,
                field: "soc".into(),
                message: format!("SOC {soc} out of [0,100] range"),
            });
        }
    }

    if let Some(cells) = &snapshot.cell_voltages {
        for (i, v) in cells.iter().enumerate() {
            if !(2.0..=4.5).contains(v) {
                flags.push(ValidationFlag {
                    severity: FlagSeverity::Critical,
                    field: format!("cell_voltages[{i}]"),
                    message: format!("cell voltage {v}V out of [2.0,4.5] range"),
                });
            }
        }
    }

    if let Some(t) = snapshot.temperature_c {
        if !(t > 0.0 && t <= 100.0) {
            flags.push(ValidationFlag {
                severity: FlagSeverity::Critical,
                field: "temperature_c".into(),
                message: format!("temperature {t}C out of (0,100] range"),
            });
        }
    }

    if let (Some(cells), Some(overall)) = (&snapshot.cell_voltages, snapshot.voltage) {
        if !cells.is_empty() {
            let sum: f64 = cells.iter().sum();
            let deviation = (sum - overall).abs();
            if deviation > 1.0 {
                flags.push(ValidationFlag {
                    severity: FlagSeverity::Critical,
                    field: "voltage".into(),
                    message: format!(
                        "sum of cells {sum:.2}V deviates from overall voltage {overall:.2}V by {deviation:.2}V"
                    ),
                });
            } else if deviation > 0.5 {
                flags.push(ValidationFlag {
                    severity: FlagSeverity::Warning,
                    field: "voltage".into(),
                    message: format!(
                        "sum of cells {sum:.2}V deviates from overall voltage {overall:.2}V by {deviation:.2}V"
                    ),
                });
            }
        }
    }

    if let (Some(power), Some(current), Some(voltage)) =
        (snapshot.power, snapshot.current, snapshot.voltage)
    {
        let expected = current * voltage;
        if expected.abs() > 1e-6 {
            let rel_deviation = (power - expected).abs() / expected.abs();
            if rel_deviation > 0.5 {
                flags.push(ValidationFlag {
                    severity: FlagSeverity::Critical,
                    field: "power".into(),
                    message: format!(
                        "power {power:.1}W deviates from current*voltage {expected:.1}W by {:.0}%",
                        rel_deviation * 100.0
                    ),
                });
            } else if rel_deviation > 0.10 {
                flags.push(ValidationFlag {
                    severity: FlagSeverity::Warning,
                    field: "power".into(),
                    message: format!(
                        "power {power:.1}W deviates from current*voltage {expected:.1}W by {:.0}%",
                        rel_deviation * 100.0
                    ),
                });
            }
        }
    }

    if let (Some(remaining), Some(full)) =
        (snapshot.remaining_capacity_ah, snapshot.full_capacity_ah)
    {
        if remaining > full * 1.05 {
            flags.push(ValidationFlag {
                severity: FlagSeverity::Warning,
                field: "remaining_capacity_ah".into(),
                message: format!(
                    "remaining capacity {remaining:.1}Ah exceeds full capacity {full:.1}Ah by more than 5%"
                ),
            });
        }
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Snapshot {
        Snapshot {
            voltage: Some(52.0),
            current: Some(-10.0),
            power: Some(-520.0),
            soc: Some(55.0),
            cell_voltages: Some(vec![3.25; 16]),
            temperature_c: Some(22.0),
            ..Default::default()
        }
    }

    #[test]
    fn clean_snapshot_has_no_flags() {
        assert!(validate_snapshot(&base()).is_empty());
    }

    #[test]
    fn cell_sum_deviation_thresholds_match_spec() {
        // 16 * 3.25 = 52.0 exactly; nudge overall voltage to create deviations.
        let mut s = base();
        s.voltage = Some(52.6); // 0.6V deviation -> warning, not critical
        let flags = validate_snapshot(&s);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, FlagSeverity::Warning);

        let mut s = base();
        s.voltage = Some(53.1); // 1.1V deviation -> critical
        let flags = validate_snapshot(&s);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, FlagSeverity::Critical);

        let mut s = base();
        s.voltage = Some(52.3); // 0.3V deviation -> no flag
        assert!(validate_snapshot(&s).is_empty());
    }

    #[test]
    fn power_deviation_thresholds() {
        let mut s = base();
        s.power = Some(-520.0 * 1.6); // 60% deviation -> critical
        let flags = validate_snapshot(&s);
        assert!(flags
            .iter()
            .any(|f| f.field == "power" && f.severity == FlagSeverity::Critical));

        let mut s = base();
        s.power = Some(-520.0 * 1.2); // 20% deviation -> warning
        let flags = validate_snapshot(&s);
        assert!(flags
            .iter()
            .any(|f| f.field == "power" && f.severity == FlagSeverity::Warning));
    }

    #[test]
    fn out_of_range_soc_and_temperature() {
        let mut s = base();
        s.soc = Some(150.0);
        s.temperature_c = Some(-5.0);
        let flags = validate_snapshot(&s);
        assert!(flags.iter().any(|f| f.field == "soc"));
        assert!(flags.iter().any(|f| f.field == "temperature_c"));
    }
}
