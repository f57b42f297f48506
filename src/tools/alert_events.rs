use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::HistoricalRecord;

/// SOC level, expressed as a percentage, above which a still-present alert
/// tag is nonetheless considered recovering and its event is closed. There
/// is no per-tag threshold in the source telemetry, so one uniform
/// recovery line is applied across tags.
const DEFAULT_RECOVERY_SOC_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub tag: String,
    pub event_count: usize,
    pub total_occurrences: usize,
    pub avg_duration_hours: f64,
    pub avg_trigger_soc: Option<f64>,
}

struct OpenEvent {
    start_idx: usize,
    trigger_soc: Option<f64>,
}

struct ClosedEvent {
    duration_hours: f64,
    occurrences: usize,
    trigger_soc: Option<f64>,
}

/// Groups a sequence of records' alert tags into events, using the default
/// recovery threshold. See [`group_alert_events_with_threshold`] to vary it.
pub fn group_alert_events(records: &[HistoricalRecord]) -> Vec<AlertEvent> {
    group_alert_events_with_threshold(records, DEFAULT_RECOVERY_SOC_THRESHOLD)
}

/// Pure, idempotent: grouping the same sequence twice yields identical
/// events, since the function only ever reads `records` and carries no
/// state across calls.
pub fn group_alert_events_with_threshold(
    records: &[HistoricalRecord],
    recovery_soc_threshold: f64,
) -> Vec<AlertEvent> {
    let mut active: HashMap<String, OpenEvent> = HashMap::new();
    let mut closed: HashMap<String, Vec<ClosedEvent>> = HashMap::new();

    let close = |closed: &mut HashMap<String, Vec<ClosedEvent>>,
                 tag: String,
                 open: OpenEvent,
                 end_idx: usize,
                 records: &[HistoricalRecord]| {
        let duration_hours = if end_idx > open.start_idx {
            (records[end_idx].timestamp - records[open.start_idx].timestamp).num_milliseconds() as f64
                / 3_600_000.0
        } else {
            0.0
        };
        closed.entry(tag).or_default().push(ClosedEvent {
            duration_hours,
            occurrences: end_idx - open.start_idx + 1,
            trigger_soc: open.trigger_soc,
        });
    };

    for (idx, record) in records.iter().enumerate() {
        let current_tags: HashSet<&str> = record.alerts.iter().map(String::as_str).collect();

        if idx > 0 {
            let prev_soc = records[idx - 1].analysis.soc;
            let now_soc = record.analysis.soc;
            if let (Some(prev), Some(now)) = (prev_soc, now_soc) {
                if prev < recovery_soc_threshold && now >= recovery_soc_threshold {
                    let recovering: Vec<String> = active.keys().cloned().collect();
                    for tag in recovering {
                        if let Some(open) = active.remove(&tag) {
                            close(&mut closed, tag, open, idx - 1, records);
                        }
                    }
                }
            }
        }

        let absent: Vec<String> = active
            .keys()
            .filter(|tag| !current_tags.contains(tag.as_str()))
            .cloned()
            .collect();
        for tag in absent {
            if let Some(open) = active.remove(&tag) {
                close(&mut closed, tag, open, idx.saturating_sub(1), records);
            }
        }

        for tag in &current_tags {
            if !active.contains_key(*tag) {
                active.insert(
                    tag.to_string(),
                    OpenEvent {
                        start_idx: idx,
                        trigger_soc: record.analysis.soc,
                    },
                );
            }
        }
    }

    let last_idx = records.len().saturating_sub(1);
    for (tag, open) in active.into_iter() {
        close(&mut closed, tag, open, last_idx, records);
    }

    let mut events: Vec<AlertEvent> = closed
        .into_iter()
        .map(|(tag, group)| {
            let event_count = group.len();
            let total_occurrences: usize = group.iter().map(|e| e.occurrences).sum();
            let avg_duration_hours = group.iter().map(|e| e.duration_hours).sum::<f64>() / event_count as f64;
            let trigger_socs: Vec<f64> = group.iter().filter_map(|e| e.trigger_soc).collect();
            let avg_trigger_soc = (!trigger_socs.is_empty())
                .then(|| trigger_socs.iter().sum::<f64>() / trigger_socs.len() as f64);
            AlertEvent {
                tag,
                event_count,
                total_occurrences,
                avg_duration_hours,
                avg_trigger_soc,
            }
        })
        .collect();
    events.sort_by(|a, b| a.tag.cmp(&b.tag));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use chrono::{Duration, Utc};

    fn record(ts: chrono::DateTime<Utc>, soc: f64, alerts: &[&str]) -> HistoricalRecord {
        HistoricalRecord {
            system_id: "sys-1".into(),
            timestamp: ts,
            analysis: Snapshot {
                soc: Some(soc),
                ..Default::default()
            },
            weather: None,
            alerts: alerts.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn groups_consecutive_same_tag_into_one_event() {
        let t0 = Utc::now();
        let records = vec![
            record(t0, 20.0, &["low_soc"]),
            record(t0 + Duration::hours(1), 18.0, &["low_soc"]),
            record(t0 + Duration::hours(2), 16.0, &["low_soc"]),
            record(t0 + Duration::hours(3), 60.0, &[]),
        ];
        let events = group_alert_events(&records);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tag, "low_soc");
        assert_eq!(events[0].event_count, 1);
        assert_eq!(events[0].total_occurrences, 3);
    }

    #[test]
    fn grouping_is_idempotent() {
        let t0 = Utc::now();
        let records = vec![
            record(t0, 20.0, &["low_soc"]),
            record(t0 + Duration::hours(1), 55.0, &["low_soc"]),
            record(t0 + Duration::hours(2), 20.0, &["low_soc"]),
            record(t0 + Duration::hours(3), 19.0, &[]),
            record(t0 + Duration::hours(4), 19.0, &["low_soc"]),
        ];
        let first = group_alert_events(&records);
        let second = group_alert_events(&records);
        assert_eq!(first, second);
    }
}
