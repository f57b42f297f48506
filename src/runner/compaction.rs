//! Tool-result compaction (§4.F.2): a tool response carrying a large `data`
//! array is downsampled before it re-enters the conversation, so a single
//! wide-range telemetry pull doesn't blow the token budget on its own.

use serde_json::Value;

const LARGE_THRESHOLD: usize = 200;
const MEDIUM_THRESHOLD: usize = 150;
const LARGE_TARGET: usize = 80;
const MEDIUM_TARGET: usize = 100;

/// Evenly spaced indices across `[0, n)`, always including index 0 and
/// `n - 1` when `n > target`. Unlike a fixed stride, this lands on exactly
/// `target` indices regardless of how `n` and `target` divide.
fn evenly_spaced_indices(n: usize, target: usize) -> Vec<usize> {
    if n <= target || target <= 1 {
        return (0..n).collect();
    }
    (0..target).map(|i| i * (n - 1) / (target - 1)).collect()
}

fn stride_sample_values(items: &[Value], target: usize) -> Vec<Value> {
    evenly_spaced_indices(items.len(), target)
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

/// If `value` is an object with a `data` array longer than 200 elements,
/// resamples it to ~80 points; 150-200 elements resamples to at most 100.
/// Smaller arrays, or values with no `data` array, pass through unchanged.
/// A `note` field is added alongside a resampled `data`.
pub fn compact_tool_result(mut value: Value) -> Value {
    let len = match value.get("data").and_then(|d| d.as_array()).map(|a| a.len()) {
        Some(len) => len,
        None => return value,
    };

    let (target, note) = if len > LARGE_THRESHOLD {
        (
            LARGE_TARGET,
            format!(
                "resampled from {len} to ~{LARGE_TARGET} points; ask a more specific time range or metric for full resolution"
            ),
        )
    } else if len >= MEDIUM_THRESHOLD {
        (
            MEDIUM_TARGET,
            format!(
                "resampled from {len} to at most {MEDIUM_TARGET} points; ask a more specific time range or metric for full resolution"
            ),
        )
    } else {
        return value;
    };

    if let Some(obj) = value.as_object_mut() {
        if let Some(Value::Array(data)) = obj.get("data").cloned() {
            let sampled = stride_sample_values(&data, target);
            obj.insert("data".to_string(), Value::Array(sampled));
            obj.insert("note".to_string(), Value::String(note));
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data_value(n: usize) -> Value {
        let items: Vec<Value> = (0..n).map(|i| json!({"i": i})).collect();
        json!({ "data": items })
    }

    #[test]
    fn large_array_resamples_into_70_to_82_and_keeps_last() {
        let compacted = compact_tool_result(data_value(500));
        let data = compacted["data"].as_array().unwrap();
        assert!((70..=82).contains(&data.len()), "got {}", data.len());
        assert_eq!(data.last().unwrap()["i"], json!(499));
        assert!(compacted["note"].is_string());
    }

    #[test]
    fn boundary_just_above_200_still_lands_in_range() {
        let compacted = compact_tool_result(data_value(201));
        let data = compacted["data"].as_array().unwrap();
        assert!((70..=82).contains(&data.len()), "got {}", data.len());
    }

    #[test]
    fn medium_array_resamples_to_at_most_101() {
        let compacted = compact_tool_result(data_value(180));
        let data = compacted["data"].as_array().unwrap();
        assert!(data.len() <= 101);
    }

    #[test]
    fn small_array_passes_through_unchanged() {
        let original = data_value(50);
        let compacted = compact_tool_result(original.clone());
        assert_eq!(compacted, original);
    }

    #[test]
    fn values_without_data_array_pass_through() {
        let original = json!({ "voltage": 52.1 });
        assert_eq!(compact_tool_result(original.clone()), original);
    }
}
