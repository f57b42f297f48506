//! Unparseable- and empty-response recovery (§4.F.3, §4.F.4): the ladders
//! the runner falls back on when the model doesn't emit a clean JSON
//! tool-call or final-answer envelope.

use crate::domain::Turn;

const DATA_NEED_PHRASES: &[&str] = &["need more data", "insufficient", "let me request"];
const SUBSTANTIAL_TEXT_MIN_LEN: usize = 100;
const EMPTY_RESPONSE_STRIKE_LIMIT: u32 = 2;

pub const JSON_SHAPE_REMINDER: &str = "Respond with exactly one JSON value: either \
    {\"tool_call\": \"<name>\", \"parameters\": {...}} or {\"final_answer\": \"<markdown>\"}.";

pub const EMPTY_RESPONSE_MARKER: &str = "[empty-response-reminder]";

#[derive(Debug, Clone, PartialEq)]
pub enum UnparseableOutcome {
    /// The model asked for more data in prose; restate the JSON shape and
    /// demand a re-emit.
    RequestedDataShape { history_additions: Vec<Turn> },
    /// The text was long enough to stand on its own; treat it as the final
    /// answer.
    TreatAsFinal(String),
    /// Too short to be useful; demand valid JSON and continue.
    DemandJson { history_additions: Vec<Turn> },
}

fn mentions_data_need(text: &str) -> bool {
    let lower = text.to_lowercase();
    DATA_NEED_PHRASES.iter().any(|p| lower.contains(p))
}

/// §4.F.3: classifies a non-empty, unparseable model response and produces
/// the history turns (if any) the runner should append before continuing.
pub fn recover_unparseable(text: &str) -> UnparseableOutcome {
    if mentions_data_need(text) {
        return UnparseableOutcome::RequestedDataShape {
            history_additions: vec![
                Turn::assistant(text),
                Turn::user(format!("{JSON_SHAPE_REMINDER} Restate your data request in that exact shape.")),
            ],
        };
    }

    if text.trim().len() >= SUBSTANTIAL_TEXT_MIN_LEN {
        return UnparseableOutcome::TreatAsFinal(text.to_string());
    }

    UnparseableOutcome::DemandJson {
        history_additions: vec![
            Turn::assistant(text),
            Turn::user(format!("{JSON_SHAPE_REMINDER} Your last response was not valid JSON.")),
        ],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmptyResponseOutcome {
    Reminder { history_addition: Turn },
    Unresponsive { consecutive_empty: u32 },
}

fn count_recent_empty_reminders(history: &[Turn]) -> u32 {
    history
        .iter()
        .rev()
        .take(EMPTY_RESPONSE_STRIKE_LIMIT as usize * 2)
        .filter(|t| t.content.contains(EMPTY_RESPONSE_MARKER))
        .count() as u32
}

/// §4.F.4: an empty model response gets one forceful reminder per strike;
/// after two such reminders already sit in recent history, the runner
/// aborts with a typed `ModelUnresponsive` error.
pub fn recover_empty(history: &[Turn], iteration: usize) -> EmptyResponseOutcome {
    let recent_strikes = count_recent_empty_reminders(history);
    if recent_strikes >= EMPTY_RESPONSE_STRIKE_LIMIT {
        return EmptyResponseOutcome::Unresponsive {
            consecutive_empty: recent_strikes + 1,
        };
    }

    EmptyResponseOutcome::Reminder {
        history_addition: Turn::user(format!(
            "{EMPTY_RESPONSE_MARKER} Iteration {iteration}: you returned an empty response. \
             Emit a tool_call or a final_answer as JSON now."
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_need_phrase_restates_json_shape() {
        let outcome = recover_unparseable("I need more data before I can answer.");
        assert!(matches!(outcome, UnparseableOutcome::RequestedDataShape { .. }));
    }

    #[test]
    fn substantial_text_is_treated_as_final() {
        let text = "a".repeat(150);
        assert_eq!(recover_unparseable(&text), UnparseableOutcome::TreatAsFinal(text));
    }

    #[test]
    fn short_non_json_demands_json() {
        let outcome = recover_unparseable("oops");
        assert!(matches!(outcome, UnparseableOutcome::DemandJson { .. }));
    }

    #[test]
    fn two_prior_reminders_trips_unresponsive() {
        let history = vec![
            Turn::user(format!("{EMPTY_RESPONSE_MARKER} Iteration 1")),
            Turn::user(format!("{EMPTY_RESPONSE_MARKER} Iteration 2")),
        ];
        assert!(matches!(
            recover_empty(&history, 3),
            EmptyResponseOutcome::Unresponsive { .. }
        ));
    }

    #[test]
    fn first_strike_is_a_reminder() {
        assert!(matches!(recover_empty(&[], 1), EmptyResponseOutcome::Reminder { .. }));
    }
}
