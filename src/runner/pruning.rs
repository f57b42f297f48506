//! History pruning (§4.F.1): keeps the initial prompt and the last four
//! messages verbatim, stride-sampling the middle so the estimated token
//! count fits `conversation_token_limit`.

use tracing::info;

use crate::domain::Turn;

const TAIL_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruneReport {
    pub before_tokens: usize,
    pub after_tokens: usize,
    pub pruned: bool,
}

fn estimate_tokens(turns: &[Turn], tokens_per_char: f64) -> usize {
    turns.iter().map(|t| (t.content.len() as f64 * tokens_per_char).ceil() as usize).sum()
}

fn stride_sample_turns(turns: &[Turn], stride: usize) -> Vec<Turn> {
    turns.iter().step_by(stride.max(1)).cloned().collect()
}

/// Prunes `history` to fit under `token_limit`. Returns the (possibly)
/// unchanged history plus a before/after token report; the first message
/// and the last four are always retained verbatim, so tool-result content
/// referenced by the last four messages is never dropped.
pub fn prune_history(history: &[Turn], token_limit: usize, tokens_per_char: f64) -> (Vec<Turn>, PruneReport) {
    let before_tokens = estimate_tokens(history, tokens_per_char);
    if before_tokens <= token_limit || history.len() <= TAIL_SIZE + 1 {
        return (
            history.to_vec(),
            PruneReport {
                before_tokens,
                after_tokens: before_tokens,
                pruned: false,
            },
        );
    }

    let first = history[0].clone();
    let tail_start = history.len() - TAIL_SIZE;
    let tail = history[tail_start..].to_vec();
    let middle = &history[1..tail_start];

    let reserved = estimate_tokens(std::slice::from_ref(&first), tokens_per_char)
        + estimate_tokens(&tail, tokens_per_char);
    let middle_budget = token_limit.saturating_sub(reserved);

    let mut kept_middle = middle.to_vec();
    let mut stride = 1usize;
    while estimate_tokens(&kept_middle, tokens_per_char) > middle_budget && stride <= middle.len().max(1) {
        stride += 1;
        kept_middle = stride_sample_turns(middle, stride);
    }
    if middle_budget == 0 {
        kept_middle.clear();
    }

    let mut pruned = Vec::with_capacity(1 + kept_middle.len() + tail.len());
    pruned.push(first);
    pruned.extend(kept_middle);
    pruned.extend(tail);

    let after_tokens = estimate_tokens(&pruned, tokens_per_char);
    info!(before_tokens, after_tokens, "pruned conversation history");

    (
        pruned,
        PruneReport {
            before_tokens,
            after_tokens,
            pruned: true,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Turn;

    fn long_history(n: usize) -> Vec<Turn> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user("x".repeat(200))
                } else {
                    Turn::assistant("y".repeat(200))
                }
            })
            .collect()
    }

    #[test]
    fn short_history_is_returned_unchanged() {
        let history = long_history(3);
        let (pruned, report) = prune_history(&history, 100_000, 0.25);
        assert_eq!(pruned, history);
        assert!(!report.pruned);
    }

    #[test]
    fn pruning_keeps_first_and_last_four_verbatim() {
        let history = long_history(40);
        let (pruned, report) = prune_history(&history, 500, 0.25);
        assert!(report.pruned);
        assert_eq!(pruned.first(), history.first());
        assert_eq!(&pruned[pruned.len() - 4..], &history[history.len() - 4..]);
        assert!(report.after_tokens <= report.before_tokens);
    }
}
