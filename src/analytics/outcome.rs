use serde::{Deserialize, Serialize};

/// Result shape shared by every kernel analysis: either a typed result, or
/// an explicit statement of how much data was required versus how much was
/// available. Never a sentinel empty value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome<T> {
    Ok(T),
    InsufficientData {
        minimum_required: usize,
        actual: usize,
        reason: String,
    },
}

impl<T> AnalysisOutcome<T> {
    pub fn insufficient(minimum_required: usize, actual: usize, reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            minimum_required,
            actual,
            reason: reason.into(),
        }
    }

    pub fn require(actual: usize, minimum_required: usize, reason: &str) -> Option<Self> {
        if actual < minimum_required {
            Some(Self::insufficient(minimum_required, actual, reason))
        } else {
            None
        }
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            Self::Ok(v) => Some(v),
            Self::InsufficientData { .. } => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}
