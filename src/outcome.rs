//! Result of one sub-analysis inside a combined report

use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;

/// Either the sub-analysis output or the reason it could not be produced.
///
/// Combined reports keep going when one section fails and mark that section
/// unavailable instead of dropping it silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum AnalysisOutcome<T> {
    Completed(T),
    Unavailable { kind: String, reason: String },
}

impl<T> AnalysisOutcome<T> {
    pub fn unavailable(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisOutcome::Unavailable {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed(_))
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            AnalysisOutcome::Completed(value) => Some(value),
            AnalysisOutcome::Unavailable { .. } => None,
        }
    }
}

impl<T> From<Result<T, AnalyticsError>> for AnalysisOutcome<T> {
    fn from(result: Result<T, AnalyticsError>) -> Self {
        match result {
            Ok(value) => AnalysisOutcome::Completed(value),
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "sub-analysis unavailable");
                AnalysisOutcome::Unavailable {
                    kind: err.kind().to_string(),
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error_keeps_reason() {
        let outcome: AnalysisOutcome<u32> =
            Err(AnalyticsError::ModelNotLoaded("lexicon missing".to_string())).into();
        match outcome {
            AnalysisOutcome::Unavailable { kind, reason } => {
                assert_eq!(kind, "model_not_loaded");
                assert!(reason.contains("lexicon missing"));
            }
            AnalysisOutcome::Completed(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn test_serializes_with_status_tag() {
        let outcome: AnalysisOutcome<u32> = AnalysisOutcome::Completed(3);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["data"], 3);
        assert_eq!(outcome.completed(), Some(&3));
    }
}
