//! Sentiment polarity from VADER compound scores

use serde::{Deserialize, Serialize};
use std::fmt;
use vader_sentiment::SentimentIntensityAnalyzer;

/// Compound scores at or above this are positive, at or below its negation negative
pub const POLARITY_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

impl Polarity {
    pub fn from_compound(compound: f64) -> Self {
        if compound >= POLARITY_THRESHOLD {
            Polarity::Positive
        } else if compound <= -POLARITY_THRESHOLD {
            Polarity::Negative
        } else {
            Polarity::Neutral
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Positive => write!(f, "positive"),
            Polarity::Negative => write!(f, "negative"),
            Polarity::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    /// Normalized to [-1, 1]
    pub compound: f64,
    pub polarity: Polarity,
}

/// Bucket counts over the non-blank items of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub total_analyzed: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub positive_ratio: f64,
    pub average_compound: f64,
}

impl SentimentSummary {
    pub fn percentage(&self, polarity: Polarity) -> f64 {
        if self.total_analyzed == 0 {
            return 0.0;
        }
        let count = match polarity {
            Polarity::Positive => self.positive,
            Polarity::Negative => self.negative,
            Polarity::Neutral => self.neutral,
        };
        count as f64 / self.total_analyzed as f64 * 100.0
    }
}

/// Stateless VADER scorer; the lexicon is shared process-wide by the crate
#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentScorer;

impl SentimentScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score one text; blank input yields `None` and is never counted
    pub fn score(&self, text: &str) -> Option<SentimentScore> {
        if text.trim().is_empty() {
            return None;
        }
        let compound = SentimentIntensityAnalyzer::new()
            .polarity_scores(text)
            .get("compound")
            .copied()
            .unwrap_or(0.0)
            .clamp(-1.0, 1.0);
        Some(SentimentScore {
            compound,
            polarity: Polarity::from_compound(compound),
        })
    }

    /// Score every non-blank text and bucket the results
    pub fn summarize<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> SentimentSummary {
        let mut summary = SentimentSummary::default();
        let mut compound_sum = 0.0;

        for score in texts.into_iter().filter_map(|t| self.score(t)) {
            summary.total_analyzed += 1;
            compound_sum += score.compound;
            match score.polarity {
                Polarity::Positive => summary.positive += 1,
                Polarity::Negative => summary.negative += 1,
                Polarity::Neutral => summary.neutral += 1,
            }
        }

        if summary.total_analyzed > 0 {
            let n = summary.total_analyzed as f64;
            summary.positive_ratio = summary.positive as f64 / n;
            summary.average_compound = compound_sum / n;
        }
        tracing::debug!(
            analyzed = summary.total_analyzed,
            positive = summary.positive,
            negative = summary.negative,
            "sentiment batch scored"
        );
        summary
    }
}
