//! Six-category emotion scoring with a pluggable classifier.
//!
//! The classifier is loaded once and shared read-only. When it cannot be
//! loaded the scorer stays usable but reports itself as not loaded, and every
//! analysis fails with [`AnalyticsError::ModelNotLoaded`] instead of taking
//! the rest of the pipeline down.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::EmotionConfig;
use crate::emotion_model::OnnxEmotionClassifier;
use crate::error::{AnalyticsError, Result};
use crate::growth::GrowthStage;
use crate::sentiment::{SentimentScorer, SentimentSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Love,
}

impl Emotion {
    pub const ALL: [Emotion; 6] = [
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Love,
    ];

    /// Map a classifier output label onto a category; other labels are neutral mass
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "joy" => Some(Emotion::Joy),
            "sadness" => Some(Emotion::Sadness),
            "anger" => Some(Emotion::Anger),
            "fear" => Some(Emotion::Fear),
            "surprise" => Some(Emotion::Surprise),
            "love" => Some(Emotion::Love),
            _ => None,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Emotion::Joy => "joy",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Love => "love",
        };
        f.pad(name)
    }
}

/// Probability mass over the six emotions plus neutral; sums to one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionScores {
    intensities: [f64; 6],
    neutral: f64,
}

impl EmotionScores {
    /// Normalize raw non-negative masses into a distribution
    pub fn from_masses(intensities: [f64; 6], neutral: f64) -> Self {
        let total: f64 = intensities.iter().sum::<f64>() + neutral;
        if total <= 0.0 {
            return Self {
                intensities: [0.0; 6],
                neutral: 1.0,
            };
        }
        Self {
            intensities: intensities.map(|v| v / total),
            neutral: neutral / total,
        }
    }

    pub fn get(&self, emotion: Emotion) -> f64 {
        self.intensities[emotion.index()]
    }

    pub fn neutral(&self) -> f64 {
        self.neutral
    }

    /// Highest-scoring label, `None` when neutral wins
    pub fn top(&self) -> Option<Emotion> {
        let (emotion, score) = Emotion::ALL
            .iter()
            .map(|&e| (e, self.get(e)))
            .fold((Emotion::Joy, f64::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        (score > self.neutral).then_some(emotion)
    }
}

/// Anything that can score a text over the six emotions
pub trait EmotionClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, text: &str) -> Result<EmotionScores>;
}

const NEUTRAL_LOGIT: f64 = 1.0;

const EMBEDDED_LEXICON: &[(&str, Emotion, f64)] = &[
    ("happy", Emotion::Joy, 2.2),
    ("joy", Emotion::Joy, 2.4),
    ("excited", Emotion::Joy, 2.0),
    ("thrilled", Emotion::Joy, 2.4),
    ("proud", Emotion::Joy, 2.0),
    ("celebrate", Emotion::Joy, 2.0),
    ("fun", Emotion::Joy, 1.6),
    ("great", Emotion::Joy, 1.5),
    ("amazing", Emotion::Joy, 1.6),
    ("awesome", Emotion::Joy, 1.6),
    ("achievement", Emotion::Joy, 1.8),
    ("reached", Emotion::Joy, 1.0),
    ("hit", Emotion::Joy, 0.6),
    ("achieved", Emotion::Joy, 1.4),
    ("grateful", Emotion::Joy, 1.8),
    ("vibes", Emotion::Joy, 1.2),
    ("sad", Emotion::Sadness, 2.4),
    ("miss", Emotion::Sadness, 1.6),
    ("lonely", Emotion::Sadness, 2.2),
    ("cry", Emotion::Sadness, 2.0),
    ("crying", Emotion::Sadness, 2.0),
    ("tears", Emotion::Sadness, 1.6),
    ("heartbroken", Emotion::Sadness, 2.6),
    ("disappointed", Emotion::Sadness, 2.0),
    ("tired", Emotion::Sadness, 1.2),
    ("discouraged", Emotion::Sadness, 2.0),
    ("struggling", Emotion::Sadness, 1.6),
    ("angry", Emotion::Anger, 2.5),
    ("hate", Emotion::Anger, 2.4),
    ("annoying", Emotion::Anger, 1.8),
    ("annoyed", Emotion::Anger, 1.8),
    ("frustrated", Emotion::Anger, 2.0),
    ("frustrating", Emotion::Anger, 2.0),
    ("furious", Emotion::Anger, 2.8),
    ("worst", Emotion::Anger, 1.8),
    ("trash", Emotion::Anger, 1.6),
    ("scared", Emotion::Fear, 2.4),
    ("afraid", Emotion::Fear, 2.4),
    ("nervous", Emotion::Fear, 2.0),
    ("anxious", Emotion::Fear, 2.2),
    ("worried", Emotion::Fear, 2.0),
    ("terrified", Emotion::Fear, 2.8),
    ("overwhelmed", Emotion::Fear, 1.6),
    ("uncertain", Emotion::Fear, 1.4),
    ("wow", Emotion::Surprise, 2.4),
    ("surprised", Emotion::Surprise, 2.4),
    ("unexpected", Emotion::Surprise, 2.2),
    ("shocked", Emotion::Surprise, 2.4),
    ("omg", Emotion::Surprise, 2.2),
    ("unbelievable", Emotion::Surprise, 2.2),
    ("whoa", Emotion::Surprise, 2.2),
    ("suddenly", Emotion::Surprise, 1.4),
    ("love", Emotion::Love, 2.6),
    ("loved", Emotion::Love, 2.4),
    ("adore", Emotion::Love, 2.6),
    ("beautiful", Emotion::Love, 2.0),
    ("heart", Emotion::Love, 1.4),
    ("favorite", Emotion::Love, 1.6),
    ("favourite", Emotion::Love, 1.6),
    ("gorgeous", Emotion::Love, 2.0),
    ("obsessed", Emotion::Love, 1.8),
    ("thank", Emotion::Love, 1.2),
    ("thanks", Emotion::Love, 1.2),
];

/// Word-level emotion lexicon scored through a softmax against a neutral baseline
#[derive(Debug, Clone)]
pub struct LexiconEmotionClassifier {
    name: String,
    lexicon: HashMap<String, (Emotion, f64)>,
}

impl LexiconEmotionClassifier {
    pub fn embedded() -> Self {
        Self {
            name: "embedded-emotion-lexicon".to_string(),
            lexicon: EMBEDDED_LEXICON
                .iter()
                .map(|&(word, emotion, weight)| (word.to_string(), (emotion, weight)))
                .collect(),
        }
    }

    /// Load a lexicon shaped as `{"joy": {"word": weight, ...}, ...}`
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let table: HashMap<Emotion, HashMap<String, f64>> = serde_json::from_str(&raw)?;

        let mut lexicon = HashMap::new();
        for (emotion, words) in table {
            for (word, weight) in words {
                lexicon.insert(word.to_lowercase(), (emotion, weight));
            }
        }
        if lexicon.is_empty() {
            return Err(AnalyticsError::ModelNotLoaded(format!(
                "lexicon {} has no entries",
                path.display()
            )));
        }

        Ok(Self {
            name: path.display().to_string(),
            lexicon,
        })
    }

    pub fn len(&self) -> usize {
        self.lexicon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lexicon.is_empty()
    }
}

impl EmotionClassifier for LexiconEmotionClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, text: &str) -> Result<EmotionScores> {
        let mut logits = [0.0; 6];
        for token in text.split_whitespace() {
            let word = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if let Some(&(emotion, weight)) = self.lexicon.get(&word) {
                logits[emotion.index()] += weight;
            }
        }

        let max = logits.iter().copied().fold(NEUTRAL_LOGIT, f64::max);
        let masses = logits.map(|l| (l - max).exp());
        Ok(EmotionScores::from_masses(masses, (NEUTRAL_LOGIT - max).exp()))
    }
}

#[derive(Clone)]
enum ClassifierState {
    Loaded(Arc<dyn EmotionClassifier>),
    NotLoaded { reason: String },
}

impl fmt::Debug for ClassifierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierState::Loaded(classifier) => {
                f.debug_tuple("Loaded").field(&classifier.name()).finish()
            }
            ClassifierState::NotLoaded { reason } => {
                f.debug_struct("NotLoaded").field("reason", reason).finish()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub classifier: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionStat {
    /// Mean score over every analyzed item
    pub average_intensity: f64,
    /// Items whose top label is this emotion
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DominantEmotion {
    pub emotion: Emotion,
    pub percentage: f64,
    pub intensity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    PositiveConnection,
    Concern,
    ViralPotential,
    NuancedSentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionInsight {
    pub kind: InsightKind,
    pub message: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionAnalysis {
    pub total_analyzed: usize,
    pub distribution: BTreeMap<Emotion, EmotionStat>,
    pub sentiment: SentimentSummary,
    pub dominant_emotion: Option<DominantEmotion>,
    pub insights: Vec<EmotionInsight>,
}

impl EmotionAnalysis {
    pub fn stat(&self, emotion: Emotion) -> EmotionStat {
        self.distribution.get(&emotion).copied().unwrap_or_default()
    }

    pub fn percentage(&self, emotion: Emotion) -> f64 {
        self.stat(emotion).percentage
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSummary<T> {
    pub approach: String,
    pub technique: String,
    pub results: T,
}

/// Side-by-side description of the lexicon sentiment and the emotion classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodologyComparison {
    pub sentiment: MethodSummary<SentimentSummary>,
    pub emotion_model: MethodSummary<BTreeMap<Emotion, EmotionStat>>,
    pub key_differences: Vec<String>,
}

/// Shared entry point for emotion analysis
#[derive(Debug, Clone)]
pub struct EmotionScorer {
    state: ClassifierState,
    sentiment: SentimentScorer,
    max_chars: usize,
}

impl EmotionScorer {
    pub fn new(classifier: Arc<dyn EmotionClassifier>, max_chars: usize) -> Self {
        Self {
            state: ClassifierState::Loaded(classifier),
            sentiment: SentimentScorer::new(),
            max_chars,
        }
    }

    pub fn not_loaded(reason: impl Into<String>) -> Self {
        Self {
            state: ClassifierState::NotLoaded {
                reason: reason.into(),
            },
            sentiment: SentimentScorer::new(),
            max_chars: EmotionConfig::default().max_chars,
        }
    }

    /// Load the configured ONNX model, else the configured lexicon, else the
    /// embedded lexicon.
    ///
    /// A load failure is logged and leaves the scorer in the not-loaded state.
    pub fn from_config(config: &EmotionConfig) -> Self {
        let classifier = load_classifier(config);

        match classifier {
            Ok(classifier) => {
                tracing::info!(classifier = classifier.name(), "emotion classifier loaded");
                Self::new(classifier, config.max_chars)
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not load emotion classifier");
                let mut scorer = Self::not_loaded(err.to_string());
                scorer.max_chars = config.max_chars;
                scorer
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ClassifierState::Loaded(_))
    }

    pub fn status(&self) -> ModelStatus {
        match &self.state {
            ClassifierState::Loaded(classifier) => ModelStatus {
                loaded: true,
                classifier: Some(classifier.name().to_string()),
                reason: None,
            },
            ClassifierState::NotLoaded { reason } => ModelStatus {
                loaded: false,
                classifier: None,
                reason: Some(reason.clone()),
            },
        }
    }

    fn classifier(&self) -> Result<&Arc<dyn EmotionClassifier>> {
        match &self.state {
            ClassifierState::Loaded(classifier) => Ok(classifier),
            ClassifierState::NotLoaded { reason } => {
                Err(AnalyticsError::ModelNotLoaded(reason.clone()))
            }
        }
    }

    /// Score every non-blank text and aggregate per emotion
    pub fn analyze<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> Result<EmotionAnalysis> {
        let classifier = self.classifier()?;

        let mut intensities: [Vec<f64>; 6] = Default::default();
        let mut top_counts = [0usize; 6];
        let mut kept: Vec<String> = Vec::new();

        for text in texts {
            let truncated: String = text.chars().take(self.max_chars).collect();
            if truncated.trim().is_empty() {
                continue;
            }
            let scores = match classifier.classify(&truncated) {
                Ok(scores) => scores,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping text the classifier rejected");
                    continue;
                }
            };
            for emotion in Emotion::ALL {
                intensities[emotion.index()].push(scores.get(emotion));
            }
            if let Some(top) = scores.top() {
                top_counts[top.index()] += 1;
            }
            kept.push(truncated);
        }

        if kept.is_empty() {
            return Err(AnalyticsError::InputDataEmpty(
                "No text data provided".to_string(),
            ));
        }

        let total = kept.len();
        let distribution: BTreeMap<Emotion, EmotionStat> = Emotion::ALL
            .iter()
            .map(|&emotion| {
                let values = &intensities[emotion.index()];
                let count = top_counts[emotion.index()];
                let stat = EmotionStat {
                    average_intensity: values.iter().sum::<f64>() / values.len() as f64,
                    count,
                    percentage: count as f64 / total as f64 * 100.0,
                };
                (emotion, stat)
            })
            .collect();

        let sentiment = self.sentiment.summarize(kept.iter().map(String::as_str));

        let dominant_emotion = Emotion::ALL
            .iter()
            .map(|e| (*e, distribution[e]))
            .filter(|(_, stat)| stat.count > 0)
            .fold(None, |best: Option<(Emotion, EmotionStat)>, cur| match best {
                Some(b) if b.1.count >= cur.1.count => Some(b),
                _ => Some(cur),
            })
            .map(|(emotion, stat)| DominantEmotion {
                emotion,
                percentage: stat.percentage,
                intensity: stat.average_intensity,
            });

        let insights = emotion_insights(&distribution, &sentiment);
        tracing::info!(
            analyzed = total,
            dominant = ?dominant_emotion.map(|d| d.emotion),
            insights = insights.len(),
            "emotion analysis complete"
        );

        Ok(EmotionAnalysis {
            total_analyzed: total,
            distribution,
            sentiment,
            dominant_emotion,
            insights,
        })
    }

    /// Run both methods on the same texts and describe how they differ
    pub fn compare_methods<'a>(
        &self,
        texts: impl IntoIterator<Item = &'a str>,
    ) -> Result<MethodologyComparison> {
        let analysis = self.analyze(texts)?;
        Ok(MethodologyComparison {
            sentiment: MethodSummary {
                approach: "3-way classification (positive/neutral/negative)".to_string(),
                technique: "VADER lexicon with intensity rules".to_string(),
                results: analysis.sentiment,
            },
            emotion_model: MethodSummary {
                approach: "6-way emotion detection".to_string(),
                technique: format!("Emotion classifier ({})", self.classifier()?.name()),
                results: analysis.distribution,
            },
            key_differences: vec![
                "Lexicon sentiment is faster but less nuanced".to_string(),
                "Emotion model captures subtle feelings (love, surprise, fear)".to_string(),
                "Emotion categories show the kind of connection, not only its direction"
                    .to_string(),
                "Combined approach provides comprehensive sentiment picture".to_string(),
            ],
        })
    }
}

fn load_classifier(config: &EmotionConfig) -> Result<Arc<dyn EmotionClassifier>> {
    if let Some(model) = &config.model_path {
        let tokenizer = config
            .tokenizer_path
            .clone()
            .unwrap_or_else(|| model.with_file_name("tokenizer.json"));
        let classifier = OnnxEmotionClassifier::load(model, &tokenizer, &config.model_labels)?;
        return Ok(Arc::new(classifier));
    }
    let lexicon = match &config.lexicon_path {
        Some(path) => LexiconEmotionClassifier::from_json_file(path)?,
        None => LexiconEmotionClassifier::embedded(),
    };
    Ok(Arc::new(lexicon))
}

fn emotion_insights(
    distribution: &BTreeMap<Emotion, EmotionStat>,
    sentiment: &SentimentSummary,
) -> Vec<EmotionInsight> {
    let pct = |e: Emotion| distribution.get(&e).map(|s| s.percentage).unwrap_or(0.0);
    let mut insights = Vec::new();

    let warm = pct(Emotion::Joy) + pct(Emotion::Love);
    if warm > 60.0 {
        insights.push(EmotionInsight {
            kind: InsightKind::PositiveConnection,
            message: format!("Strong emotional connection: {:.0}% express joy or love", warm),
            action: "Leverage this emotional bond in fan engagement campaigns".to_string(),
        });
    }

    let negative = pct(Emotion::Anger) + pct(Emotion::Sadness);
    if negative > 30.0 {
        insights.push(EmotionInsight {
            kind: InsightKind::Concern,
            message: format!("{:.0}% express negative emotions", negative),
            action: "Investigate concerns, engage in community dialogue".to_string(),
        });
    }

    let surprise = pct(Emotion::Surprise);
    if surprise > 20.0 {
        insights.push(EmotionInsight {
            kind: InsightKind::ViralPotential,
            message: format!("{:.0}% express surprise - indicates unexpected impact", surprise),
            action: "Content is generating buzz - amplify reach now".to_string(),
        });
    }

    let positive = sentiment.percentage(crate::sentiment::Polarity::Positive);
    if (positive - warm).abs() > 15.0 {
        insights.push(EmotionInsight {
            kind: InsightKind::NuancedSentiment,
            message: "Emotion analysis reveals nuances beyond basic sentiment".to_string(),
            action: "Use detailed emotions for targeted content strategy".to_string(),
        });
    }

    insights
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotivationLevel {
    High,
    Moderate,
    NeedsBoost,
}

impl MotivationLevel {
    /// Mean intensity of joy, love and surprise: > 0.7 high, > 0.4 moderate
    pub fn from_analysis(analysis: &EmotionAnalysis) -> Self {
        let score = (analysis.stat(Emotion::Joy).average_intensity
            + analysis.stat(Emotion::Love).average_intensity
            + analysis.stat(Emotion::Surprise).average_intensity)
            / 3.0;
        if score > 0.7 {
            MotivationLevel::High
        } else if score > 0.4 {
            MotivationLevel::Moderate
        } else {
            MotivationLevel::NeedsBoost
        }
    }

    pub fn tips(self) -> Vec<&'static str> {
        match self {
            MotivationLevel::High => vec![
                "Your energy is contagious! Keep creating.",
                "This is your moment - stay consistent.",
                "Channel this momentum into your next release.",
            ],
            MotivationLevel::Moderate => vec![
                "You're on the right track. Trust the process.",
                "Growth takes time. Celebrate small wins.",
                "Connect with other artists for support.",
            ],
            MotivationLevel::NeedsBoost => vec![
                "Remember why you started making music.",
                "Every successful artist had tough days.",
                "Focus on creating - the numbers will follow.",
                "Reach out to your mentor or support network.",
            ],
        }
    }
}

/// Whether the dominant emotion fits what is expected at this growth stage
pub fn stage_appropriate(dominant: Option<Emotion>, stage: GrowthStage) -> bool {
    match stage {
        GrowthStage::Early => matches!(
            dominant,
            Some(Emotion::Joy | Emotion::Surprise | Emotion::Love)
        ),
        GrowthStage::Growing => true,
        GrowthStage::Established => matches!(dominant, Some(Emotion::Joy | Emotion::Love)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyInsights {
    /// `None` when no text had an emotional top label
    pub overall_mood: Option<Emotion>,
    pub stage_appropriate: bool,
    pub motivation_level: MotivationLevel,
    pub motivation_tips: Vec<String>,
}

pub fn journey_insights(analysis: &EmotionAnalysis, stage: GrowthStage) -> JourneyInsights {
    let overall_mood = analysis.dominant_emotion.map(|d| d.emotion);
    let motivation_level = MotivationLevel::from_analysis(analysis);
    JourneyInsights {
        overall_mood,
        stage_appropriate: stage_appropriate(overall_mood, stage),
        motivation_level,
        motivation_tips: motivation_level.tips().into_iter().map(String::from).collect(),
    }
}
