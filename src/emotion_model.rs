//! Transformer emotion classifier run through ONNX Runtime.
//!
//! Expects a sequence-classification export (for example the distilroberta
//! emotion checkpoint) taking `input_ids` and `attention_mask` and producing
//! one logit per label, plus the matching Hugging Face `tokenizer.json`.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};

use crate::emotion::{Emotion, EmotionClassifier, EmotionScores};
use crate::error::{AnalyticsError, Result};

/// Longest token sequence the model accepts
const MAX_TOKENS: usize = 512;

pub struct OnnxEmotionClassifier {
    /// `Session::run` takes `&mut self`
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: Vec<Option<Emotion>>,
    name: String,
}

impl OnnxEmotionClassifier {
    pub fn load(model_path: &Path, tokenizer_path: &Path, labels: &[String]) -> Result<Self> {
        let not_loaded = |reason: String| {
            AnalyticsError::ModelNotLoaded(format!("{}: {}", model_path.display(), reason))
        };

        if !model_path.exists() {
            return Err(not_loaded("model file not found".to_string()));
        }
        let labels: Vec<Option<Emotion>> = labels.iter().map(|l| Emotion::from_label(l)).collect();
        if labels.iter().all(Option::is_none) {
            return Err(not_loaded("no model label maps to an emotion".to_string()));
        }

        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            not_loaded(format!("tokenizer {}: {}", tokenizer_path.display(), e))
        })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..TruncationParams::default()
            }))
            .map_err(|e| not_loaded(format!("tokenizer truncation: {}", e)))?;

        let session = Session::builder()
            .map_err(|e| not_loaded(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| not_loaded(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| not_loaded(e.to_string()))?;

        let name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx-emotion-model")
            .to_string();
        tracing::debug!(model = %name, labels = labels.len(), "ONNX emotion model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            labels,
            name,
        })
    }

    fn logits(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| AnalyticsError::Inference(format!("tokenization failed: {}", e)))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let shape = vec![1i64, input_ids.len() as i64];

        let ids_tensor = Tensor::from_array((shape.clone(), input_ids))
            .map_err(|e| AnalyticsError::Inference(format!("tensor creation error: {}", e)))?;
        let mask_tensor = Tensor::from_array((shape, attention_mask))
            .map_err(|e| AnalyticsError::Inference(format!("tensor creation error: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| AnalyticsError::Inference(format!("session lock poisoned: {}", e)))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])
            .map_err(|e| AnalyticsError::Inference(e.to_string()))?;

        let (_name, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| AnalyticsError::Inference("no output tensor".to_string()))?;
        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalyticsError::Inference(format!("tensor extraction failed: {}", e)))?;

        if data.len() != self.labels.len() {
            return Err(AnalyticsError::Inference(format!(
                "model produced {} logits for {} labels",
                data.len(),
                self.labels.len()
            )));
        }
        Ok(data.to_vec())
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, text: &str) -> Result<EmotionScores> {
        let logits = self.logits(text)?;
        Ok(scores_from_logits(&logits, &self.labels))
    }
}

/// Softmax over the logits; labels without a category add to the neutral mass
pub(crate) fn scores_from_logits(logits: &[f32], labels: &[Option<Emotion>]) -> EmotionScores {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut masses = [0.0; 6];
    let mut neutral = 0.0;
    for (&logit, label) in logits.iter().zip(labels) {
        let mass = f64::from(logit - max).exp();
        match label {
            Some(emotion) => masses[emotion.index()] += mass,
            None => neutral += mass,
        }
    }
    EmotionScores::from_masses(masses, neutral)
}
