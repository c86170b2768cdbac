//! Wire contract of the inference backend's `POST /predict` endpoint and the
//! mapping from its JSON body into a [`DiagnosisResult`].
//!
//! The backend has shipped two advice shapes: `advice.explanation` and the
//! flat `advice.full_advice`. [`AdviceVariant`] picks which one is read so the
//! rest of the flow never sees the difference.

use serde::{Deserialize, Serialize};

use crate::error::PredictError;

/// Substituted when the configured advice field is absent.
pub const MISSING_ADVICE_TEXT: &str = "No detailed advice was returned for this diagnosis.";

/// Markers the backend puts in `source` when the vision-language stage
/// produced the answer. Both spellings have been observed.
pub const VISION_FALLBACK_MARKERS: [&str; 2] = ["vision-llm", "BLIP"];

/// Alternatives shown next to the primary diagnosis.
pub const MAX_ALTERNATIVES: usize = 3;

/// Raw response body. Every field is optional so that a declined response
/// (`{"success": false}`) still decodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub cnn_predictions: Option<CnnPredictions>,
    #[serde(default)]
    pub advice: Option<AdviceBody>,
    #[serde(default)]
    pub visual_description: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Reason reported alongside `success: false`.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CnnPredictions {
    #[serde(default)]
    pub top_3_predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub disease: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdviceBody {
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub full_advice: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub causes: Vec<String>,
    #[serde(default)]
    pub prevention: Vec<String>,
    #[serde(default)]
    pub treatment: Vec<String>,
}

/// Which advice field carries the advisory text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum AdviceVariant {
    /// `advice.explanation`
    Explanation,
    /// `advice.full_advice`
    #[default]
    FullAdvice,
}

/// Which backend stage produced the diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceStage {
    PrimaryClassifier,
    VisionFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advisory {
    pub text: String,
    pub summary: Option<String>,
    pub causes: Vec<String>,
    pub prevention: Vec<String>,
    pub treatment: Vec<String>,
}

/// A successful diagnosis, ready for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisResult {
    pub diagnosis: String,
    /// Fraction in [0, 1].
    pub confidence: f64,
    pub source: String,
    pub stage: InferenceStage,
    /// In the order the backend ranked them.
    pub alternatives: Vec<Prediction>,
    pub advice: Advisory,
    pub visual_description: Option<String>,
    pub timestamp: Option<String>,
}

/// Whether `source` names the vision-language fallback stage.
///
/// This is a plain substring test on free text. It breaks as soon as the
/// backend rewords its source label; keep every caller going through here.
pub fn uses_vision_fallback(source: &str) -> bool {
    VISION_FALLBACK_MARKERS
        .iter()
        .any(|marker| source.contains(marker))
}

impl PredictResponse {
    /// Maps a decoded body into a diagnosis.
    ///
    /// # Errors
    /// [`PredictError::Declined`] when `success` is missing or false,
    /// [`PredictError::Incomplete`] when a successful body lacks the
    /// diagnosis or its confidence.
    pub fn into_diagnosis(self, variant: AdviceVariant) -> Result<DiagnosisResult, PredictError> {
        if !self.success.unwrap_or(false) {
            return Err(PredictError::Declined {
                reason: self
                    .error
                    .unwrap_or_else(|| "no reason given".to_string()),
            });
        }

        let diagnosis = self
            .diagnosis
            .filter(|label| !label.trim().is_empty())
            .ok_or(PredictError::Incomplete("diagnosis"))?;
        let confidence = self
            .confidence
            .ok_or(PredictError::Incomplete("confidence"))?;

        let source = self.source.unwrap_or_default();
        let stage = if uses_vision_fallback(&source) {
            InferenceStage::VisionFallback
        } else {
            InferenceStage::PrimaryClassifier
        };

        let mut alternatives = self
            .cnn_predictions
            .map(|cnn| cnn.top_3_predictions)
            .unwrap_or_default();
        alternatives.truncate(MAX_ALTERNATIVES);

        Ok(DiagnosisResult {
            diagnosis,
            confidence,
            source,
            stage,
            alternatives,
            advice: Advisory::from_body(self.advice.unwrap_or_default(), variant),
            visual_description: self.visual_description,
            timestamp: self.timestamp,
        })
    }
}

impl Advisory {
    fn from_body(body: AdviceBody, variant: AdviceVariant) -> Self {
        let (preferred, other) = match variant {
            AdviceVariant::Explanation => (body.explanation, body.full_advice),
            AdviceVariant::FullAdvice => (body.full_advice, body.explanation),
        };
        let text = [preferred, other]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
            .unwrap_or_else(|| MISSING_ADVICE_TEXT.to_string());

        Self {
            text,
            summary: body.summary,
            causes: body.causes,
            prevention: body.prevention,
            treatment: body.treatment,
        }
    }
}
