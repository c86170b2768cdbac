//! View models for the page. Each view is a pure function of flow state;
//! the browser shell only draws what it gets here.

use std::fmt;

use serde::Serialize;

use crate::contract::{DiagnosisResult, InferenceStage};
use crate::flow::{AppState, DiagnosisFlow};
use crate::progress::ANALYSIS_STEPS;

pub const UNCERTAIN_MESSAGE: &str = "We couldn't identify this leaf with enough confidence. \
Try a sharper photo of a single leaf in good light.";

pub const FALLBACK_BANNER: &str =
    "The classifier was unsure, so a vision-language model analysed this image.";

/// Shown on the uncertain screen once a request went out, whatever its outcome.
pub const ATTEMPTED_BANNER: &str = "The analysis ran but could not produce a diagnosis.";

/// `fraction * 100` rounded to the nearest whole percent.
pub fn confidence_percent(fraction: f64) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum View {
    Idle(IdleView),
    Analyzing(ProgressView),
    Results(ResultView),
    Uncertain(UncertainView),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdleView {
    pub file_name: Option<String>,
    pub preview: Option<String>,
    pub error: Option<String>,
    pub can_analyze: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    pub current: usize,
    pub steps: Vec<ProgressStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStep {
    pub label: &'static str,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Done,
    Active,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub disease: String,
    pub confidence: u8,
    pub source: String,
    pub fallback_banner: Option<&'static str>,
    pub alternatives: Vec<RankedPrediction>,
    pub advice: AdviceView,
    pub visual_description: Option<String>,
    pub timestamp: Option<String>,
    pub preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedPrediction {
    pub rank: usize,
    pub disease: String,
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdviceView {
    pub text: String,
    pub summary: Option<String>,
    pub causes: Vec<String>,
    pub prevention: Vec<String>,
    pub treatment: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncertainView {
    pub message: &'static str,
    pub banner: Option<&'static str>,
}

pub fn present_result(result: &DiagnosisResult) -> ResultView {
    ResultView {
        disease: result.diagnosis.clone(),
        confidence: confidence_percent(result.confidence),
        source: result.source.clone(),
        fallback_banner: (result.stage == InferenceStage::VisionFallback)
            .then_some(FALLBACK_BANNER),
        alternatives: result
            .alternatives
            .iter()
            .enumerate()
            .map(|(index, prediction)| RankedPrediction {
                rank: index + 1,
                disease: prediction.disease.clone(),
                confidence: confidence_percent(prediction.confidence),
            })
            .collect(),
        advice: AdviceView {
            text: result.advice.text.clone(),
            summary: result.advice.summary.clone(),
            causes: result.advice.causes.clone(),
            prevention: result.advice.prevention.clone(),
            treatment: result.advice.treatment.clone(),
        },
        visual_description: result.visual_description.clone(),
        timestamp: result.timestamp.clone(),
        preview: None,
    }
}

pub fn present_uncertain(analysis_attempted: bool) -> UncertainView {
    UncertainView {
        message: UNCERTAIN_MESSAGE,
        banner: analysis_attempted.then_some(ATTEMPTED_BANNER),
    }
}

pub fn present_progress(current: usize) -> ProgressView {
    let current = current.min(ANALYSIS_STEPS.len() - 1);
    let steps = ANALYSIS_STEPS
        .iter()
        .enumerate()
        .map(|(index, &label)| ProgressStep {
            label,
            status: match index.cmp(&current) {
                std::cmp::Ordering::Less => StepStatus::Done,
                std::cmp::Ordering::Equal => StepStatus::Active,
                std::cmp::Ordering::Greater => StepStatus::Pending,
            },
        })
        .collect();

    ProgressView { current, steps }
}

/// Picks the presenter for the current state. `progress_step` is only read
/// while analyzing.
pub fn present(flow: &DiagnosisFlow, progress_step: usize) -> View {
    match flow.state() {
        AppState::Idle => View::Idle(IdleView {
            file_name: flow.selected().map(|image| image.file_name.clone()),
            preview: flow.selected().map(|image| image.preview.clone()),
            error: flow.upload().error().map(str::to_string),
            can_analyze: flow.selected().is_some(),
        }),
        AppState::Analyzing => View::Analyzing(present_progress(progress_step)),
        AppState::Results => match flow.result() {
            Some(result) => {
                let mut view = present_result(result);
                view.preview = flow.selected().map(|image| image.preview.clone());
                View::Results(view)
            }
            None => View::Uncertain(present_uncertain(flow.analysis_attempted())),
        },
        AppState::Uncertain => View::Uncertain(present_uncertain(flow.analysis_attempted())),
    }
}

const RULE: &str = "======================================================================";

impl fmt::Display for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}\nDIAGNOSIS REPORT\n{RULE}")?;
        writeln!(f, "Diagnosis:  {}", self.disease)?;
        writeln!(f, "Confidence: {}%", self.confidence)?;
        writeln!(f, "Source:     {}", self.source)?;
        if let Some(timestamp) = &self.timestamp {
            writeln!(f, "Timestamp:  {timestamp}")?;
        }
        if let Some(banner) = self.fallback_banner {
            writeln!(f, "\nNote: {banner}")?;
        }

        if !self.alternatives.is_empty() {
            writeln!(f, "\n{RULE}\nTOP PREDICTIONS\n{RULE}")?;
            for prediction in &self.alternatives {
                writeln!(
                    f,
                    "{}. {}: {}%",
                    prediction.rank, prediction.disease, prediction.confidence
                )?;
            }
        }

        if let Some(description) = &self.visual_description {
            writeln!(f, "\n{RULE}\nVISUAL ANALYSIS\n{RULE}\n{description}")?;
        }

        writeln!(f, "\n{RULE}\nAGRICULTURAL ADVICE\n{RULE}")?;
        if let Some(summary) = &self.advice.summary {
            writeln!(f, "{summary}\n")?;
        }
        writeln!(f, "{}", self.advice.text)?;
        for (title, items) in [
            ("Causes", &self.advice.causes),
            ("Prevention", &self.advice.prevention),
            ("Treatment", &self.advice.treatment),
        ] {
            if items.is_empty() {
                continue;
            }
            writeln!(f, "\n{title}:")?;
            for item in items {
                writeln!(f, "  • {item}")?;
            }
        }
        write!(f, "{RULE}")
    }
}

impl fmt::Display for UncertainView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(banner) = self.banner {
            write!(f, "\n{banner}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Advisory, Prediction};

    fn result(source: &str, stage: InferenceStage) -> DiagnosisResult {
        DiagnosisResult {
            diagnosis: "Leaf Blight".into(),
            confidence: 0.947,
            source: source.into(),
            stage,
            alternatives: vec![
                Prediction {
                    disease: "Leaf Blight".into(),
                    confidence: 0.947,
                },
                Prediction {
                    disease: "Rust".into(),
                    confidence: 0.5,
                },
                Prediction {
                    disease: "Mildew".into(),
                    confidence: 0.004,
                },
            ],
            advice: Advisory {
                text: "Treat with fungicide.".into(),
                summary: None,
                causes: vec![],
                prevention: vec!["Rotate crops".into()],
                treatment: vec![],
            },
            visual_description: None,
            timestamp: None,
        }
    }

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(confidence_percent(0.947), 95);
        assert_eq!(confidence_percent(0.5), 50);
        assert_eq!(confidence_percent(0.0), 0);
        assert_eq!(confidence_percent(1.0), 100);
        assert_eq!(confidence_percent(0.004), 0);
        assert_eq!(confidence_percent(1.2), 100);
    }

    #[test]
    fn percent_matches_round_over_whole_range() {
        for thousandths in 0..=1000 {
            let fraction = f64::from(thousandths) / 1000.0;
            assert_eq!(
                f64::from(confidence_percent(fraction)),
                (fraction * 100.0).round()
            );
        }
    }

    #[test]
    fn result_view_keeps_received_order() {
        let view = present_result(&result("CNN", InferenceStage::PrimaryClassifier));
        assert_eq!(view.confidence, 95);
        let ranked: Vec<_> = view
            .alternatives
            .iter()
            .map(|p| (p.rank, p.disease.as_str(), p.confidence))
            .collect();
        assert_eq!(
            ranked,
            [(1, "Leaf Blight", 95), (2, "Rust", 50), (3, "Mildew", 0)]
        );
        assert!(view.fallback_banner.is_none());
    }

    #[test]
    fn banner_only_for_vision_fallback() {
        let view = present_result(&result("BLIP fallback used", InferenceStage::VisionFallback));
        assert_eq!(view.fallback_banner, Some(FALLBACK_BANNER));
    }

    #[test]
    fn uncertain_banner_follows_attempt_flag() {
        assert_eq!(present_uncertain(true).banner, Some(ATTEMPTED_BANNER));
        assert!(present_uncertain(false).banner.is_none());
        assert_ne!(ATTEMPTED_BANNER, FALLBACK_BANNER);
    }

    #[test]
    fn progress_marks_steps_around_current() {
        let view = present_progress(1);
        let statuses: Vec<_> = view.steps.iter().map(|step| step.status).collect();
        assert_eq!(
            statuses,
            [
                StepStatus::Done,
                StepStatus::Active,
                StepStatus::Pending,
                StepStatus::Pending
            ]
        );
        assert_eq!(present_progress(99).current, ANALYSIS_STEPS.len() - 1);
    }

    #[test]
    fn report_lists_ranked_predictions_and_advice() {
        let report = present_result(&result("CNN", InferenceStage::PrimaryClassifier)).to_string();
        assert!(report.contains("Diagnosis:  Leaf Blight"));
        assert!(report.contains("Confidence: 95%"));
        assert!(report.contains("2. Rust: 50%"));
        assert!(report.contains("Prevention:\n  • Rotate crops"));
        assert!(!report.contains("Causes:"));
    }

    #[test]
    fn view_serializes_with_state_tag() {
        let json = serde_json::to_value(View::Uncertain(present_uncertain(false))).unwrap();
        assert_eq!(json["state"], "uncertain");
        assert_eq!(json["message"], UNCERTAIN_MESSAGE);
    }
}
