//! The analysis state machine.
//!
//! ```text
//! idle --analyze (image selected)--> analyzing --success--> results
//!                                        \--failure--> uncertain
//! results | uncertain --reset--> idle
//! ```
//!
//! This type is synchronous; the network call happens between
//! [`DiagnosisFlow::begin_analysis`] and [`DiagnosisFlow::complete`], driven
//! by [`crate::session::Session`].

use serde::Serialize;
use tracing::{info, warn};

use crate::contract::{AdviceVariant, DiagnosisResult, PredictResponse};
use crate::error::{FlowError, PredictError};
use crate::predictor::AnalysisRequest;
use crate::upload::{ImageFile, SelectedImage, UploadController};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Idle,
    Analyzing,
    Results,
    Uncertain,
}

impl AppState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AppState::Results | AppState::Uncertain)
    }
}

#[derive(Debug)]
pub struct DiagnosisFlow {
    state: AppState,
    upload: UploadController,
    result: Option<DiagnosisResult>,
    analysis_attempted: bool,
    advice_variant: AdviceVariant,
}

impl DiagnosisFlow {
    pub fn new(advice_variant: AdviceVariant) -> Self {
        Self {
            state: AppState::Idle,
            upload: UploadController::new(),
            result: None,
            analysis_attempted: false,
            advice_variant,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn upload(&self) -> &UploadController {
        &self.upload
    }

    pub fn selected(&self) -> Option<&SelectedImage> {
        self.upload.selected()
    }

    pub fn result(&self) -> Option<&DiagnosisResult> {
        self.result.as_ref()
    }

    /// Whether a request was sent during the current cycle.
    pub fn analysis_attempted(&self) -> bool {
        self.analysis_attempted
    }

    /// Selection is only possible while idle. A validation failure leaves the
    /// state untouched.
    pub fn select_file(&mut self, file: ImageFile) -> Result<(), FlowError> {
        if self.state != AppState::Idle {
            return Err(FlowError::Busy);
        }
        self.upload.select_file(file)?;
        Ok(())
    }

    pub fn clear_selection(&mut self) -> Result<(), FlowError> {
        if self.state != AppState::Idle {
            return Err(FlowError::Busy);
        }
        self.upload.clear();
        Ok(())
    }

    pub(crate) fn upload_mut(&mut self) -> &mut UploadController {
        &mut self.upload
    }

    /// `idle -> analyzing`. Returns the request to send, or `None` when the
    /// guard fails (no image, or not idle); the state is then unchanged.
    pub fn begin_analysis(&mut self) -> Option<AnalysisRequest> {
        if self.state != AppState::Idle {
            return None;
        }
        let selected = self.upload.selected()?;

        let request = AnalysisRequest {
            file_name: selected.file_name.clone(),
            mime: selected.mime.clone(),
            bytes: selected.bytes.clone(),
        };
        self.state = AppState::Analyzing;
        self.analysis_attempted = true;
        info!(file = %request.file_name, "analysis started");
        Some(request)
    }

    /// `analyzing -> results | uncertain`. Ignored in any other state.
    pub fn complete(&mut self, outcome: Result<PredictResponse, PredictError>) -> AppState {
        if self.state != AppState::Analyzing {
            warn!(state = ?self.state, "ignoring prediction outcome outside of analyzing");
            return self.state;
        }

        match outcome.and_then(|response| response.into_diagnosis(self.advice_variant)) {
            Ok(result) => {
                info!(
                    diagnosis = %result.diagnosis,
                    confidence = result.confidence,
                    source = %result.source,
                    "analysis finished"
                );
                self.result = Some(result);
                self.state = AppState::Results;
            }
            Err(err) => {
                warn!(error = %err, "analysis could not produce a diagnosis");
                self.result = None;
                self.state = AppState::Uncertain;
            }
        }
        self.state
    }

    /// `results | uncertain -> idle`, clearing the image and the result.
    /// Returns `false` (and does nothing) from any other state.
    pub fn reset(&mut self) -> bool {
        if !self.state.is_terminal() {
            return false;
        }
        self.upload.clear();
        self.result = None;
        self.analysis_attempted = false;
        self.state = AppState::Idle;
        true
    }
}
