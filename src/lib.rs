//! Leaf Doctor: upload a leaf photo, send it to a remote plant-disease
//! inference service and present the diagnosis.
//!
//! The crate owns the client side of that exchange: file validation, the
//! `idle -> analyzing -> results | uncertain` state machine, the `/predict`
//! wire contract and the view models the page renders.

pub mod config;
pub mod contract;
pub mod error;
pub mod flow;
pub mod logging;
pub mod predictor;
pub mod present;
pub mod progress;
pub mod session;
pub mod upload;
pub mod web;

pub use contract::{AdviceVariant, DiagnosisResult, InferenceStage, PredictResponse};
pub use error::{FlowError, PredictError, ValidationError};
pub use flow::{AppState, DiagnosisFlow};
pub use predictor::{AnalysisRequest, HttpPredictor, Predictor};
pub use present::View;
pub use session::{Session, SessionSettings, SessionStore};
pub use upload::ImageFile;
