use thiserror::Error;

/// Rejection of a user-picked file. The `Display` text is what the user sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please upload a JPG or PNG image (got {mime})")]
    UnsupportedType { mime: String },
    /// `size` is a lower bound when the request body was cut off.
    #[error("File is too large. Maximum size is 10MB")]
    TooLarge { size: u64 },
    #[error("Could not read the uploaded file")]
    Unreadable,
}

/// Why an analysis cycle ended in the uncertain state.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("prediction request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("prediction service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("prediction response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("prediction service declined to diagnose: {reason}")]
    Declined { reason: String },
    #[error("prediction response is missing `{0}`")]
    Incomplete(&'static str),
}

/// Errors returned by session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("an analysis is in progress or finished; reset first")]
    Busy,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
