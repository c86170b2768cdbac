use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use crate::contract::PredictResponse;
use crate::error::PredictError;

/// Multipart field the backend reads the image from.
pub const IMAGE_FIELD: &str = "image";

/// One outgoing upload, built when the flow enters `analyzing`.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// The remote inference call. Implemented over HTTP in production and by
/// canned responders in tests.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, request: &AnalysisRequest) -> Result<PredictResponse, PredictError>;
}

/// Posts the image to `{base_url}/predict`.
pub struct HttpPredictor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPredictor {
    /// `timeout` is off unless configured; the request is never retried.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, PredictError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, request: &AnalysisRequest) -> Result<PredictResponse, PredictError> {
        let part = Part::bytes(request.bytes.clone())
            .file_name(request.file_name.clone())
            .mime_str(&request.mime)?;
        let form = Form::new().part(IMAGE_FIELD, part);

        info!(
            endpoint = %self.endpoint,
            file = %request.file_name,
            bytes = request.bytes.len(),
            "sending image to prediction service"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        debug!(
            %status,
            body = &response_text[..floor_char_boundary(&response_text, 500)],
            "prediction service responded"
        );

        if !status.is_success() {
            return Err(PredictError::Status {
                status: status.as_u16(),
                body: response_text,
            });
        }

        Ok(serde_json::from_str(&response_text)?)
    }
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    (0..=max)
        .rev()
        .find(|&index| text.is_char_boundary(index))
        .unwrap_or(0)
}
