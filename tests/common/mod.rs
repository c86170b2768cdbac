//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Router,
};
use leaf_doctor::{AdviceVariant, SessionSettings};

pub const LEAF_BLIGHT: &str = r#"{
    "success": true,
    "diagnosis": "Leaf Blight",
    "confidence": 0.82,
    "source": "CNN",
    "cnn_predictions": {"top_3_predictions": [
        {"disease": "Leaf Blight", "confidence": 0.82},
        {"disease": "Rust", "confidence": 0.11}
    ]},
    "advice": {"explanation": "Treat with fungicide.", "full_advice": "Remove and burn infected leaves."}
}"#;

/// Encodes a tiny real PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([30, 160, 60]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageOutputFormat::Png,
        )
        .expect("png fixture should encode");
    bytes
}

pub fn settings(advice_variant: AdviceVariant) -> SessionSettings {
    SessionSettings {
        advice_variant,
        progress_interval: Duration::from_millis(1500),
    }
}

/// One multipart part as received by the fake backend.
#[derive(Debug, Clone)]
pub struct ReceivedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub len: usize,
}

/// In-process stand-in for the inference service's `/predict`.
#[derive(Clone)]
pub struct FakeBackend {
    status: StatusCode,
    body: String,
    received: Arc<Mutex<Vec<ReceivedPart>>>,
}

impl FakeBackend {
    pub fn new(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn received(&self) -> Vec<ReceivedPart> {
        self.received.lock().unwrap().clone()
    }

    /// Serves on an ephemeral port and returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/predict", post(predict))
            .with_state(self.clone());
        spawn_router(app).await
    }
}

async fn predict(State(backend): State<FakeBackend>, mut multipart: Multipart) -> (StatusCode, String) {
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let len = field.bytes().await.unwrap().len();
        backend.received.lock().unwrap().push(ReceivedPart {
            name,
            file_name,
            content_type,
            len,
        });
    }
    (backend.status, backend.body.clone())
}

pub async fn spawn_router(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
