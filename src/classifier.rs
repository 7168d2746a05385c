//! Facial emotion classification. The model lives behind an external
//! DeepFace-compatible HTTP API; this module only packages frames for it and
//! maps its answers onto [`Classification`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::constants::{CLASSIFIER_JPEG_QUALITY, NO_FACE_DETECTED};
use crate::device::Frame;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Emotion(String),
    NoFace,
    Failed(String),
}

impl Classification {
    /// Label recorded in the mood history. Both failure kinds collapse to the
    /// "No face detected" sentinel.
    pub fn label(&self) -> &str {
        match self {
            Self::Emotion(label) => label,
            Self::NoFace | Self::Failed(_) => NO_FACE_DETECTED,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Never fails outward: every error becomes `NoFace` or `Failed`.
    async fn classify(&self, frame: &Frame) -> Classification;
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("no face detected")]
    NoFace,
    #[error("classifier request timed out")]
    Timeout,
    #[error("classifier network error: {0}")]
    Network(String),
    #[error("classifier api error: status={status}, message={message}")]
    ApiError { status: u16, message: String },
    #[error("frame encode error: {0}")]
    Encode(#[from] image::ImageError),
    #[error("malformed classifier response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub fn from_config(config: &ClassifierConfig) -> Arc<dyn EmotionClassifier> {
    if config.mock {
        Arc::new(MockEmotionClassifier::new(&config.mock_label))
    } else {
        Arc::new(HttpEmotionClassifier::new(config))
    }
}

/// Validate classifier configuration at startup.
/// Panics if the real classifier is requested without an API URL.
pub fn validate_config(config: &ClassifierConfig) {
    if !config.mock && config.api_url.trim().is_empty() {
        panic!(
            "Invalid classifier configuration: CLASSIFIER_MOCK=false but \
             CLASSIFIER_API_URL is empty. Set CLASSIFIER_API_URL or CLASSIFIER_MOCK=true."
        );
    }
}

#[derive(Debug, Clone)]
pub struct MockEmotionClassifier {
    label: String,
}

impl MockEmotionClassifier {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
        }
    }
}

#[async_trait]
impl EmotionClassifier for MockEmotionClassifier {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn classify(&self, _frame: &Frame) -> Classification {
        if self.label.is_empty() {
            Classification::NoFace
        } else {
            Classification::Emotion(self.label.clone())
        }
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    img: String,
    actions: [&'a str; 1],
    enforce_detection: bool,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResult {
    dominant_emotion: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnalyzeResponse {
    Wrapped { results: Vec<AnalyzeResult> },
    Bare(Vec<AnalyzeResult>),
}

/// Extracts the dominant emotion of the first detected face.
fn parse_analysis(body: &[u8]) -> Result<Option<String>, ClassifierError> {
    let results = match serde_json::from_slice::<AnalyzeResponse>(body)? {
        AnalyzeResponse::Wrapped { results } => results,
        AnalyzeResponse::Bare(results) => results,
    };
    Ok(results.into_iter().next().map(|r| r.dominant_emotion))
}

fn is_no_face_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("face could not be detected") || lowered.contains("no face")
}

#[derive(Debug, Clone)]
pub struct HttpEmotionClassifier {
    config: ClassifierConfig,
    client: reqwest::Client,
}

impl HttpEmotionClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/analyze", self.config.api_url.trim_end_matches('/'))
    }

    async fn analyze(&self, frame: &Frame) -> Result<Option<String>, ClassifierError> {
        let jpeg = frame.encode_jpeg(CLASSIFIER_JPEG_QUALITY)?;
        let payload = AnalyzeRequest {
            img: format!(
                "data:image/jpeg;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(jpeg)
            ),
            actions: ["emotion"],
            enforce_detection: false,
        };

        let mut request = self.client.post(self.endpoint()).json(&payload);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout
            } else {
                ClassifierError::Network(e.to_string())
            }
        })?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = String::from_utf8_lossy(&body).to_string();
            if is_no_face_message(&message) {
                return Err(ClassifierError::NoFace);
            }
            return Err(ClassifierError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        parse_analysis(&body)
    }
}

#[async_trait]
impl EmotionClassifier for HttpEmotionClassifier {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn classify(&self, frame: &Frame) -> Classification {
        match self.analyze(frame).await {
            Ok(Some(label)) => Classification::Emotion(label),
            Ok(None) | Err(ClassifierError::NoFace) => Classification::NoFace,
            Err(e) => {
                tracing::debug!(error = %e, "Emotion classification failed");
                Classification::Failed(e.to_string())
            }
        }
    }
}
