//! Ollama-backed production collaborators.
//!
//! - [`OllamaClient`] implements [`TextGenerator`] over `/api/generate`.
//! - [`OllamaVisionOcr`] implements [`OcrEngine`] over `/api/chat` with the
//!   survey image attached as base64.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::collaborators::{OcrEngine, OcrOutput, TextGenerator};
use super::{GenerationError, OcrError};
use crate::config::OllamaSettings;

const VISION_SYSTEM_PROMPT: &str = "\
You are a form transcriber. Extract ALL visible text from the provided image of a \
health survey form. Keep one answer per line in the form `label: value`. \
Do not add, interpret, or correct anything.";

const VISION_USER_PROMPT: &str = "\
Transcribe every label and answer on this survey form, one per line.";

// ──────────────────────────────────────────────
// OllamaClient
// ──────────────────────────────────────────────

/// Ollama HTTP client for local LLM inference.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a client pointing at an Ollama instance.
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GenerationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }

    /// Text-generation client from pipeline settings.
    pub fn from_settings(settings: &OllamaSettings) -> Result<Self, GenerationError> {
        Self::new(
            &settings.base_url,
            &settings.text_model,
            settings.http_timeout_secs,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_send_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_connect() {
            GenerationError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            GenerationError::Timeout(self.timeout_secs)
        } else {
            GenerationError::HttpClient(e.to_string())
        }
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R, GenerationError> {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GenerationError::ResponseParsing(e.to_string()))
    }

    /// Send one user message with images to `/api/chat`.
    pub async fn chat_with_images(
        &self,
        prompt: &str,
        images: Vec<String>,
        system: Option<&str>,
    ) -> Result<String, GenerationError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
                images: None,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
            images: Some(images),
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let parsed: ChatResponse = self.post_json("/api/chat", &body).await?;
        Ok(parsed.message.content)
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Request body for Ollama /api/chat
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

/// Response body from Ollama /api/chat
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let start = Instant::now();
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let parsed: GenerateResponse = self.post_json("/api/generate", &body).await?;

        tracing::debug!(
            model = %self.model,
            elapsed_ms = %start.elapsed().as_millis(),
            response_len = parsed.response.len(),
            "Ollama generation complete"
        );
        Ok(parsed.response)
    }
}

// ──────────────────────────────────────────────
// OllamaVisionOcr
// ──────────────────────────────────────────────

/// Production OCR engine backed by an Ollama vision model.
pub struct OllamaVisionOcr {
    client: OllamaClient,
}

impl OllamaVisionOcr {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    /// Vision client from pipeline settings (uses the vision model).
    pub fn from_settings(settings: &OllamaSettings) -> Result<Self, GenerationError> {
        let client = OllamaClient::new(
            &settings.base_url,
            &settings.vision_model,
            settings.http_timeout_secs,
        )?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl OcrEngine for OllamaVisionOcr {
    async fn extract_text(&self, image_path: &Path) -> Result<OcrOutput, OcrError> {
        let start = Instant::now();
        let bytes = tokio::fs::read(image_path).await?;
        let image_size = bytes.len();
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let raw = self
            .client
            .chat_with_images(VISION_USER_PROMPT, vec![encoded], Some(VISION_SYSTEM_PROMPT))
            .await
            .map_err(|e| OcrError::Processing(format!("Vision OCR failed: {e}")))?;

        let text = raw.trim().to_string();
        let confidence = compute_heuristic_confidence(&text);

        tracing::info!(
            model = %self.client.model(),
            image_size,
            elapsed_ms = %start.elapsed().as_millis(),
            text_len = text.len(),
            confidence,
            "Vision OCR extraction complete"
        );

        Ok(OcrOutput { text, confidence })
    }
}

/// Estimate OCR confidence from the shape of the transcription.
///
/// Vision models report no per-word confidence, so this scores:
/// - text length: empty 0.0, <20 chars 0.2, <80 chars 0.5, otherwise 0.7
/// - labeled `label: value` lines: +0.05 each, up to +0.2
///
/// Capped at 0.9.
pub(crate) fn compute_heuristic_confidence(text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }

    let len = text.len();
    let base: f32 = if len < 20 {
        0.2
    } else if len < 80 {
        0.5
    } else {
        0.7
    };

    let labeled = text
        .lines()
        .filter(|l| {
            l.split_once(':')
                .is_some_and(|(label, value)| !label.trim().is_empty() && !value.trim().is_empty())
        })
        .count();
    let bonus = (labeled as f32 * 0.05).min(0.2);

    (base + bonus).min(0.9)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", "medgemma:4b", 60).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.timeout_secs, 60);
        assert_eq!(client.model(), "medgemma:4b");
    }

    #[test]
    fn clients_from_settings_pick_their_models() {
        let settings = OllamaSettings {
            text_model: "llama3:8b".into(),
            vision_model: "llava:7b".into(),
            ..Default::default()
        };
        let text = OllamaClient::from_settings(&settings).unwrap();
        let vision = OllamaVisionOcr::from_settings(&settings).unwrap();
        assert_eq!(text.model(), "llama3:8b");
        assert_eq!(vision.client.model(), "llava:7b");
    }

    #[test]
    fn chat_request_omits_images_for_system_message() {
        let body = ChatRequest {
            model: "m",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "s",
                    images: None,
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                    images: Some(vec!["aGk=".into()]),
                },
            ],
            stream: false,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains(r#"{"role":"system","content":"s"}"#));
        assert!(json.contains(r#""images":["aGk="]"#));
        assert!(json.contains(r#""stream":false"#));
    }

    #[test]
    fn heuristic_confidence_empty_text() {
        assert_eq!(compute_heuristic_confidence(""), 0.0);
    }

    #[test]
    fn heuristic_confidence_rewards_labeled_lines() {
        let plain = "the patient filled in the form but the labels are unreadable here";
        let labeled = "Age: 42\nSmoker: yes\nExercise: rarely\nDiet: high sugar, lots of soda";
        assert!(compute_heuristic_confidence(labeled) > compute_heuristic_confidence(plain));
    }

    #[test]
    fn heuristic_confidence_is_capped() {
        let text = "Age: 42\n".repeat(40);
        assert!(compute_heuristic_confidence(&text) <= 0.9);
    }

    #[tokio::test]
    async fn vision_ocr_missing_file_is_io_error() {
        let ocr = OllamaVisionOcr::from_settings(&OllamaSettings::default()).unwrap();
        let err = ocr
            .extract_text(Path::new("/nonexistent/health-survey.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::Io(_)));
    }
}
