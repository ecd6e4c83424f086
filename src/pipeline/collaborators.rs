//! External collaborator interfaces consumed by the pipeline.
//!
//! OCR and text generation are black boxes: the pipeline only decides how
//! their outputs are combined, degraded, and scored. Both are injected as
//! trait objects so stages can run against mocks without network access.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerationError, OcrError};

/// Text recognized in an image plus the engine's self-reported confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
}

/// OCR engine abstraction (allows mocking for tests)
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract_text(&self, image_path: &Path) -> Result<OcrOutput, OcrError>;
}

/// Text-generation engine abstraction (allows mocking for tests)
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Run a collaborator call under an optional deadline.
///
/// `None` leaves the call unbounded.
pub(crate) async fn with_deadline<T, E, F>(
    limit: Option<Duration>,
    call: F,
    on_timeout: impl FnOnce(u64) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match limit {
        None => call.await,
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(limit.as_secs())),
        },
    }
}

// ──────────────────────────────────────────────
// Test doubles
// ──────────────────────────────────────────────

/// Mock text generator — replays scripted responses in order and records
/// every prompt it receives.
///
/// Once the script is exhausted the fallback is used; a generator without a
/// fallback behaves like an unreachable server.
pub struct MockTextGenerator {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockTextGenerator {
    pub fn new(response: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue responses to return before falling back to an empty string.
    pub fn with_script(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            fallback: Some(String::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A generator whose every call fails as if the server were down.
    pub fn unavailable() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(next) = self.script.lock().ok().and_then(|mut s| s.pop_front()) {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| GenerationError::Connection("http://localhost:11434".into()))
    }
}

/// Mock OCR engine — returns a fixed result or a processing failure.
pub struct MockOcrEngine {
    output: Option<OcrOutput>,
    delay: Option<Duration>,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            output: Some(OcrOutput {
                text: text.to_string(),
                confidence,
            }),
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            output: None,
            delay: None,
        }
    }

    /// Sleep before answering, to exercise collaborator timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl OcrEngine for MockOcrEngine {
    async fn extract_text(&self, _image_path: &Path) -> Result<OcrOutput, OcrError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.output
            .clone()
            .ok_or_else(|| OcrError::Processing("mock engine failure".into()))
    }
}
