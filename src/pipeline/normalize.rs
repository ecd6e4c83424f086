//! Input normalization: image, free text, or structured fields → answers.
//!
//! Images go through OCR, then a regex fast path over labeled lines. When the
//! fast path recovers fewer than [`MIN_REGEX_FIELDS`] fields the raw OCR text
//! is escalated to the text-generation collaborator. OCR failures degrade to
//! placeholder answers; generation failures are fatal.

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use regex::Regex;

use super::collaborators::{with_deadline, OcrEngine, TextGenerator};
use super::parser::{parse_answers_response, DEFAULT_MODEL_CONFIDENCE};
use super::prompt::build_field_extraction_prompt;
use super::upload::UploadedImage;
use super::{GenerationError, OcrError, PipelineError};
use crate::models::{parse_yes_no, ExtractionResult, InputSource, SurveyAnswers};

/// Regex fields needed to skip escalation.
pub const MIN_REGEX_FIELDS: usize = 3;

/// Confidence assigned to caller-supplied structured fields.
pub const STRUCTURED_CONFIDENCE: f32 = 0.95;

/// Confidence assigned when OCR failed and placeholders were returned.
pub const DEGRADED_CONFIDENCE: f32 = 0.1;

static AGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)age[:\s]+(\d+)").expect("valid age pattern"));
static SMOKER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)smoker[:\s]+(yes|no|true|false)").expect("valid smoker pattern")
});
static EXERCISE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)exercise[:\s]+(\w+)").expect("valid exercise pattern"));
static DIET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)diet[:\s]+([^\n]+)").expect("valid diet pattern"));

// ──────────────────────────────────────────────
// Inputs
// ──────────────────────────────────────────────

/// Everything a caller may have sent. At most one mode is used.
#[derive(Debug, Default)]
pub struct SurveySubmission {
    pub image: Option<UploadedImage>,
    pub text: Option<String>,
    pub fields: Option<SurveyAnswers>,
}

/// The single input mode selected for a request.
#[derive(Debug)]
pub enum SurveyInput {
    Image(UploadedImage),
    Text(String),
    Structured(SurveyAnswers),
}

impl SurveySubmission {
    /// Pick the input mode: image, then non-blank text, then structured
    /// fields carrying an `age`.
    pub fn into_input(self) -> Result<SurveyInput, PipelineError> {
        if let Some(image) = self.image {
            return Ok(SurveyInput::Image(image));
        }
        if let Some(text) = self.text.filter(|t| !t.trim().is_empty()) {
            return Ok(SurveyInput::Text(text));
        }
        match self.fields {
            Some(fields) if fields.age_supplied() => Ok(SurveyInput::Structured(fields)),
            _ => Err(PipelineError::InvalidInput),
        }
    }
}

impl From<SurveyInput> for SurveySubmission {
    fn from(input: SurveyInput) -> Self {
        match input {
            SurveyInput::Image(image) => Self {
                image: Some(image),
                ..Default::default()
            },
            SurveyInput::Text(text) => Self {
                text: Some(text),
                ..Default::default()
            },
            SurveyInput::Structured(fields) => Self {
                fields: Some(fields),
                ..Default::default()
            },
        }
    }
}

// ──────────────────────────────────────────────
// Regex fast path
// ──────────────────────────────────────────────

/// Outcome of the regex fast path over OCR text.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldScan {
    /// Enough fields recovered; use them with the OCR confidence.
    FullyParsed { fields: SurveyAnswers },
    /// Too few fields; hand the raw text to the text-generation collaborator.
    NeedsEscalation {
        partial: SurveyAnswers,
        raw_text: String,
    },
}

/// Extract labeled survey fields from OCR text.
pub fn parse_labeled_fields(text: &str) -> SurveyAnswers {
    SurveyAnswers {
        age: first_capture(&AGE_PATTERN, text).and_then(|s| s.parse().ok()),
        smoker: first_capture(&SMOKER_PATTERN, text).and_then(parse_yes_no),
        exercise: first_capture(&EXERCISE_PATTERN, text).map(|s| s.to_lowercase()),
        diet: first_capture(&DIET_PATTERN, text).map(|s| s.trim().to_lowercase()),
        ..Default::default()
    }
}

fn first_capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Run the fast path and decide whether escalation is needed.
pub fn scan_fields(text: &str) -> FieldScan {
    let fields = parse_labeled_fields(text);
    let recovered = recovered_count(&fields);
    if recovered >= MIN_REGEX_FIELDS {
        FieldScan::FullyParsed { fields }
    } else {
        FieldScan::NeedsEscalation {
            partial: fields,
            raw_text: text.to_string(),
        }
    }
}

fn recovered_count(fields: &SurveyAnswers) -> usize {
    [
        fields.age.is_some(),
        fields.smoker.is_some(),
        fields.exercise.is_some(),
        fields.diet.is_some(),
    ]
    .into_iter()
    .filter(|found| *found)
    .count()
}

// ──────────────────────────────────────────────
// InputNormalizer
// ──────────────────────────────────────────────

/// Converts one input mode into an [`ExtractionResult`].
pub struct InputNormalizer {
    ocr: Arc<dyn OcrEngine>,
    generator: Arc<dyn TextGenerator>,
    timeout: Option<Duration>,
}

impl InputNormalizer {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        generator: Arc<dyn TextGenerator>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            ocr,
            generator,
            timeout,
        }
    }

    pub async fn normalize(&self, input: SurveyInput) -> Result<ExtractionResult, PipelineError> {
        match input {
            SurveyInput::Image(image) => {
                let outcome = self.normalize_image(&image).await;
                image.release().await;
                outcome
            }
            SurveyInput::Text(text) => self.normalize_text(text).await,
            SurveyInput::Structured(fields) => {
                tracing::info!("Processing structured input");
                Ok(ExtractionResult {
                    answers: fields,
                    confidence: STRUCTURED_CONFIDENCE,
                    raw_text: None,
                    source: InputSource::Json,
                    ocr_confidence: None,
                })
            }
        }
    }

    async fn normalize_image(&self, image: &UploadedImage) -> Result<ExtractionResult, PipelineError> {
        tracing::info!(
            size_bytes = image.size_bytes(),
            content_type = image.content_type().unwrap_or("unknown"),
            "Processing image input"
        );
        let start = Instant::now();

        let ocr = match with_deadline(
            self.timeout,
            self.ocr.extract_text(image.path()),
            OcrError::Timeout,
        )
        .await
        {
            Ok(ocr) => ocr,
            Err(e) => {
                tracing::warn!(error = %e, "OCR failed, returning degraded result");
                return Ok(ExtractionResult {
                    answers: SurveyAnswers::unreadable_image(),
                    confidence: DEGRADED_CONFIDENCE,
                    raw_text: None,
                    source: InputSource::Image,
                    ocr_confidence: None,
                });
            }
        };

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            ocr_confidence = ocr.confidence,
            text_len = ocr.text.len(),
            "OCR complete"
        );
        tracing::debug!(text = %ocr.text, "OCR text");

        let ocr_confidence = ocr.confidence.clamp(0.0, 1.0);
        let (answers, confidence) = match scan_fields(&ocr.text) {
            FieldScan::FullyParsed { fields } => {
                tracing::info!(fields = fields.answered_count(), "Regex fast path succeeded");
                (fields, ocr_confidence)
            }
            FieldScan::NeedsEscalation { partial, raw_text } => {
                tracing::info!(
                    recovered = recovered_count(&partial),
                    "Regex fast path incomplete, escalating to text generation"
                );
                let answers = self.extract_with_model(&raw_text).await?;
                (answers, DEFAULT_MODEL_CONFIDENCE)
            }
        };

        Ok(ExtractionResult {
            answers,
            confidence,
            raw_text: Some(ocr.text),
            source: InputSource::Image,
            ocr_confidence: Some(ocr_confidence),
        })
    }

    async fn normalize_text(&self, text: String) -> Result<ExtractionResult, PipelineError> {
        tracing::info!(text_len = text.len(), "Processing text input with text generation");
        let answers = self.extract_with_model(&text).await?;
        Ok(ExtractionResult {
            answers,
            confidence: DEFAULT_MODEL_CONFIDENCE,
            raw_text: Some(text),
            source: InputSource::Text,
            ocr_confidence: None,
        })
    }

    async fn extract_with_model(&self, text: &str) -> Result<SurveyAnswers, PipelineError> {
        let prompt = build_field_extraction_prompt(text);
        let response = with_deadline(
            self.timeout,
            self.generator.generate(&prompt),
            GenerationError::Timeout,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Field extraction failed");
            PipelineError::from(e)
        })?;
        parse_answers_response(&response)
    }
}
