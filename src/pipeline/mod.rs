pub mod collaborators;
pub mod factors;
pub mod normalize;
pub mod ollama;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod recommend;
pub mod risk;
pub mod upload;
pub mod validation;

pub use collaborators::*;
pub use factors::*;
pub use normalize::*;
pub use ollama::*;
pub use orchestrator::*;
pub use recommend::*;
pub use risk::*;
pub use upload::*;
pub use validation::*;

use thiserror::Error;

/// Failures reported by an OCR engine. Never surfaced by the pipeline:
/// the normalizer turns them into a degraded extraction result.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Could not read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR processing failed: {0}")]
    Processing(String),

    #[error("OCR timed out after {0}s")]
    Timeout(u64),
}

/// Failures reported by the text-generation collaborator.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Ollama is not running at {0}")]
    Connection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Text generation timed out after {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No valid input provided. Send structured fields, a text field, or an image file.")]
    InvalidInput,

    #[error(">50% fields missing (completeness {completeness:.2}, missing: {missing_fields:?})")]
    IncompleteProfile {
        missing_fields: Vec<String>,
        completeness: f32,
    },

    #[error("Text generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Could not parse model response: {0}")]
    ExtractionParse(String),

    #[error("Failed to assess risk: {0}")]
    RiskAssessment(String),

    #[error("File upload error: {0}")]
    Upload(String),
}
