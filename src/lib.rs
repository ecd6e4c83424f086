pub mod config;
pub mod models;
pub mod pipeline;

pub use config::{init_tracing, PipelineConfig};
pub use models::{
    ExtractionResult, FactorSet, HealthProfile, RiskAssessment, RiskLevel, SurveyAnswers,
    ValidationResult,
};
pub use pipeline::{
    HealthPipeline, PipelineError, ProfileReport, SurveyInput, SurveySubmission, UploadedImage,
};
