use serde::{Deserialize, Serialize};

use super::enums::{InputSource, RiskLevel};
use super::profile::SurveyAnswers;

/// Normalized answers plus how much the extraction path trusts them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub answers: SurveyAnswers,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    pub source: InputSource,
    /// Engine-reported OCR confidence, kept even when escalation replaced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,
}

/// Field-presence completeness of a set of answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub missing_fields: Vec<String>,
    pub completeness: f32,
    pub message: String,
}

/// Risk-factor tags reported by the text-generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSet {
    pub factors: Vec<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    #[serde(rename = "risk_level")]
    pub level: RiskLevel,
    pub score: u8,
    pub rationale: Vec<String>,
}

pub type Recommendations = Vec<String>;

/// Round a confidence to two decimals for reporting.
pub fn round_confidence(confidence: f32) -> f32 {
    (confidence * 100.0).round() / 100.0
}
