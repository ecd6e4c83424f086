//! Pipeline orchestrator: standalone stage operations and the composed
//! end-to-end profile flow.
//!
//! Stages run strictly in sequence per request. Each operation opens its own
//! span carrying a fresh request id so collaborator logs can be correlated.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::collaborators::{OcrEngine, TextGenerator};
use super::factors::FactorExtractor;
use super::normalize::{InputNormalizer, SurveySubmission};
use super::ollama::{OllamaClient, OllamaVisionOcr};
use super::recommend::RecommendationSynthesizer;
use super::risk::RiskScorer;
use super::validation::ProfileValidator;
use super::{GenerationError, PipelineError};
use crate::config::PipelineConfig;
use crate::models::{
    round_confidence, InputSource, Recommendations, RiskAssessment, RiskLevel, SurveyAnswers,
    ValidationResult,
};

const STATUS_OK: &str = "ok";

// ──────────────────────────────────────────────
// Reports
// ──────────────────────────────────────────────

/// Output of [`HealthPipeline::parse_input`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedProfile {
    pub answers: SurveyAnswers,
    pub missing_fields: Vec<String>,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

/// Output of [`HealthPipeline::extract_factors`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorReport {
    pub factors: Vec<String>,
    pub confidence: f32,
}

/// Output of [`HealthPipeline::recommendations`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationReport {
    pub risk_level: RiskLevel,
    pub factors: Vec<String>,
    pub recommendations: Recommendations,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSection {
    pub answers: SurveyAnswers,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSection {
    pub list: Vec<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub input_type: InputSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,
}

/// Everything the end-to-end flow produced for one submission.
///
/// This is the record a persistence layer would store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub profile: ProfileSection,
    pub factors: FactorSection,
    pub risk: RiskAssessment,
    pub recommendations: Recommendations,
    pub metadata: ReportMetadata,
    pub assessed_at: DateTime<Utc>,
    pub status: String,
}

// ──────────────────────────────────────────────
// HealthPipeline
// ──────────────────────────────────────────────

pub struct HealthPipeline {
    normalizer: InputNormalizer,
    validator: ProfileValidator,
    factor_extractor: FactorExtractor,
    scorer: RiskScorer,
    synthesizer: RecommendationSynthesizer,
    config: PipelineConfig,
}

impl HealthPipeline {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        let timeout = config.collaborator_timeout();
        Self {
            normalizer: InputNormalizer::new(ocr, generator.clone(), timeout),
            validator: ProfileValidator,
            factor_extractor: FactorExtractor::new(generator.clone(), timeout),
            scorer: RiskScorer,
            synthesizer: RecommendationSynthesizer::new(generator, timeout),
            config,
        }
    }

    /// Build a pipeline backed by the local Ollama server named in `config`.
    pub fn with_ollama(config: PipelineConfig) -> Result<Self, GenerationError> {
        let generator = OllamaClient::from_settings(&config.ollama)?;
        let ocr = OllamaVisionOcr::from_settings(&config.ollama)?;
        tracing::info!(
            base_url = %config.ollama.base_url,
            text_model = %config.ollama.text_model,
            vision_model = %config.ollama.vision_model,
            "Health pipeline using Ollama"
        );
        Ok(Self::new(Arc::new(ocr), Arc::new(generator), config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Normalize a submission and check completeness.
    pub async fn parse_input(
        &self,
        submission: SurveySubmission,
    ) -> Result<ParsedProfile, PipelineError> {
        let span = tracing::info_span!("parse_input", request_id = %Uuid::new_v4());
        async move {
            let input = submission.into_input()?;
            let extraction = self.normalizer.normalize(input).await?;
            let validation = self.check_complete(&extraction.answers)?;

            Ok(ParsedProfile {
                answers: extraction.answers,
                missing_fields: validation.missing_fields,
                confidence: round_confidence(extraction.confidence),
                raw_text: extraction.raw_text,
            })
        }
        .instrument(span)
        .await
    }

    /// Validate answers, then ask for risk-factor tags.
    pub async fn extract_factors(
        &self,
        answers: &SurveyAnswers,
    ) -> Result<FactorReport, PipelineError> {
        let span = tracing::info_span!("extract_factors", request_id = %Uuid::new_v4());
        async move {
            self.check_complete(answers)?;
            let set = self.factor_extractor.extract(answers).await?;
            Ok(FactorReport {
                factors: set.factors,
                confidence: round_confidence(set.confidence),
            })
        }
        .instrument(span)
        .await
    }

    /// Deterministic scoring; no collaborator involved.
    pub fn classify_risk(
        &self,
        answers: &SurveyAnswers,
        factors: &[String],
    ) -> Result<RiskAssessment, PipelineError> {
        let _span = tracing::info_span!("classify_risk", request_id = %Uuid::new_v4()).entered();
        self.scorer.assess_risk(answers, factors)
    }

    pub async fn recommendations(
        &self,
        level: RiskLevel,
        factors: &[String],
    ) -> Result<RecommendationReport, PipelineError> {
        let span = tracing::info_span!("recommendations", request_id = %Uuid::new_v4());
        async move {
            let recommendations = self.synthesizer.synthesize(level, factors).await?;
            Ok(RecommendationReport {
                risk_level: level,
                factors: factors.to_vec(),
                recommendations,
                status: STATUS_OK.into(),
            })
        }
        .instrument(span)
        .await
    }

    /// Run every stage in order. Any fatal stage failure aborts the request.
    pub async fn complete_profile(
        &self,
        submission: SurveySubmission,
    ) -> Result<ProfileReport, PipelineError> {
        let span = tracing::info_span!("complete_profile", request_id = %Uuid::new_v4());
        async move {
            let start = Instant::now();

            let input = submission.into_input()?;
            let extraction = self.normalizer.normalize(input).await?;
            tracing::debug!(answers = ?extraction.answers, "Normalized answers");
            self.check_complete(&extraction.answers)?;

            let factor_set = self.factor_extractor.extract(&extraction.answers).await?;
            let risk = self
                .scorer
                .assess_risk(&extraction.answers, &factor_set.factors)?;
            let recommendations = self
                .synthesizer
                .synthesize(risk.level, &factor_set.factors)
                .await?;

            tracing::info!(
                input_type = %extraction.source,
                risk_level = %risk.level,
                score = risk.score,
                elapsed_ms = %start.elapsed().as_millis(),
                "Profile complete"
            );

            Ok(ProfileReport {
                profile: ProfileSection {
                    answers: extraction.answers,
                    confidence: round_confidence(extraction.confidence),
                },
                factors: FactorSection {
                    list: factor_set.factors,
                    confidence: round_confidence(factor_set.confidence),
                },
                risk,
                recommendations,
                metadata: ReportMetadata {
                    input_type: extraction.source,
                    ocr_confidence: extraction.ocr_confidence.map(round_confidence),
                },
                assessed_at: Utc::now(),
                status: STATUS_OK.into(),
            })
        }
        .instrument(span)
        .await
    }

    fn check_complete(&self, answers: &SurveyAnswers) -> Result<ValidationResult, PipelineError> {
        let validation = self.validator.validate(answers);
        if !validation.is_valid {
            tracing::warn!(
                completeness = validation.completeness,
                missing = ?validation.missing_fields,
                "Profile incomplete"
            );
            return Err(PipelineError::IncompleteProfile {
                missing_fields: validation.missing_fields,
                completeness: validation.completeness,
            });
        }
        Ok(validation)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pipeline::collaborators::{MockOcrEngine, MockTextGenerator};
    use crate::pipeline::upload::UploadedImage;

    const EXTRACTED: &str =
        r#"{"age": 42, "smoker": true, "exercise": "rarely", "diet": "high sugar"}"#;
    const FACTORS: &str =
        r#"```json
{"factors": ["smoking", "poor diet", "low exercise"], "confidence": 0.876}
```"#;
    const RECOMMENDATIONS: &str =
        r#"["Quit smoking with a cessation program", "Reduce sugar intake", "Walk 30 minutes daily"]"#;

    fn pipeline(ocr: MockOcrEngine, generator: Arc<MockTextGenerator>) -> HealthPipeline {
        HealthPipeline::new(Arc::new(ocr), generator, PipelineConfig::default())
    }

    fn scripted(responses: &[&str]) -> Arc<MockTextGenerator> {
        Arc::new(MockTextGenerator::with_script(
            responses.iter().map(|r| Ok(r.to_string())).collect(),
        ))
    }

    fn structured(answers: SurveyAnswers) -> SurveySubmission {
        SurveySubmission {
            fields: Some(answers),
            ..Default::default()
        }
    }

    fn full_answers() -> SurveyAnswers {
        SurveyAnswers {
            age: Some(42),
            smoker: Some(true),
            exercise: Some("rarely".into()),
            diet: Some("high sugar".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn parse_input_structured() {
        let generator = Arc::new(MockTextGenerator::unavailable());
        let pipeline = pipeline(MockOcrEngine::failing(), generator.clone());

        let parsed = pipeline.parse_input(structured(full_answers())).await.unwrap();

        assert_eq!(parsed.answers, full_answers());
        assert!(parsed.missing_fields.is_empty());
        assert_eq!(parsed.confidence, 0.95);
        assert!(parsed.raw_text.is_none());
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn parse_input_rejects_half_complete_profile() {
        let pipeline = pipeline(
            MockOcrEngine::failing(),
            Arc::new(MockTextGenerator::unavailable()),
        );
        let answers = SurveyAnswers {
            age: Some(42),
            smoker: Some(true),
            ..Default::default()
        };

        let err = pipeline.parse_input(structured(answers)).await.unwrap_err();

        match err {
            PipelineError::IncompleteProfile {
                missing_fields,
                completeness,
            } => {
                assert_eq!(missing_fields, vec!["exercise", "diet"]);
                assert_eq!(completeness, 0.5);
            }
            other => panic!("expected IncompleteProfile, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn parse_input_without_any_mode_is_invalid() {
        let pipeline = pipeline(
            MockOcrEngine::failing(),
            Arc::new(MockTextGenerator::unavailable()),
        );
        let err = pipeline
            .parse_input(SurveySubmission::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput));
    }

    #[tokio::test]
    async fn parse_input_text_keeps_raw_text() {
        let pipeline = pipeline(MockOcrEngine::failing(), scripted(&[EXTRACTED]));
        let parsed = pipeline
            .parse_input(SurveySubmission {
                text: Some("I'm 42, I smoke, rarely exercise, eat a lot of sugar".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(parsed.answers.age, Some(42));
        assert_eq!(parsed.confidence, 0.85);
        assert!(parsed.raw_text.is_some());
    }

    #[tokio::test]
    async fn extract_factors_validates_first() {
        let generator = Arc::new(MockTextGenerator::new(FACTORS));
        let pipeline = pipeline(MockOcrEngine::failing(), generator.clone());
        let sparse = SurveyAnswers {
            age: Some(42),
            ..Default::default()
        };

        let err = pipeline.extract_factors(&sparse).await.unwrap_err();

        assert!(matches!(err, PipelineError::IncompleteProfile { .. }));
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn extract_factors_rounds_confidence() {
        let pipeline = pipeline(MockOcrEngine::failing(), scripted(&[FACTORS]));
        let report = pipeline.extract_factors(&full_answers()).await.unwrap();
        assert_eq!(report.factors, vec!["smoking", "poor diet", "low exercise"]);
        assert_eq!(report.confidence, 0.88);
    }

    #[test]
    fn classify_risk_is_deterministic() {
        let pipeline = pipeline(
            MockOcrEngine::failing(),
            Arc::new(MockTextGenerator::unavailable()),
        );
        let factors = vec!["smoking".to_string(), "poor diet".to_string()];
        let first = pipeline.classify_risk(&full_answers(), &factors).unwrap();
        let second = pipeline.classify_risk(&full_answers(), &factors).unwrap();

        // 30 smoking + 20 low activity + 15 unhealthy diet
        assert_eq!(first.score, 65);
        assert_eq!(first.level, RiskLevel::Moderate);
        assert_eq!(
            first.rationale,
            vec![
                "smoking",
                "low physical activity",
                "unhealthy diet",
                "high sugar intake"
            ]
        );
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn recommendations_report_echoes_inputs() {
        let pipeline = pipeline(MockOcrEngine::failing(), scripted(&[RECOMMENDATIONS]));
        let factors = vec!["smoking".to_string()];

        let report = pipeline
            .recommendations(RiskLevel::High, &factors)
            .await
            .unwrap();

        assert_eq!(report.risk_level, RiskLevel::High);
        assert_eq!(report.factors, factors);
        assert_eq!(report.recommendations.len(), 3);
        assert_eq!(report.status, "ok");
    }

    #[tokio::test]
    async fn complete_profile_from_text() {
        let generator = scripted(&[EXTRACTED, FACTORS, RECOMMENDATIONS]);
        let pipeline = pipeline(MockOcrEngine::failing(), generator.clone());

        let report = pipeline
            .complete_profile(SurveySubmission {
                text: Some("42 years old smoker, rarely exercises, high sugar diet".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.profile.answers, full_answers());
        assert_eq!(report.profile.confidence, 0.85);
        assert_eq!(report.factors.confidence, 0.88);
        assert_eq!(report.risk.score, 65);
        assert_eq!(report.risk.level, RiskLevel::Moderate);
        assert_eq!(report.recommendations.len(), 3);
        assert_eq!(report.metadata.input_type, InputSource::Text);
        assert!(report.metadata.ocr_confidence.is_none());
        assert_eq!(report.status, "ok");
        assert_eq!(generator.call_count(), 3);

        let prompts = generator.prompts();
        assert!(prompts[1].contains(r#""smoker":true"#));
        assert!(prompts[2].contains("Risk Level: moderate"));
    }

    #[tokio::test]
    async fn complete_profile_from_image_deletes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.jpg");
        std::fs::write(&path, b"jpeg").unwrap();
        let image = UploadedImage::new(&path, Some("image/jpeg".into()), 4);

        let generator = scripted(&[FACTORS, RECOMMENDATIONS]);
        let pipeline = pipeline(
            MockOcrEngine::new(
                "Age: 70\nSmoker: yes\nExercise: never\nDiet: high sugar diet\n",
                0.824,
            ),
            generator.clone(),
        );

        let report = pipeline
            .complete_profile(SurveySubmission {
                image: Some(image),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.profile.confidence, 0.82);
        assert_eq!(report.metadata.input_type, InputSource::Image);
        assert_eq!(report.metadata.ocr_confidence, Some(0.82));
        assert_eq!(report.risk.score, 85);
        assert_eq!(report.risk.level, RiskLevel::High);
        assert_eq!(generator.call_count(), 2);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn complete_profile_recovers_ocr_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.png");
        std::fs::write(&path, b"png").unwrap();
        let image = UploadedImage::new(&path, None, 3);

        let generator = scripted(&[r#"{"factors": []}"#, "[]"]);
        let pipeline = pipeline(MockOcrEngine::failing(), generator);

        let report = pipeline
            .complete_profile(SurveySubmission {
                image: Some(image),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.profile.confidence, 0.1);
        assert_eq!(report.profile.answers, SurveyAnswers::unreadable_image());
        assert_eq!(report.risk.level, RiskLevel::Low);
        assert!(report.recommendations.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn complete_profile_aborts_on_generation_failure() {
        let generator = Arc::new(MockTextGenerator::with_script(vec![
            Ok(FACTORS.to_string()),
            Err(GenerationError::Upstream {
                status: 500,
                body: "model not loaded".into(),
            }),
        ]));
        let pipeline = pipeline(MockOcrEngine::failing(), generator);

        let err = pipeline
            .complete_profile(structured(full_answers()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Generation(GenerationError::Upstream { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn collaborator_timeout_from_config_applies() {
        struct Stalled;

        #[async_trait::async_trait]
        impl TextGenerator for Stalled {
            async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(String::new())
            }
        }

        let config = PipelineConfig {
            collaborator_timeout_secs: Some(1),
            ..Default::default()
        };
        let pipeline = HealthPipeline::new(Arc::new(MockOcrEngine::failing()), Arc::new(Stalled), config);

        let err = pipeline.extract_factors(&full_answers()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(GenerationError::Timeout(1))));
    }

    #[test]
    fn profile_report_serializes_expected_shape() {
        let report = ProfileReport {
            profile: ProfileSection {
                answers: full_answers(),
                confidence: 0.95,
            },
            factors: FactorSection {
                list: vec!["smoking".into()],
                confidence: 0.85,
            },
            risk: RiskAssessment {
                level: RiskLevel::Moderate,
                score: 65,
                rationale: vec!["smoking".into()],
            },
            recommendations: vec!["Walk daily".into()],
            metadata: ReportMetadata {
                input_type: InputSource::Json,
                ocr_confidence: None,
            },
            assessed_at: Utc::now(),
            status: "ok".into(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["risk"]["risk_level"], "moderate");
        assert_eq!(json["factors"]["list"][0], "smoking");
        assert_eq!(json["metadata"]["input_type"], "json");
        assert!(json["metadata"].get("ocr_confidence").is_none());
        assert_eq!(json["status"], "ok");
    }
}
