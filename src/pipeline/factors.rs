use std::sync::Arc;
use std::time::{Duration, Instant};

use super::collaborators::{with_deadline, TextGenerator};
use super::parser::parse_factor_response;
use super::prompt::build_factor_prompt;
use super::{GenerationError, PipelineError};
use crate::models::{FactorSet, SurveyAnswers};

/// Asks the text-generation collaborator for risk-factor tags.
///
/// The tags drive recommendations and add the obesity, alcohol, and stress
/// points to the risk score.
pub struct FactorExtractor {
    generator: Arc<dyn TextGenerator>,
    timeout: Option<Duration>,
}

impl FactorExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Option<Duration>) -> Self {
        Self { generator, timeout }
    }

    pub async fn extract(&self, answers: &SurveyAnswers) -> Result<FactorSet, PipelineError> {
        let start = Instant::now();
        let prompt = build_factor_prompt(answers);

        let response = with_deadline(
            self.timeout,
            self.generator.generate(&prompt),
            GenerationError::Timeout,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Factor extraction failed");
            PipelineError::from(e)
        })?;

        let (factors, confidence) = parse_factor_response(&response)?;

        tracing::info!(
            factor_count = factors.len(),
            confidence,
            elapsed_ms = %start.elapsed().as_millis(),
            "Risk factors extracted"
        );

        Ok(FactorSet {
            factors,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::collaborators::MockTextGenerator;

    fn answers() -> SurveyAnswers {
        SurveyAnswers {
            age: Some(42),
            smoker: Some(true),
            exercise: Some("rarely".into()),
            diet: Some("high sugar".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn returns_reported_factors_and_confidence() {
        let generator = Arc::new(MockTextGenerator::new(
            r#"{"factors": ["smoking", "poor diet", "low exercise"], "confidence": 0.88}"#,
        ));
        let extractor = FactorExtractor::new(generator.clone(), None);

        let set = extractor.extract(&answers()).await.unwrap();

        assert_eq!(set.factors, vec!["smoking", "poor diet", "low exercise"]);
        assert!((set.confidence - 0.88).abs() < f32::EPSILON);
        assert!(generator.prompts()[0].contains(r#""age":42"#));
    }

    #[tokio::test]
    async fn missing_confidence_defaults() {
        let extractor = FactorExtractor::new(
            Arc::new(MockTextGenerator::new(r#"{"factors": ["smoking"]}"#)),
            None,
        );
        let set = extractor.extract(&answers()).await.unwrap();
        assert!((set.confidence - 0.85).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn unavailable_generator_is_generation_error() {
        let extractor = FactorExtractor::new(Arc::new(MockTextGenerator::unavailable()), None);
        let err = extractor.extract(&answers()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(GenerationError::Connection(_))));
    }

    #[tokio::test]
    async fn prose_response_is_parse_error() {
        let extractor = FactorExtractor::new(
            Arc::new(MockTextGenerator::new("The main factor is smoking.")),
            None,
        );
        let err = extractor.extract(&answers()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionParse(_)));
    }
}
