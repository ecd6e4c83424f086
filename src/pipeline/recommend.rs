use std::sync::Arc;
use std::time::{Duration, Instant};

use super::collaborators::{with_deadline, TextGenerator};
use super::parser::parse_recommendations_response;
use super::prompt::build_recommendation_prompt;
use super::{GenerationError, PipelineError};
use crate::models::{Recommendations, RiskLevel};

/// Produces non-diagnostic recommendations for a risk level and factor list.
pub struct RecommendationSynthesizer {
    generator: Arc<dyn TextGenerator>,
    timeout: Option<Duration>,
}

impl RecommendationSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Option<Duration>) -> Self {
        Self { generator, timeout }
    }

    pub async fn synthesize(
        &self,
        level: RiskLevel,
        factors: &[String],
    ) -> Result<Recommendations, PipelineError> {
        let start = Instant::now();
        let prompt = build_recommendation_prompt(level, factors);

        let response = with_deadline(
            self.timeout,
            self.generator.generate(&prompt),
            GenerationError::Timeout,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Recommendation generation failed");
            PipelineError::from(e)
        })?;

        let recommendations = parse_recommendations_response(&response)?;

        tracing::info!(
            risk_level = %level,
            count = recommendations.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "Recommendations generated"
        );

        Ok(recommendations)
    }
}
