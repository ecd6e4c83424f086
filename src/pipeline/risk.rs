//! Deterministic risk scoring and classification.
//!
//! Pure functions over survey answers and factor tags: no collaborator calls,
//! no clock, no randomness. Identical input always yields identical output.

use crate::models::{ExerciseFrequency, RiskAssessment, RiskLevel, SurveyAnswers};

use super::PipelineError;

/// Fixed scoring policy. Behavior depends on these exact values.
pub mod risk_weights {
    pub const AGE_OVER_60: u32 = 20;
    pub const AGE_OVER_45: u32 = 10;
    pub const SMOKING: u32 = 30;
    pub const LOW_ACTIVITY: u32 = 20;
    pub const MODERATE_ACTIVITY: u32 = 10;
    pub const UNHEALTHY_DIET: u32 = 15;
    pub const OBESITY: u32 = 15;
    pub const ALCOHOL: u32 = 10;
    pub const STRESS: u32 = 10;

    pub const MAX_SCORE: u32 = 100;
}

/// Classification boundaries, inclusive on the lower side of each tier.
pub mod risk_thresholds {
    pub const SENIOR_AGE: i64 = 60;
    pub const MIDDLE_AGE: i64 = 45;

    pub const MODERATE: u8 = 40;
    pub const HIGH: u8 = 70;
}

const UNHEALTHY_DIET_MARKERS: &[&str] = &["high sugar", "high fat", "processed"];
const HIGH_SUGAR_MARKER: &str = "high sugar";

/// Factor keywords and the points each contributes.
const FACTOR_RULES: &[(&[&str], u32)] = &[
    (&["obesity", "overweight"], risk_weights::OBESITY),
    (&["alcohol"], risk_weights::ALCOHOL),
    (&["stress"], risk_weights::STRESS),
];

/// Ordered set of rationale tags: first insertion wins, duplicates are ignored.
#[derive(Debug, Default, Clone)]
pub struct RationaleBuilder {
    tags: Vec<String>,
}

impl RationaleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag unless an identical one is already present.
    /// Returns whether the tag was added.
    pub fn push(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn build(self) -> Vec<String> {
        self.tags
    }
}

/// Scores survey answers. Stateless; shared freely across requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct RiskScorer;

impl RiskScorer {
    pub fn calculate_risk_score(
        &self,
        answers: &SurveyAnswers,
        factors: &[String],
    ) -> (u8, Vec<String>) {
        calculate_risk_score(answers, factors)
    }

    pub fn classify_risk_level(&self, score: u8) -> RiskLevel {
        classify_risk_level(score)
    }

    pub fn assess_risk(
        &self,
        answers: &SurveyAnswers,
        factors: &[String],
    ) -> Result<RiskAssessment, PipelineError> {
        assess_risk(answers, factors)
    }
}

/// Compute the capped score and rationale tags for a profile and factor list.
pub fn calculate_risk_score(answers: &SurveyAnswers, factors: &[String]) -> (u8, Vec<String>) {
    let mut score: u32 = 0;
    let mut rationale = RationaleBuilder::new();

    if let Some(age) = answers.age {
        if age > risk_thresholds::SENIOR_AGE {
            score += risk_weights::AGE_OVER_60;
            rationale.push("age over 60");
        } else if age > risk_thresholds::MIDDLE_AGE {
            score += risk_weights::AGE_OVER_45;
            rationale.push("age over 45");
        }
    }

    if answers.smoker == Some(true) {
        score += risk_weights::SMOKING;
        rationale.push("smoking");
    }

    match answers.exercise.as_deref().and_then(ExerciseFrequency::parse_loose) {
        Some(ExerciseFrequency::Never | ExerciseFrequency::Rarely) => {
            score += risk_weights::LOW_ACTIVITY;
            rationale.push("low physical activity");
        }
        Some(ExerciseFrequency::Sometimes) => {
            score += risk_weights::MODERATE_ACTIVITY;
            rationale.push("moderate physical activity");
        }
        _ => {}
    }

    let diet = answers.diet.as_deref().unwrap_or_default().to_lowercase();
    if UNHEALTHY_DIET_MARKERS.iter().any(|m| diet.contains(m)) {
        score += risk_weights::UNHEALTHY_DIET;
        rationale.push("unhealthy diet");
    }
    if diet.contains(HIGH_SUGAR_MARKER) {
        rationale.push("high sugar intake");
    }

    for factor in factors {
        let lower = factor.to_lowercase();
        for (keywords, points) in FACTOR_RULES {
            if keywords.iter().any(|k| lower.contains(k)) {
                score += points;
                rationale.push(factor.as_str());
            }
        }
    }

    let capped = score.min(risk_weights::MAX_SCORE) as u8;
    (capped, rationale.build())
}

/// Map a score to its risk tier.
pub fn classify_risk_level(score: u8) -> RiskLevel {
    if score >= risk_thresholds::HIGH {
        RiskLevel::High
    } else if score >= risk_thresholds::MODERATE {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

/// Score and classify a profile.
///
/// Never fails for well-formed input; the error path only reports a broken
/// internal invariant.
pub fn assess_risk(
    answers: &SurveyAnswers,
    factors: &[String],
) -> Result<RiskAssessment, PipelineError> {
    let (score, rationale) = calculate_risk_score(answers, factors);

    if u32::from(score) > risk_weights::MAX_SCORE {
        return Err(PipelineError::RiskAssessment(format!(
            "score {score} exceeds {}",
            risk_weights::MAX_SCORE
        )));
    }
    if let Some(dup) = first_duplicate(&rationale) {
        return Err(PipelineError::RiskAssessment(format!(
            "duplicate rationale tag {dup:?}"
        )));
    }

    let level = classify_risk_level(score);
    tracing::info!(level = %level, score, tags = rationale.len(), "Risk assessment");

    Ok(RiskAssessment {
        level,
        score,
        rationale,
    })
}

fn first_duplicate(tags: &[String]) -> Option<&str> {
    tags.iter()
        .enumerate()
        .find(|(i, tag)| tags[..*i].contains(*tag))
        .map(|(_, tag)| tag.as_str())
}
