use crate::models::profile::has_text;
use crate::models::{SurveyAnswers, ValidationResult};

/// Required survey fields, in reporting order.
pub const REQUIRED_FIELDS: [&str; 4] = ["age", "smoker", "exercise", "diet"];

/// Completeness must exceed this fraction for a profile to be usable.
pub const MIN_COMPLETENESS: f32 = 0.5;

/// Field-presence completeness checks. Type and range are not checked here.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProfileValidator;

impl ProfileValidator {
    pub fn validate(&self, answers: &SurveyAnswers) -> ValidationResult {
        validate_profile(answers)
    }
}

/// Check which required fields are present (not absent, null, or empty).
pub fn validate_profile(answers: &SurveyAnswers) -> ValidationResult {
    let presence = [
        answers.age_supplied(),
        answers.smoker_supplied(),
        has_text(&answers.exercise),
        has_text(&answers.diet),
    ];

    let missing_fields: Vec<String> = REQUIRED_FIELDS
        .iter()
        .zip(presence)
        .filter(|(_, present)| !present)
        .map(|(field, _)| field.to_string())
        .collect();

    let present = REQUIRED_FIELDS.len() - missing_fields.len();
    let completeness = present as f32 / REQUIRED_FIELDS.len() as f32;
    let is_valid = completeness > MIN_COMPLETENESS;

    ValidationResult {
        is_valid,
        missing_fields,
        completeness,
        message: if is_valid {
            "Profile is valid".into()
        } else {
            ">50% fields missing".into()
        },
    }
}
