use crate::models::{RiskLevel, SurveyAnswers};

/// Seed list of risk-factor categories offered to the model.
pub const COMMON_RISK_FACTORS: &[&str] = &[
    "smoking",
    "poor diet",
    "sedentary lifestyle",
    "high sugar intake",
    "obesity",
    "alcohol",
    "stress",
];

/// Prompt asking the model to turn free text into survey fields.
pub fn build_field_extraction_prompt(text: &str) -> String {
    format!(
        r#"
Extract health survey data from the following text and return ONLY a valid JSON object with these fields:
- age (number)
- smoker (boolean)
- exercise (string: "never", "rarely", "sometimes", "regularly", "daily")
- diet (string description)

Text: "{text}"

Return ONLY the JSON object, no explanation or markdown formatting.
Example format: {{"age": 42, "smoker": true, "exercise": "rarely", "diet": "high sugar"}}
"#
    )
}

/// Prompt asking the model for risk-factor tags of a profile.
pub fn build_factor_prompt(answers: &SurveyAnswers) -> String {
    let profile = serde_json::to_string(answers).unwrap_or_else(|_| "{}".into());
    let seeds = COMMON_RISK_FACTORS.join(", ");
    format!(
        r#"
Based on this health profile, identify risk factors.

Profile: {profile}

Common risk factors: {seeds}, etc.

Return ONLY a JSON object in this format:
{{"factors": ["factor1", "factor2"], "confidence": 0.88}}

No explanation, just the JSON.
"#
    )
}

/// Prompt asking the model for recommendations for a risk level.
pub fn build_recommendation_prompt(level: RiskLevel, factors: &[String]) -> String {
    let factors = factors.join(", ");
    format!(
        r#"
Generate 3-5 actionable, non-diagnostic health recommendations based on:
- Risk Level: {level}
- Risk Factors: {factors}

Return ONLY a JSON array of recommendation strings. Keep recommendations practical, specific, and encouraging.

Format: ["recommendation1", "recommendation2", "recommendation3"]

No explanation, just the JSON array.
"#
    )
}
