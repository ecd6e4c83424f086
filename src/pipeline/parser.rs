use serde::Deserialize;
use serde_json::Value;

use super::PipelineError;
use crate::models::SurveyAnswers;

/// Confidence assumed for model output that does not report its own.
pub const DEFAULT_MODEL_CONFIDENCE: f32 = 0.85;

/// Remove Markdown code-fence markers (```json / ```) wrapped around a model
/// response.
pub fn strip_code_fences(response: &str) -> String {
    response
        .trim()
        .replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn parse_json(response: &str) -> Result<Value, PipelineError> {
    let cleaned = strip_code_fences(response);
    serde_json::from_str(&cleaned).map_err(|e| PipelineError::ExtractionParse(e.to_string()))
}

/// Parse the model's field-extraction response into survey answers.
pub fn parse_answers_response(response: &str) -> Result<SurveyAnswers, PipelineError> {
    let value = parse_json(response)?;
    if !value.is_object() {
        return Err(PipelineError::ExtractionParse(
            "expected a JSON object of survey fields".into(),
        ));
    }
    serde_json::from_value(value).map_err(|e| PipelineError::ExtractionParse(e.to_string()))
}

/// Parse `{"factors": [...], "confidence": n}`.
///
/// Missing `factors` yields an empty list; missing `confidence` yields
/// [`DEFAULT_MODEL_CONFIDENCE`]; out-of-range confidence is clamped.
pub fn parse_factor_response(response: &str) -> Result<(Vec<String>, f32), PipelineError> {
    #[derive(Deserialize)]
    struct RawFactors {
        #[serde(default)]
        factors: Vec<String>,
        confidence: Option<f32>,
    }

    let value = parse_json(response)?;
    if !value.is_object() {
        return Err(PipelineError::ExtractionParse(
            "expected a JSON object with a factors array".into(),
        ));
    }
    let raw: RawFactors =
        serde_json::from_value(value).map_err(|e| PipelineError::ExtractionParse(e.to_string()))?;

    let confidence = raw
        .confidence
        .unwrap_or(DEFAULT_MODEL_CONFIDENCE)
        .clamp(0.0, 1.0);
    Ok((raw.factors, confidence))
}

/// Parse a JSON array of recommendation strings.
///
/// Valid JSON that is not an array yields an empty list; non-string items are
/// skipped. Only unparseable JSON is an error.
pub fn parse_recommendations_response(response: &str) -> Result<Vec<String>, PipelineError> {
    let value = parse_json(response)?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect()),
        other => {
            tracing::warn!(kind = %json_kind(&other), "Recommendations response is not an array");
            Ok(Vec::new())
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
