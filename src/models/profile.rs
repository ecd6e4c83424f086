use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::enums::ExerciseFrequency;
use super::ProfileError;

/// Accepted age domain for a strict profile.
pub const MIN_AGE: i64 = 1;
pub const MAX_AGE: i64 = 120;

/// Survey answers as they flow between pipeline stages.
///
/// Every field is optional: extraction may recover only part of a form.
/// Deserialization is lenient because answers arrive from OCR text, model
/// output, or callers: `age` accepts numbers or numeric strings, `smoker`
/// accepts booleans or yes/no/true/false strings, and `null` equals absent.
/// Empty strings are kept so completeness validation can report them.
/// A supplied `age` or `smoker` that cannot be read as its type is kept
/// verbatim in [`UnparsedAnswers`]: it still counts as answered and is
/// serialized back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSurveyAnswers", into = "RawSurveyAnswers")]
pub struct SurveyAnswers {
    pub age: Option<i64>,
    pub smoker: Option<bool>,
    pub exercise: Option<String>,
    pub diet: Option<String>,
    pub unparsed: UnparsedAnswers,
}

/// Supplied values whose type did not match the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnparsedAnswers {
    pub age: Option<Value>,
    pub smoker: Option<Value>,
}

impl SurveyAnswers {
    /// Number of answered fields, counting only non-empty text.
    pub fn answered_count(&self) -> usize {
        [
            self.age_supplied(),
            self.smoker_supplied(),
            has_text(&self.exercise),
            has_text(&self.diet),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    /// `age` was given, whether or not it reads as a number.
    pub fn age_supplied(&self) -> bool {
        self.age.is_some() || self.unparsed.age.is_some()
    }

    /// `smoker` was given, whether or not it reads as a boolean.
    pub fn smoker_supplied(&self) -> bool {
        self.smoker.is_some() || self.unparsed.smoker.is_some()
    }

    /// Placeholder answers used when an uploaded image cannot be read.
    pub fn unreadable_image() -> Self {
        Self {
            age: Some(0),
            smoker: Some(false),
            exercise: Some("unknown".into()),
            diet: Some("unable to process image".into()),
            unparsed: UnparsedAnswers::default(),
        }
    }
}

pub(crate) fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

/// A fully specified, range-checked health profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthProfile {
    pub age: u8,
    pub smoker: bool,
    pub exercise: ExerciseFrequency,
    pub diet: String,
}

impl HealthProfile {
    pub fn new(
        age: u8,
        smoker: bool,
        exercise: ExerciseFrequency,
        diet: impl Into<String>,
    ) -> Result<Self, ProfileError> {
        let profile = Self {
            age,
            smoker,
            exercise,
            diet: diet.into(),
        };
        profile.check()?;
        Ok(profile)
    }

    fn check(&self) -> Result<(), ProfileError> {
        let age = i64::from(self.age);
        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            return Err(ProfileError::AgeOutOfRange(age));
        }
        if self.diet.trim().is_empty() {
            return Err(ProfileError::MissingField("diet"));
        }
        Ok(())
    }
}

impl TryFrom<SurveyAnswers> for HealthProfile {
    type Error = ProfileError;

    fn try_from(answers: SurveyAnswers) -> Result<Self, Self::Error> {
        if let Some(raw) = &answers.unparsed.age {
            return Err(ProfileError::InvalidType {
                field: "age",
                value: raw.to_string(),
            });
        }
        let age = answers.age.ok_or(ProfileError::MissingField("age"))?;
        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            return Err(ProfileError::AgeOutOfRange(age));
        }
        if let Some(raw) = &answers.unparsed.smoker {
            return Err(ProfileError::InvalidType {
                field: "smoker",
                value: raw.to_string(),
            });
        }
        let smoker = answers.smoker.ok_or(ProfileError::MissingField("smoker"))?;
        let exercise = answers
            .exercise
            .filter(|s| !s.is_empty())
            .ok_or(ProfileError::MissingField("exercise"))?;
        let exercise = exercise.trim().to_lowercase().parse::<ExerciseFrequency>()?;
        let diet = answers
            .diet
            .filter(|s| !s.trim().is_empty())
            .ok_or(ProfileError::MissingField("diet"))?;

        Self::new(age as u8, smoker, exercise, diet)
    }
}

impl From<&HealthProfile> for SurveyAnswers {
    fn from(profile: &HealthProfile) -> Self {
        Self {
            age: Some(i64::from(profile.age)),
            smoker: Some(profile.smoker),
            exercise: Some(profile.exercise.as_str().to_string()),
            diet: Some(profile.diet.clone()),
            unparsed: UnparsedAnswers::default(),
        }
    }
}

impl From<HealthProfile> for SurveyAnswers {
    fn from(profile: HealthProfile) -> Self {
        Self::from(&profile)
    }
}

// ──────────────────────────────────────────────
// Lenient field deserializers
// ──────────────────────────────────────────────

/// Wire shape of [`SurveyAnswers`].
#[derive(Serialize, Deserialize)]
struct RawSurveyAnswers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    age: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    smoker: Option<Value>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    exercise: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    diet: Option<String>,
}

impl From<RawSurveyAnswers> for SurveyAnswers {
    fn from(raw: RawSurveyAnswers) -> Self {
        let (age, unparsed_age) = read_field(raw.age, read_age);
        let (smoker, unparsed_smoker) = read_field(raw.smoker, read_smoker);
        Self {
            age,
            smoker,
            exercise: raw.exercise,
            diet: raw.diet,
            unparsed: UnparsedAnswers {
                age: unparsed_age,
                smoker: unparsed_smoker,
            },
        }
    }
}

impl From<SurveyAnswers> for RawSurveyAnswers {
    fn from(answers: SurveyAnswers) -> Self {
        Self {
            age: answers.age.map(Value::from).or(answers.unparsed.age),
            smoker: answers.smoker.map(Value::from).or(answers.unparsed.smoker),
            exercise: answers.exercise,
            diet: answers.diet,
        }
    }
}

/// Split a supplied value into its typed reading, or keep it verbatim.
/// `null` and the empty string are absent.
fn read_field<T>(
    value: Option<Value>,
    read: impl Fn(&Value) -> Option<T>,
) -> (Option<T>, Option<Value>) {
    match value {
        None | Some(Value::Null) => (None, None),
        Some(Value::String(s)) if s.is_empty() => (None, None),
        Some(value) => match read(&value) {
            Some(typed) => (Some(typed), None),
            None => (None, Some(value)),
        },
    }
}

fn read_age(value: &Value) -> Option<i64> {
    let truncate = |f: f64| f.is_finite().then(|| f.trunc() as i64);
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn read_smoker(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_yes_no(s),
        _ => None,
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Map a yes/no/true/false answer (any case) to a boolean.
pub fn parse_yes_no(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "yes" | "true" => Some(true),
        "no" | "false" => Some(false),
        _ => None,
    }
}
