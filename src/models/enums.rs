use serde::{Deserialize, Serialize};

use super::ProfileError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ProfileError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ProfileError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(ExerciseFrequency {
    Never => "never",
    Rarely => "rarely",
    Sometimes => "sometimes",
    Regularly => "regularly",
    Daily => "daily",
});

str_enum!(RiskLevel {
    Low => "low",
    Moderate => "moderate",
    High => "high",
});

str_enum!(InputSource {
    Image => "image",
    Text => "text",
    Json => "json",
});

impl ExerciseFrequency {
    /// Case-insensitive lookup used on free-form survey answers.
    /// Surrounding whitespace is not stripped.
    pub fn parse_loose(s: &str) -> Option<Self> {
        s.to_lowercase().parse().ok()
    }
}
