pub mod assessment;
pub mod enums;
pub mod profile;

pub use assessment::*;
pub use enums::*;
pub use profile::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Age {0} is outside the accepted range 1-120")]
    AgeOutOfRange(i64),

    #[error("Wrong type for {field}: {value}")]
    InvalidType { field: &'static str, value: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidEnum { field: String, value: String },
}
