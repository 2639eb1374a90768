//! Error types for option handling and configuration loading.

use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Errors returned when setting a compositor option from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    /// No section with this name exists.
    #[error("No such config section: {section}")]
    InvalidSection { section: String },

    /// The section exists but has no option with this name.
    #[error("No such option: {section}/{option}")]
    InvalidOption { section: String, option: String },

    /// The option exists but the value does not parse as its declared type.
    #[error("Invalid value for {section}/{option}: {value:?}")]
    InvalidValue {
        section: String,
        option: String,
        value: String,
    },
}

/// Error codes of the flat C ABI.
///
/// The discriminants are part of the ABI and must not be reordered.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    Ok = 0,
    InvalidOptionValue,
    InvalidOptionSection,
    InvalidOption,
}

impl From<&OptionError> for ErrorCode {
    fn from(err: &OptionError) -> Self {
        match err {
            OptionError::InvalidSection { .. } => Self::InvalidOptionSection,
            OptionError::InvalidOption { .. } => Self::InvalidOption,
            OptionError::InvalidValue { .. } => Self::InvalidOptionValue,
        }
    }
}

impl From<Result<(), OptionError>> for ErrorCode {
    fn from(result: Result<(), OptionError>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(err) => Self::from(&err),
        }
    }
}

impl ErrorCode {
    /// Snake-case name, as handed to scripts.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Errors that can occur while loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A key maps to a value that has no option type (arrays, nested tables, dates).
    #[error("Unsupported value for {section}/{option}")]
    Unsupported { section: String, option: String },

    /// A top-level key is not a table.
    #[error("Top-level key '{key}' is not a section")]
    NotASection { key: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_discriminants() {
        assert_eq!(ErrorCode::Ok as i32, 0);
        assert_eq!(ErrorCode::InvalidOptionValue as i32, 1);
        assert_eq!(ErrorCode::InvalidOptionSection as i32, 2);
        assert_eq!(ErrorCode::InvalidOption as i32, 3);
    }

    #[test]
    fn test_code_from_error() {
        let err = OptionError::InvalidOption {
            section: "core".into(),
            option: "nope".into(),
        };
        assert_eq!(ErrorCode::from(&err), ErrorCode::InvalidOption);
        assert_eq!(ErrorCode::from(Err(err)).name(), "invalid_option");
        assert_eq!(ErrorCode::from(Ok(())), ErrorCode::Ok);
    }
}
