//! Errors raised by the curation core.

/// Errors that can occur while decoding spectra or curating a bin.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CurationError {
    /// A peak token of a spectrum text could not be decoded.
    #[error("malformed peak '{token}': {reason}")]
    Parse {
        /// The offending `mz:intensity` token
        token: String,
        /// What was wrong with it
        reason: String,
    },

    /// No spectra contributed to the bin.
    #[error("no spectra contributed to the bin")]
    EmptyInput,

    /// A curation or matching parameter is out of its valid range.
    #[error("invalid parameter {name} = {value}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
    },
}

impl CurationError {
    pub fn parse(token: &str, reason: impl Into<String>) -> Self {
        CurationError::Parse {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CurationError>;
