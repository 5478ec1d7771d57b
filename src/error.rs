use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DehazeError {
    #[error("invalid input image: {reason}")]
    InvalidInput { reason: String },

    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("expected a {}x{} map but got {}x{}", expected.0, expected.1, got.0, got.1)]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
}

impl DehazeError {
    pub(crate) fn input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Returns an error unless `got` equals `expected`.
    pub(crate) fn check_shape(
        expected: (usize, usize),
        got: (usize, usize),
    ) -> Result<(), DehazeError> {
        match expected == got {
            true => Ok(()),
            false => Err(Self::ShapeMismatch { expected, got }),
        }
    }
}
