use thiserror::Error;

/// Errors raised while interpreting model values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid {kind}: {value}")]
    InvalidValue { kind: &'static str, value: String },
}

impl ModelError {
    pub(crate) fn invalid(kind: &'static str, value: &str) -> Self {
        Self::InvalidValue {
            kind,
            value: value.to_string(),
        }
    }
}
