//! Error taxonomy for the stabilizer and the flexibility models

use thiserror::Error;

/// Errors raised while evaluating one control or model cycle.
#[derive(Debug, Error)]
pub enum StabilizerError {
    #[error("{context} has wrong dimension: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{context} contains a non-finite value")]
    NonFinite { context: &'static str },

    #[error("double support axis is undefined: feet separated by {separation} m in the ground plane")]
    DegenerateSupportAxis { separation: f64 },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised at the configuration boundary.
///
/// A rejected value never replaces the previously accepted one.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid time period: {0} (must be finite and > 0)")]
    InvalidTimePeriod(f64),

    #[error("invalid {which} gains: {reason}")]
    InvalidGains {
        which: &'static str,
        reason: String,
    },

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("toml write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

/// Check that `values` has exactly `expected` entries.
pub(crate) fn expect_len(
    context: &'static str,
    values: &[f64],
    expected: usize,
) -> Result<(), StabilizerError> {
    if values.len() != expected {
        return Err(StabilizerError::ShapeMismatch {
            context,
            expected,
            got: values.len(),
        });
    }
    Ok(())
}

/// Check that every entry of `values` is finite.
pub(crate) fn expect_finite<'a>(
    context: &'static str,
    values: impl IntoIterator<Item = &'a f64>,
) -> Result<(), StabilizerError> {
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(StabilizerError::NonFinite { context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_len_reports_dimensions() {
        let err = expect_len("deltaCom", &[0.0, 1.0], 3).unwrap_err();
        match err {
            StabilizerError::ShapeMismatch {
                context,
                expected,
                got,
            } => {
                assert_eq!(context, "deltaCom");
                assert_eq!(expected, 3);
                assert_eq!(got, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_expect_finite_rejects_nan() {
        assert!(expect_finite("flex", &[0.0, 1.0]).is_ok());
        assert!(matches!(
            expect_finite("flex", &[0.0, f64::NAN]),
            Err(StabilizerError::NonFinite { context: "flex" })
        ));
    }

    #[test]
    fn test_config_error_converts() {
        let err: StabilizerError = ConfigError::InvalidTimePeriod(-1.0).into();
        assert!(err.to_string().contains("-1"));
    }
}
