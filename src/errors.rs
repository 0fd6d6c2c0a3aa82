use thiserror::Error;

/// Errors raised while loading bids, fitting the win model or searching for a price.
///
/// Every variant is local to one segment computation: the scenario runner logs it
/// and carries on with the next segment or scenario.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("Numerical domain error in {stage}: {reason}")]
    NumericalDomain { stage: &'static str, reason: String },

    #[error("{stage} did not converge after {iterations} iterations ({reason})")]
    NonConvergence {
        stage: &'static str,
        iterations: u64,
        reason: String,
    },

    #[error("Optimizer failure in {stage}: {message}")]
    Optimizer { stage: &'static str, message: String },

    #[error("Malformed bid data at line {line}: {reason}")]
    MalformedData { line: usize, reason: String },

    #[error("Segment '{name}' has no bids")]
    EmptySegment { name: String },

    #[error("Segment '{name}' range {start}..{end} is outside the dataset ({rows} rows)")]
    SegmentOutOfRange {
        name: String,
        start: usize,
        end: usize,
        rows: usize,
    },

    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PricingError {
    /// True for failures of the numerical search rather than of the input data
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            PricingError::NumericalDomain { .. }
                | PricingError::NonConvergence { .. }
                | PricingError::Optimizer { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let err = PricingError::NonConvergence {
            stage: "fit",
            iterations: 500,
            reason: "MaxItersReached".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "fit did not converge after 500 iterations (MaxItersReached)"
        );

        let err = PricingError::SegmentOutOfRange {
            name: "corporate".to_string(),
            start: 2000,
            end: 4000,
            rows: 3000,
        };
        assert!(err.to_string().contains("2000..4000"));
    }

    #[test]
    fn test_is_numerical() {
        assert!(PricingError::NumericalDomain { stage: "fit", reason: "nan".into() }.is_numerical());
        assert!(!PricingError::EmptySegment { name: "all".into() }.is_numerical());
    }
}
