use serde::Deserialize;
use statrs::distribution::{ChiSquared, Continuous, ContinuousCDF, Normal};

use crate::errors::PricingError;
use crate::sigmoid::{FeatureMatrix, ModelParameters};

/// Density used for each observed win/loss outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationFamily {
    /// y ~ Bernoulli(p): the correct likelihood for a binary outcome
    #[default]
    Bernoulli,
    /// y ~ Normal(p, 1): reproduces an older formulation for comparison only
    GaussianApproximation,
}

impl ObservationFamily {
    pub fn label(self) -> &'static str {
        match self {
            ObservationFamily::Bernoulli => "bernoulli",
            ObservationFamily::GaussianApproximation => "gaussian approximation",
        }
    }
}

/// Log-likelihood of observed outcomes under the logistic win model.
///
/// Probabilities come out of the model already clamped to [EPSILON, 1 - EPSILON],
/// so every Bernoulli term is a finite logarithm. A non-finite total can only come
/// from non-finite parameters and is reported as a domain error, never returned.
pub struct LogLikelihood<'a> {
    outcomes: &'a [f64],
    features: &'a FeatureMatrix,
    family: ObservationFamily,
    unit_normal: Normal,
}

impl<'a> LogLikelihood<'a> {
    pub fn new(outcomes: &'a [f64], features: &'a FeatureMatrix, family: ObservationFamily) -> Result<Self, PricingError> {
        if outcomes.len() != features.rows() {
            return Err(PricingError::DimensionMismatch {
                what: "outcomes vs feature rows",
                expected: features.rows(),
                actual: outcomes.len(),
            });
        }
        if outcomes.is_empty() {
            return Err(PricingError::EmptySegment { name: "likelihood input".to_string() });
        }
        if let Some(bad) = outcomes.iter().find(|y| **y != 0.0 && **y != 1.0) {
            return Err(PricingError::MalformedData {
                line: 0,
                reason: format!("observed outcome must be 0 or 1, got {}", bad),
            });
        }
        if features.iter_rows().flatten().any(|x| !x.is_finite()) {
            return Err(PricingError::NumericalDomain {
                stage: "likelihood",
                reason: "feature matrix contains non-finite values".to_string(),
            });
        }
        let unit_normal = Normal::new(0.0, 1.0).map_err(|e| PricingError::NumericalDomain {
            stage: "likelihood",
            reason: e.to_string(),
        })?;
        Ok(Self {
            outcomes,
            features,
            family,
            unit_normal,
        })
    }

    /// Parameters expected by this likelihood, intercept included
    pub fn parameter_dimension(&self) -> usize {
        self.features.columns() + 1
    }

    pub fn log_likelihood(&self, params: &ModelParameters) -> Result<f64, PricingError> {
        if params.slopes.len() != self.features.columns() {
            return Err(PricingError::DimensionMismatch {
                what: "model slopes vs feature columns",
                expected: self.features.columns(),
                actual: params.slopes.len(),
            });
        }
        if !params.is_finite() {
            return Err(PricingError::NumericalDomain {
                stage: "likelihood",
                reason: format!("non-finite parameters {:?}", params.to_vec()),
            });
        }

        let mut total = 0.0;
        for (row, &y) in self.features.iter_rows().zip(self.outcomes) {
            let p = params.probability(row);
            total += match self.family {
                ObservationFamily::Bernoulli => y * p.ln() + (1.0 - y) * (1.0 - p).ln(),
                ObservationFamily::GaussianApproximation => self.unit_normal.ln_pdf(y - p),
            };
        }

        if !total.is_finite() {
            return Err(PricingError::NumericalDomain {
                stage: "likelihood",
                reason: format!("log-likelihood evaluated to {}", total),
            });
        }
        Ok(total)
    }

    /// Objective handed to the minimizer
    pub fn negative_log_likelihood(&self, params: &ModelParameters) -> Result<f64, PricingError> {
        Ok(-self.log_likelihood(params)?)
    }
}

/// `negative_log_likelihood(params, observed_wins, features)` as a single call
pub fn negative_log_likelihood(
    params: &ModelParameters,
    observed_wins: &[f64],
    features: &FeatureMatrix,
    family: ObservationFamily,
) -> Result<f64, PricingError> {
    LogLikelihood::new(observed_wins, features, family)?.negative_log_likelihood(params)
}

/// Likelihood-ratio comparison of two nested fits
#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodRatio {
    /// Gain in log-likelihood of the larger model
    pub improvement: f64,
    /// 2 * improvement
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
}

pub fn likelihood_ratio(
    restricted_log_likelihood: f64,
    restricted_dimension: usize,
    full_log_likelihood: f64,
    full_dimension: usize,
) -> Result<LikelihoodRatio, PricingError> {
    if full_dimension <= restricted_dimension {
        return Err(PricingError::DimensionMismatch {
            what: "nested model parameters",
            expected: restricted_dimension + 1,
            actual: full_dimension,
        });
    }
    let degrees_of_freedom = full_dimension - restricted_dimension;
    let improvement = full_log_likelihood - restricted_log_likelihood;
    let statistic = 2.0 * improvement;
    let chi_squared = ChiSquared::new(degrees_of_freedom as f64).map_err(|e| PricingError::NumericalDomain {
        stage: "likelihood ratio",
        reason: e.to_string(),
    })?;
    // a full model that fits worse than its restriction did not converge properly
    let p_value = 1.0 - chi_squared.cdf(statistic.max(0.0));
    Ok(LikelihoodRatio {
        improvement,
        statistic,
        degrees_of_freedom,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_column(ratios: &[f64]) -> FeatureMatrix {
        let rows: Vec<Vec<f64>> = ratios.iter().map(|r| vec![*r]).collect();
        FeatureMatrix::from_rows(1, &rows).unwrap()
    }

    #[test]
    fn test_bernoulli_matches_hand_computation() {
        let features = single_column(&[0.8, 0.9]);
        let outcomes = [1.0, 0.0];
        let params = ModelParameters::new(8.0, vec![-10.0]);
        // p(0.8) = 0.5, p(0.9) = logistic(-1)
        let p2 = 1.0 / (1.0 + 1.0f64.exp());
        let expected = -(0.5f64.ln() + (1.0 - p2).ln());
        let nll = negative_log_likelihood(&params, &outcomes, &features, ObservationFamily::Bernoulli).unwrap();
        assert!((nll - expected).abs() < 1e-12);
    }

    #[test]
    fn test_all_wins_with_certain_model_approaches_zero() {
        let features = single_column(&[0.7; 50]);
        let outcomes = [1.0; 50];
        let confident = ModelParameters::new(60.0, vec![-1.0]);
        let nll = negative_log_likelihood(&confident, &outcomes, &features, ObservationFamily::Bernoulli).unwrap();
        assert!(nll >= 0.0);
        assert!(nll < 1e-9);

        let hopeless = ModelParameters::new(-60.0, vec![-1.0]);
        let nll = negative_log_likelihood(&hopeless, &outcomes, &features, ObservationFamily::Bernoulli).unwrap();
        assert!(nll.is_finite());
        assert!(nll > 50.0 * 20.0);
    }

    #[test]
    fn test_extreme_parameters_stay_finite() {
        let features = single_column(&[0.5, 1.2]);
        let outcomes = [0.0, 1.0];
        let params = ModelParameters::new(1e8, vec![-1e9]);
        let ll = LogLikelihood::new(&outcomes, &features, ObservationFamily::Bernoulli).unwrap();
        assert!(ll.log_likelihood(&params).unwrap().is_finite());
    }

    #[test]
    fn test_non_finite_parameters_are_domain_errors() {
        let features = single_column(&[0.8]);
        let outcomes = [1.0];
        let params = ModelParameters::new(f64::NAN, vec![1.0]);
        let err = negative_log_likelihood(&params, &outcomes, &features, ObservationFamily::Bernoulli).unwrap_err();
        assert!(matches!(err, PricingError::NumericalDomain { .. }));
    }

    #[test]
    fn test_gaussian_family_uses_unit_normal_density() {
        let features = single_column(&[0.8]);
        let outcomes = [1.0];
        let params = ModelParameters::new(8.0, vec![-10.0]);
        let expected = -(-0.5 * (2.0 * std::f64::consts::PI).ln() - 0.5 * 0.25);
        let nll = negative_log_likelihood(&params, &outcomes, &features, ObservationFamily::GaussianApproximation).unwrap();
        assert!((nll - expected).abs() < 1e-12);
    }

    #[test]
    fn test_input_validation() {
        let features = single_column(&[0.8, 0.9]);
        assert!(matches!(
            LogLikelihood::new(&[1.0], &features, ObservationFamily::Bernoulli),
            Err(PricingError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            LogLikelihood::new(&[1.0, 0.5], &features, ObservationFamily::Bernoulli),
            Err(PricingError::MalformedData { .. })
        ));
        let empty = single_column(&[]);
        assert!(matches!(
            LogLikelihood::new(&[], &empty, ObservationFamily::Bernoulli),
            Err(PricingError::EmptySegment { .. })
        ));

        let ll = LogLikelihood::new(&[1.0, 0.0], &features, ObservationFamily::Bernoulli).unwrap();
        let two_slopes = ModelParameters::new(0.0, vec![1.0, 1.0]);
        assert!(matches!(ll.log_likelihood(&two_slopes), Err(PricingError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_likelihood_ratio() {
        let lr = likelihood_ratio(-1000.0, 2, -1000.0 + 3.841_458_820_694_124 / 2.0, 3).unwrap();
        assert_eq!(lr.degrees_of_freedom, 1);
        assert!((lr.p_value - 0.05).abs() < 1e-6);

        let no_gain = likelihood_ratio(-1000.0, 2, -1000.0, 3).unwrap();
        assert!((no_gain.p_value - 1.0).abs() < 1e-12);

        assert!(likelihood_ratio(-10.0, 3, -9.0, 3).is_err());
    }
}
