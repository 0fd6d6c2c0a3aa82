use argmin::core::{CostFunction, Error as ArgminError};

use crate::bids::BidDataset;
use crate::config::PricingConfig;
use crate::errors::PricingError;
use crate::likelihood::{LogLikelihood, ObservationFamily};
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::minimizer::{self, SearchOptions};
use crate::sigmoid::{FeatureMatrix, ModelKind, ModelParameters};

const STAGE: &str = "likelihood fit";

/// Relative simplex step for non-zero coordinates, and the absolute step for
/// zero coordinates, both in standardized units
const RELATIVE_STEP: f64 = 0.05;
const ZERO_STEP: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub family: ObservationFamily,
    pub search: SearchOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            family: ObservationFamily::Bernoulli,
            search: SearchOptions::default(),
        }
    }
}

impl FitOptions {
    pub fn from_config(config: &PricingConfig) -> Self {
        Self {
            family: config.family,
            search: config.fit_search,
        }
    }

    pub fn with_family(self, family: ObservationFamily) -> Self {
        Self { family, ..self }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub parameters: ModelParameters,
    pub log_likelihood: f64,
    pub negative_log_likelihood: f64,
    pub iterations: u64,
    pub observations: usize,
    pub family: ObservationFamily,
}

impl FitResult {
    pub fn printout(&self, logger: &mut Logger, label: &str) {
        logln!(
            logger,
            LogEvent::Fit,
            "{} [{}]: {} ; negative log-likelihood {:.3} over {} bids, {} iterations",
            label,
            self.family.label(),
            self.parameters.describe(),
            self.negative_log_likelihood,
            self.observations,
            self.iterations
        );
    }
}

/// Affine change of coordinates that centers and scales each feature column.
///
/// With x' = (x - mean) / scale the linear predictor is unchanged when
/// b' = b * scale and a' = a + Σ b * mean, so the search can run on a
/// well-conditioned problem and still report parameters of the raw features.
struct Standardization {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardization {
    fn of(features: &FeatureMatrix) -> Self {
        let columns = features.columns();
        let rows = features.rows() as f64;
        let mut means = vec![0.0; columns];
        for row in features.iter_rows() {
            for (mean, x) in means.iter_mut().zip(row) {
                *mean += x / rows;
            }
        }
        let mut variances = vec![0.0; columns];
        for row in features.iter_rows() {
            for ((variance, mean), x) in variances.iter_mut().zip(&means).zip(row) {
                *variance += (x - mean).powi(2) / rows;
            }
        }

        let mut scales = Vec::with_capacity(columns);
        for (mean, variance) in means.iter_mut().zip(variances) {
            let sd = variance.sqrt();
            if sd > 1e-12 {
                scales.push(sd);
            } else {
                // constant column: leave it in raw units
                *mean = 0.0;
                scales.push(1.0);
            }
        }
        Self { means, scales }
    }

    fn search_point(&self, params: &ModelParameters) -> Vec<f64> {
        let mut values = Vec::with_capacity(params.slopes.len() + 1);
        let shift: f64 = params.slopes.iter().zip(&self.means).map(|(b, m)| b * m).sum();
        values.push(params.intercept + shift);
        values.extend(params.slopes.iter().zip(&self.scales).map(|(b, s)| b * s));
        values
    }

    fn model_parameters(&self, values: &[f64]) -> Result<ModelParameters, PricingError> {
        let standard = ModelParameters::from_vec(values)?;
        let slopes: Vec<f64> = standard.slopes.iter().zip(&self.scales).map(|(b, s)| b / s).collect();
        let shift: f64 = slopes.iter().zip(&self.means).map(|(b, m)| b * m).sum();
        Ok(ModelParameters::new(standard.intercept - shift, slopes))
    }
}

/// Negated log-likelihood over standardized coordinates
struct FitProblem<'a> {
    likelihood: LogLikelihood<'a>,
    standardization: Standardization,
}

impl CostFunction for FitProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        let params = self.standardization.model_parameters(param)?;
        Ok(self.likelihood.negative_log_likelihood(&params)?)
    }
}

/// Maximum-likelihood estimate of the logistic win model.
///
/// `initial_guess` is intercept first, then one slope per feature column.
pub fn fit(
    observed_wins: &[f64],
    features: &FeatureMatrix,
    initial_guess: &[f64],
    options: &FitOptions,
) -> Result<FitResult, PricingError> {
    let likelihood = LogLikelihood::new(observed_wins, features, options.family)?;
    if initial_guess.len() != likelihood.parameter_dimension() {
        return Err(PricingError::DimensionMismatch {
            what: "initial guess",
            expected: likelihood.parameter_dimension(),
            actual: initial_guess.len(),
        });
    }

    let standardization = Standardization::of(features);
    let start = standardization.search_point(&ModelParameters::from_vec(initial_guess)?);
    let problem = FitProblem {
        likelihood,
        standardization,
    };

    let outcome = minimizer::minimize(STAGE, &problem, &start, RELATIVE_STEP, ZERO_STEP, &options.search)?;
    let parameters = problem.standardization.model_parameters(&outcome.best_param)?;
    let log_likelihood = problem.likelihood.log_likelihood(&parameters)?;

    Ok(FitResult {
        parameters,
        log_likelihood,
        negative_log_likelihood: -log_likelihood,
        iterations: outcome.iterations,
        observations: observed_wins.len(),
        family: options.family,
    })
}

/// Fit a model of the given kind on a dataset, starting from all-zero parameters
pub fn fit_dataset(dataset: &BidDataset, kind: ModelKind, reference_price: f64, options: &FitOptions) -> Result<FitResult, PricingError> {
    dataset.ensure_not_empty()?;
    let features = FeatureMatrix::from_dataset(dataset, kind, reference_price)?;
    let initial_guess = vec![0.0; kind.dimension()];
    fit(&dataset.outcomes(), &features, &initial_guess, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SegmentProfile, generate_segment};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const REFERENCE: f64 = 25000.0;

    fn within(actual: f64, expected: f64, relative: f64) -> bool {
        (actual - expected).abs() <= relative * expected.abs()
    }

    fn price_only_profile() -> SegmentProfile {
        SegmentProfile {
            truth: ModelParameters::new(12.0, vec![-16.0]),
            ..SegmentProfile::police(4000)
        }
    }

    #[test]
    fn test_recovers_price_only_parameters() {
        let mut rng = StdRng::seed_from_u64(7);
        let dataset = generate_segment(&price_only_profile(), REFERENCE, 15000.0, &mut rng).unwrap();
        let fit = fit_dataset(&dataset, ModelKind::PriceOnly, REFERENCE, &FitOptions::default()).unwrap();

        assert!(within(fit.parameters.intercept, 12.0, 0.10), "a = {}", fit.parameters.intercept);
        assert!(within(fit.parameters.price_coefficient().unwrap(), -16.0, 0.10), "b = {}", fit.parameters.price_coefficient().unwrap());
        assert!((fit.negative_log_likelihood + fit.log_likelihood).abs() < 1e-12);
        assert_eq!(fit.observations, 4000);
    }

    #[test]
    fn test_recovers_order_size_parameters() {
        let profile = SegmentProfile {
            truth: ModelParameters::new(13.0, vec![-16.0, -0.05]),
            ..SegmentProfile::police(4000)
        };
        let mut rng = StdRng::seed_from_u64(11);
        let dataset = generate_segment(&profile, REFERENCE, 15000.0, &mut rng).unwrap();
        let fit = fit_dataset(&dataset, ModelKind::PriceAndOrderSize, REFERENCE, &FitOptions::default()).unwrap();

        let p = &fit.parameters;
        assert!(within(p.intercept, 13.0, 0.15), "a = {}", p.intercept);
        assert!(within(p.price_coefficient().unwrap(), -16.0, 0.10), "b = {}", p.price_coefficient().unwrap());
        let c = p.order_size_coefficient().unwrap();
        assert!(within(c, -0.05, 0.25), "c = {}", c);
    }

    #[test]
    fn test_extended_model_never_fits_worse() {
        let mut rng = StdRng::seed_from_u64(3);
        let dataset = generate_segment(&SegmentProfile::corporate(1500), REFERENCE, 15000.0, &mut rng).unwrap();
        let options = FitOptions::default();
        let basic = fit_dataset(&dataset, ModelKind::PriceOnly, REFERENCE, &options).unwrap();
        let extended = fit_dataset(&dataset, ModelKind::PriceAndOrderSize, REFERENCE, &options).unwrap();
        assert!(extended.log_likelihood >= basic.log_likelihood - 1e-4);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(5);
        let dataset = generate_segment(&SegmentProfile::police(800), REFERENCE, 15000.0, &mut rng).unwrap();
        let first = fit_dataset(&dataset, ModelKind::PriceOnly, REFERENCE, &FitOptions::default()).unwrap();
        let second = fit_dataset(&dataset, ModelKind::PriceOnly, REFERENCE, &FitOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_standardization_round_trip() {
        let features = FeatureMatrix::from_rows(2, &[vec![0.7, 10.0], vec![0.9, 30.0], vec![0.8, 20.0]]).unwrap();
        let standardization = Standardization::of(&features);
        let params = ModelParameters::new(4.0, vec![-6.0, 0.02]);
        let back = standardization.model_parameters(&standardization.search_point(&params)).unwrap();
        assert!((back.intercept - params.intercept).abs() < 1e-9);
        for (b, expected) in back.slopes.iter().zip(&params.slopes) {
            assert!((b - expected).abs() < 1e-9);
        }

        let constant = FeatureMatrix::from_rows(1, &[vec![0.8], vec![0.8]]).unwrap();
        let standardization = Standardization::of(&constant);
        assert_eq!(standardization.search_point(&ModelParameters::new(1.0, vec![2.0])), vec![1.0, 2.0]);
    }

    #[test]
    fn test_rejects_empty_input_and_bad_guess() {
        let empty = FeatureMatrix::from_rows(1, &[]).unwrap();
        let err = fit(&[], &empty, &[0.0, 0.0], &FitOptions::default()).unwrap_err();
        assert!(matches!(err, PricingError::EmptySegment { .. }));

        let features = FeatureMatrix::from_rows(1, &[vec![0.8], vec![0.9]]).unwrap();
        let err = fit(&[1.0, 0.0], &features, &[0.0, 0.0, 0.0], &FitOptions::default()).unwrap_err();
        assert!(matches!(err, PricingError::DimensionMismatch { what: "initial guess", .. }));
    }

    #[test]
    fn test_tiny_budget_reports_non_convergence() {
        let mut rng = StdRng::seed_from_u64(9);
        let dataset = generate_segment(&SegmentProfile::police(400), REFERENCE, 15000.0, &mut rng).unwrap();
        let options = FitOptions {
            search: SearchOptions {
                max_iterations: 5,
                sd_tolerance: 1e-12,
            },
            ..FitOptions::default()
        };
        let err = fit_dataset(&dataset, ModelKind::PriceOnly, REFERENCE, &options).unwrap_err();
        assert!(matches!(err, PricingError::NonConvergence { stage: STAGE, .. }));
    }

    #[test]
    fn test_all_wins_does_not_return_nan() {
        let features = FeatureMatrix::from_rows(1, &[vec![0.7], vec![0.8], vec![0.9]]).unwrap();
        match fit(&[1.0, 1.0, 1.0], &features, &[0.0, 0.0], &FitOptions::default()) {
            Ok(result) => {
                assert!(result.parameters.is_finite());
                assert!(result.negative_log_likelihood >= 0.0);
                assert!(result.negative_log_likelihood < 1e-3);
            }
            Err(err) => assert!(err.is_numerical(), "unexpected error {:?}", err),
        }
    }
}
