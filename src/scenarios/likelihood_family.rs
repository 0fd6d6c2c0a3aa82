/// Bernoulli likelihood against the unit-variance Gaussian approximation.
///
/// Both fits run on all bids with the price-only model. Their parameters are
/// then scored with the Bernoulli log-likelihood, which the Bernoulli fit
/// maximizes, so the approximation can only do as well or worse.
use crate::fitter::{FitResult, fit_dataset};
use crate::likelihood::{ObservationFamily, negative_log_likelihood};
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::pipeline::{Checks, ScenarioInput};
use crate::sigmoid::{FeatureMatrix, ModelKind};

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "likelihood_family",
    description: "Bernoulli against Gaussian-approximation fits on all bids",
    run,
});

const LIKELIHOOD_TOLERANCE: f64 = 1e-4;

pub fn run(scenario_name: &str, input: &ScenarioInput, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: observation family ===");
    let mut checks = Checks::new(scenario_name);
    let reference = input.config.reference_price;
    let context = input.context_for(&input.dataset, ModelKind::PriceOnly, false);

    let mut fits: Vec<FitResult> = Vec::with_capacity(2);
    for family in [ObservationFamily::Bernoulli, ObservationFamily::GaussianApproximation] {
        let options = input.fit_options().with_family(family);
        if let Some(fit) = checks.record(logger, family.label(), fit_dataset(&input.dataset, ModelKind::PriceOnly, reference, &options)) {
            fit.printout(logger, "all bids");
            if let Some(optimum) = checks.record(logger, family.label(), input.price(&fit.parameters, &context)) {
                optimum.printout(logger, family.label());
            }
            fits.push(fit);
        }
    }

    let [bernoulli, gaussian] = fits.as_slice() else {
        return checks.finish();
    };

    let outcomes = input.dataset.outcomes();
    let scored = FeatureMatrix::from_dataset(&input.dataset, ModelKind::PriceOnly, reference).and_then(|features| {
        let score = |fit: &FitResult| negative_log_likelihood(&fit.parameters, &outcomes, &features, ObservationFamily::Bernoulli).map(|nll| -nll);
        Ok((score(bernoulli)?, score(gaussian)?))
    });
    if let Some((bernoulli_ll, gaussian_ll)) = checks.record(logger, "bernoulli scoring", scored) {
        logln!(
            logger,
            LogEvent::Scenario,
            "Bernoulli log-likelihood of the Bernoulli fit {:.3}, of the Gaussian fit {:.3}",
            bernoulli_ll,
            gaussian_ll
        );
        checks.check(
            logger,
            bernoulli_ll >= gaussian_ll - LIKELIHOOD_TOLERANCE,
            format!("Bernoulli fit scores at least as well: {:.3} >= {:.3}", bernoulli_ll, gaussian_ll),
        );
    }

    checks.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::small_input;

    #[test]
    fn test_likelihood_family_passes_on_synthetic_bids() {
        let input = small_input(400);
        let mut logger = Logger::new();
        run("likelihood_family", &input, &mut logger).unwrap();
    }
}
