use std::error::Error;

use tracing::warn;

use crate::bids::BidDataset;
use crate::config::{OrderSizeBasis, PricingConfig};
use crate::errors::PricingError;
use crate::fitter::{self, FitOptions, FitResult};
use crate::logger::{LogEvent, Logger};
use crate::margin::{self, PriceOptimum, PricingContext};
use crate::provider::DataProvider;
use crate::sigmoid::{ModelKind, ModelParameters};
use crate::{errln, logln};

/// Data and settings shared by every scenario of one run
pub struct ScenarioInput {
    pub dataset: BidDataset,
    pub config: PricingConfig,
    provider: Box<dyn DataProvider>,
}

impl ScenarioInput {
    /// Load every bid from `provider`; segments are later sliced through it too
    pub fn new(provider: Box<dyn DataProvider>, config: PricingConfig) -> Result<Self, PricingError> {
        config.validate()?;
        let dataset = provider.load_all()?;
        dataset.ensure_not_empty()?;
        Ok(Self { dataset, config, provider })
    }

    /// Configured segments in order, each sliced out of the full dataset
    pub fn segments(&self) -> Result<Vec<BidDataset>, PricingError> {
        self.config
            .segments
            .iter()
            .map(|spec| self.provider.slice(&self.dataset, &spec.name, spec.start, spec.end))
            .collect()
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions::from_config(&self.config)
    }

    /// Pricing context for a dataset: the two-variable model is priced at the
    /// mean order size of all bids, or of `dataset` itself when configured so
    pub fn context_for(&self, dataset: &BidDataset, kind: ModelKind, different_cost: bool) -> PricingContext {
        let context = PricingContext::new(self.config.costs.unit_cost_for(different_cost), self.config.reference_price);
        match kind {
            ModelKind::PriceOnly => context,
            ModelKind::PriceAndOrderSize => context.with_order_size(self.mean_order_size_for(dataset)),
        }
    }

    pub fn mean_order_size_for(&self, dataset: &BidDataset) -> f64 {
        match self.config.order_size_basis {
            OrderSizeBasis::AllBids => self.dataset.mean_order_size(),
            OrderSizeBasis::Segment => dataset.mean_order_size(),
        }
    }

    /// Optimal price for already fitted parameters
    pub fn price(&self, params: &ModelParameters, context: &PricingContext) -> Result<PriceOptimum, PricingError> {
        margin::optimal_price(
            params,
            context,
            self.config.initial_price_guess,
            self.config.price_bounds,
            &self.config.price_search,
        )
    }
}

/// Fit, optimal price and contribution comparison for one dataset or segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentOutcome {
    pub segment: String,
    pub kind: ModelKind,
    pub fit: FitResult,
    pub context: PricingContext,
    pub optimum: PriceOptimum,
    pub total_units: u64,
    /// Optimal expected margin per unit times every unit offered
    pub expected_contribution: f64,
    pub realized_contribution: f64,
}

impl SegmentOutcome {
    /// Expected over realized contribution; infinite when nothing was realized
    pub fn contribution_ratio(&self) -> f64 {
        if self.realized_contribution == 0.0 {
            f64::INFINITY
        } else {
            self.expected_contribution / self.realized_contribution
        }
    }

    pub fn printout(&self, logger: &mut Logger) {
        self.fit.printout(logger, &format!("{} ({})", self.segment, self.kind.label()));
        self.optimum.printout(logger, &self.segment);
        logln!(
            logger,
            LogEvent::Scenario,
            "{}: price {:.2}, expected contribution {:.0} over {} units vs realized {:.0} (ratio {:.3})",
            self.segment,
            self.optimum.price,
            self.expected_contribution,
            self.total_units,
            self.realized_contribution,
            self.contribution_ratio()
        );
    }
}

/// Fit the model on a dataset, price it, and aggregate contributions
pub fn evaluate_segment(input: &ScenarioInput, dataset: &BidDataset, kind: ModelKind, different_cost: bool) -> Result<SegmentOutcome, PricingError> {
    let fit = fitter::fit_dataset(dataset, kind, input.config.reference_price, &input.fit_options())?;
    let context = input.context_for(dataset, kind, different_cost);
    let optimum = input.price(&fit.parameters, &context)?;
    let total_units = dataset.total_units();
    Ok(SegmentOutcome {
        segment: dataset.name.clone(),
        kind,
        expected_contribution: optimum.expected_margin * total_units as f64,
        realized_contribution: dataset.realized_total_margin(),
        fit,
        context,
        optimum,
        total_units,
    })
}

/// Pass/fail bookkeeping of one scenario.
///
/// A failed computation is recorded and logged while the scenario keeps going;
/// `finish` turns everything recorded into the scenario's result.
pub struct Checks {
    scenario_name: String,
    errors: Vec<String>,
}

impl Checks {
    pub fn new(scenario_name: &str) -> Self {
        Self {
            scenario_name: scenario_name.to_string(),
            errors: Vec::new(),
        }
    }

    /// Log ✓ or ✗ for a condition and remember failures
    pub fn check(&mut self, logger: &mut Logger, passed: bool, msg: String) {
        if passed {
            logln!(logger, LogEvent::Scenario, "✓ {}", msg);
        } else {
            errln!(logger, LogEvent::Scenario, "✗ {}", msg);
            self.errors.push(msg);
        }
    }

    /// Unwrap a segment computation, recording its error instead of aborting
    pub fn record<T>(&mut self, logger: &mut Logger, what: &str, result: Result<T, PricingError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(scenario = %self.scenario_name, what, numerical = e.is_numerical(), error = %e, "computation failed");
                let msg = format!("{}: {}", what, e);
                errln!(logger, LogEvent::Scenario, "✗ {}", msg);
                self.errors.push(msg);
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), Box<dyn Error>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(format!("Scenario '{}' validation failed:\n{}", self.scenario_name, self.errors.join("\n")).into())
        }
    }
}
