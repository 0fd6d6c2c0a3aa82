use argmin::core::{CostFunction, Error as ArgminError};
use serde::Deserialize;

use crate::errors::PricingError;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::minimizer::{self, SearchOptions};
use crate::sigmoid::{ModelParameters, probability};

const STAGE: &str = "price search";
const RELATIVE_STEP: f64 = 0.05;
/// Absolute simplex step in dollars when the start price is zero
const ZERO_STEP: f64 = 100.0;
/// Penalty per squared dollar outside the admissible price range
const BOUND_PENALTY: f64 = 1.0;

/// Admissible range for the optimal price
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PriceBounds {
    /// Any price the search reaches
    Unbounded,
    /// unit cost <= price <= reference price
    #[default]
    CostToReference,
    Explicit { min: f64, max: f64 },
}

impl PriceBounds {
    /// Lower and upper limit for a given cost and reference price
    pub fn limits(&self, cost: f64, reference_price: f64) -> (f64, f64) {
        match *self {
            PriceBounds::Unbounded => (f64::NEG_INFINITY, f64::INFINITY),
            PriceBounds::CostToReference => (cost, reference_price),
            PriceBounds::Explicit { min, max } => (min, max),
        }
    }
}

/// Everything about a quote that is not the price itself
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingContext {
    pub cost: f64,
    pub reference_price: f64,
    /// Required by the two-variable model, ignored by the price-only one
    pub order_size: Option<f64>,
}

impl PricingContext {
    pub fn new(cost: f64, reference_price: f64) -> Self {
        Self {
            cost,
            reference_price,
            order_size: None,
        }
    }

    pub fn with_order_size(self, order_size: f64) -> Self {
        Self {
            order_size: Some(order_size),
            ..self
        }
    }
}

/// Win probability at `price`
pub fn win_probability(params: &ModelParameters, context: &PricingContext, price: f64) -> Result<f64, PricingError> {
    let kind = params.kind().ok_or(PricingError::DimensionMismatch {
        what: "model slopes",
        expected: 2,
        actual: params.slopes.len(),
    })?;
    let features = kind.features_for(price, context.reference_price, context.order_size)?;
    Ok(probability(params, &features))
}

/// P(win at price) * (price - cost), per unit
pub fn expected_margin(params: &ModelParameters, context: &PricingContext, price: f64) -> Result<f64, PricingError> {
    Ok(win_probability(params, context, price)? * (price - context.cost))
}

/// Expected margin scaled to a number of units
pub fn expected_contribution(params: &ModelParameters, context: &PricingContext, price: f64, units: f64) -> Result<f64, PricingError> {
    Ok(expected_margin(params, context, price)? * units)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceOptimum {
    pub price: f64,
    /// Expected margin per unit at `price`
    pub expected_margin: f64,
    pub win_probability: f64,
    pub iterations: u64,
}

impl PriceOptimum {
    pub fn printout(&self, logger: &mut Logger, label: &str) {
        logln!(
            logger,
            LogEvent::Pricing,
            "{}: optimal price {:.2}, win probability {:.3}, expected margin per unit {:.2} ({} iterations)",
            label,
            self.price,
            self.win_probability,
            self.expected_margin,
            self.iterations
        );
    }
}

/// Negated expected margin with the price clamped into its bounds
struct MarginProblem<'a> {
    params: &'a ModelParameters,
    context: &'a PricingContext,
    lower: f64,
    upper: f64,
}

impl CostFunction for MarginProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        let price = param[0];
        let clamped = price.clamp(self.lower, self.upper);
        let outside = price - clamped;
        let margin = expected_margin(self.params, self.context, clamped)?;
        Ok(-margin + BOUND_PENALTY * outside * outside)
    }
}

/// Price maximizing the expected margin per unit
pub fn optimal_price(
    params: &ModelParameters,
    context: &PricingContext,
    initial_price: f64,
    bounds: PriceBounds,
    search: &SearchOptions,
) -> Result<PriceOptimum, PricingError> {
    if !params.is_finite() {
        return Err(PricingError::NumericalDomain {
            stage: STAGE,
            reason: format!("non-finite model parameters {:?}", params.to_vec()),
        });
    }
    if !(context.reference_price.is_finite() && context.reference_price > 0.0 && context.cost.is_finite()) {
        return Err(PricingError::NumericalDomain {
            stage: STAGE,
            reason: format!("cost {} and reference price {} must be finite", context.cost, context.reference_price),
        });
    }
    let (lower, upper) = bounds.limits(context.cost, context.reference_price);
    if !(lower <= upper) {
        return Err(PricingError::InvalidConfig(format!("price bounds {}..{} are empty", lower, upper)));
    }
    // fail on a missing order size before searching
    win_probability(params, context, initial_price)?;

    let problem = MarginProblem {
        params,
        context,
        lower,
        upper,
    };
    let start = [initial_price.clamp(lower, upper)];
    let outcome = minimizer::minimize(STAGE, &problem, &start, RELATIVE_STEP, ZERO_STEP, search)?;

    let price = outcome.best_param[0].clamp(lower, upper);
    Ok(PriceOptimum {
        price,
        expected_margin: expected_margin(params, context, price)?,
        win_probability: win_probability(params, context, price)?,
        iterations: outcome.iterations,
    })
}
