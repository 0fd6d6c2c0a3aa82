use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::PricingError;
use crate::likelihood::ObservationFamily;
use crate::margin::PriceBounds;
use crate::minimizer::SearchOptions;

/// Unit costs of the two product variants
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CostStructure {
    pub unit_cost: f64,
    /// Cost of the variant built differently (e.g. the police version)
    pub differential_unit_cost: f64,
}

impl CostStructure {
    /// Pick the unit cost for a scenario; the caller decides which variant applies
    pub fn unit_cost_for(&self, different_cost: bool) -> f64 {
        if different_cost {
            self.differential_unit_cost
        } else {
            self.unit_cost
        }
    }
}

impl Default for CostStructure {
    fn default() -> Self {
        Self {
            unit_cost: 15000.0,
            differential_unit_cost: 16000.0,
        }
    }
}

/// Contiguous half-open row range of the dataset representing one buyer class
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SegmentSpec {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl SegmentSpec {
    pub fn new(name: &str, start: usize, end: usize) -> Self {
        Self {
            name: name.to_string(),
            start,
            end,
        }
    }
}

/// Which bids the mean order size of the price and order size model comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderSizeBasis {
    /// Mean over every bid, shared by all segments
    #[default]
    AllBids,
    /// Mean over the bids of the segment being priced
    Segment,
}

/// All tunable constants of a pricing run.
///
/// Passed by reference into every scenario so that runs with different costs or
/// bounds never share state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Manufacturer's suggested retail price used to normalize prices into ratios
    pub reference_price: f64,
    pub costs: CostStructure,
    pub initial_price_guess: f64,
    pub segments: Vec<SegmentSpec>,
    pub order_sizes: Vec<f64>,
    pub order_size_basis: OrderSizeBasis,
    pub family: ObservationFamily,
    pub price_bounds: PriceBounds,
    pub fit_search: SearchOptions,
    pub price_search: SearchOptions,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let costs = CostStructure::default();
        let reference_price = 25000.0;
        Self {
            reference_price,
            costs,
            initial_price_guess: (costs.unit_cost + reference_price) / 2.0,
            segments: vec![
                SegmentSpec::new("police", 0, 2000),
                SegmentSpec::new("corporate", 2000, 4000),
            ],
            order_sizes: vec![20.0, 40.0],
            order_size_basis: OrderSizeBasis::AllBids,
            family: ObservationFamily::Bernoulli,
            price_bounds: PriceBounds::CostToReference,
            fit_search: SearchOptions::default(),
            price_search: SearchOptions {
                max_iterations: 2000,
                sd_tolerance: 1e-8,
            },
        }
    }
}

impl PricingConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, PricingError> {
        let config: PricingConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, PricingError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), PricingError> {
        if !(self.reference_price.is_finite() && self.reference_price > 0.0) {
            return Err(PricingError::InvalidConfig(format!(
                "reference_price must be positive, got {}",
                self.reference_price
            )));
        }
        for (label, cost) in [
            ("unit_cost", self.costs.unit_cost),
            ("differential_unit_cost", self.costs.differential_unit_cost),
        ] {
            if !(cost.is_finite() && cost >= 0.0) {
                return Err(PricingError::InvalidConfig(format!("{} must be non-negative, got {}", label, cost)));
            }
            if cost >= self.reference_price {
                return Err(PricingError::InvalidConfig(format!(
                    "{} ({}) must be below reference_price ({})",
                    label, cost, self.reference_price
                )));
            }
        }
        if !(self.initial_price_guess.is_finite() && self.initial_price_guess > 0.0) {
            return Err(PricingError::InvalidConfig(format!(
                "initial_price_guess must be positive, got {}",
                self.initial_price_guess
            )));
        }
        for segment in &self.segments {
            if segment.start >= segment.end {
                return Err(PricingError::InvalidConfig(format!(
                    "segment '{}' has an empty range {}..{}",
                    segment.name, segment.start, segment.end
                )));
            }
        }
        if self.order_sizes.iter().any(|q| !(q.is_finite() && *q > 0.0)) {
            return Err(PricingError::InvalidConfig("order_sizes must be positive".to_string()));
        }
        if let PriceBounds::Explicit { min, max } = self.price_bounds {
            if !(min.is_finite() && max.is_finite() && min < max) {
                return Err(PricingError::InvalidConfig(format!("price bounds {}..{} are invalid", min, max)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PricingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_price_guess, 20000.0);
        assert_eq!(config.segments.len(), 2);
        assert_eq!(config.costs.unit_cost_for(true), 16000.0);
        assert_eq!(config.costs.unit_cost_for(false), 15000.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
            reference_price = 30000.0
            family = "gaussian_approximation"
            price_bounds = "unbounded"
            order_sizes = [10.0]

            [costs]
            unit_cost = 18000.0

            [[segments]]
            name = "fleet"
            start = 0
            end = 100
        "#;
        let config = PricingConfig::from_toml_str(text).unwrap();
        assert_eq!(config.reference_price, 30000.0);
        assert_eq!(config.costs.unit_cost, 18000.0);
        assert_eq!(config.costs.differential_unit_cost, 16000.0);
        assert_eq!(config.family, ObservationFamily::GaussianApproximation);
        assert_eq!(config.price_bounds, PriceBounds::Unbounded);
        assert_eq!(config.segments, vec![SegmentSpec::new("fleet", 0, 100)]);
        assert_eq!(config.fit_search, SearchOptions::default());
        assert_eq!(config.order_size_basis, OrderSizeBasis::AllBids);
    }

    #[test]
    fn test_order_size_basis_parses() {
        let config = PricingConfig::from_toml_str("order_size_basis = \"segment\"").unwrap();
        assert_eq!(config.order_size_basis, OrderSizeBasis::Segment);
    }

    #[test]
    fn test_explicit_bounds_parse() {
        let text = r#"
            [price_bounds.explicit]
            min = 16000.0
            max = 24000.0
        "#;
        let config = PricingConfig::from_toml_str(text).unwrap();
        assert_eq!(config.price_bounds, PriceBounds::Explicit { min: 16000.0, max: 24000.0 });
    }

    #[test]
    fn test_rejects_cost_above_reference() {
        let text = r#"
            reference_price = 10000.0
        "#;
        let err = PricingConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, PricingError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_inverted_segment() {
        let mut config = PricingConfig::default();
        config.segments.push(SegmentSpec::new("broken", 10, 10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_toml() {
        let err = PricingConfig::from_toml_str("reference_price = \"lots\"").unwrap_err();
        assert!(matches!(err, PricingError::ConfigParse(_)));
    }
}
