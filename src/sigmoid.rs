//! Logistic win-probability model
//!
//! The probability of winning a bid is the logistic function of a linear predictor
//! `intercept + Σ slope_j * x_j`, where the explanatory variables are the price
//! ratio (price / reference price) and optionally the order size in units.

use crate::bids::BidDataset;
use crate::errors::PricingError;

/// Probabilities are kept inside [EPSILON, 1 - EPSILON] so that they are strictly
/// inside (0, 1) in floating point and their logarithms stay finite
pub const EPSILON: f64 = 1e-12;

/// Which explanatory variables the model uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Price ratio only (intercept a, slope b)
    PriceOnly,
    /// Price ratio and order size (intercept a, slopes b and c)
    PriceAndOrderSize,
}

impl ModelKind {
    /// Number of explanatory columns
    pub fn columns(self) -> usize {
        match self {
            ModelKind::PriceOnly => 1,
            ModelKind::PriceAndOrderSize => 2,
        }
    }

    /// Number of fitted parameters, intercept included
    pub fn dimension(self) -> usize {
        self.columns() + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelKind::PriceOnly => "price",
            ModelKind::PriceAndOrderSize => "price+order size",
        }
    }

    /// Feature row for a quote at `price` on an order of `order_size` units
    pub fn features_for(self, price: f64, reference_price: f64, order_size: Option<f64>) -> Result<Vec<f64>, PricingError> {
        let ratio = price / reference_price;
        match (self, order_size) {
            (ModelKind::PriceOnly, _) => Ok(vec![ratio]),
            (ModelKind::PriceAndOrderSize, Some(q)) => Ok(vec![ratio, q]),
            (ModelKind::PriceAndOrderSize, None) => Err(PricingError::DimensionMismatch {
                what: "order size for the two-variable model",
                expected: 2,
                actual: 1,
            }),
        }
    }
}

/// Row-major matrix of explanatory variables, one row per bid
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: usize,
    values: Vec<f64>,
}

impl FeatureMatrix {
    pub fn from_rows(columns: usize, rows: &[Vec<f64>]) -> Result<Self, PricingError> {
        let mut values = Vec::with_capacity(rows.len() * columns);
        for row in rows {
            if row.len() != columns {
                return Err(PricingError::DimensionMismatch {
                    what: "feature row",
                    expected: columns,
                    actual: row.len(),
                });
            }
            values.extend_from_slice(row);
        }
        Ok(Self { columns, values })
    }

    /// Explanatory variables of every bid in the dataset for the given model
    pub fn from_dataset(dataset: &BidDataset, kind: ModelKind, reference_price: f64) -> Result<Self, PricingError> {
        let rows: Vec<Vec<f64>> = dataset
            .records()
            .iter()
            .map(|record| match kind {
                ModelKind::PriceOnly => vec![record.price_ratio(reference_price)],
                ModelKind::PriceAndOrderSize => vec![record.price_ratio(reference_price), record.unit_count as f64],
            })
            .collect();
        Self::from_rows(kind.columns(), &rows)
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        if self.columns == 0 {
            0
        } else {
            self.values.len() / self.columns
        }
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.columns.max(1))
    }
}

/// Fitted intercept and slopes
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    pub intercept: f64,
    pub slopes: Vec<f64>,
}

impl ModelParameters {
    pub fn new(intercept: f64, slopes: Vec<f64>) -> Self {
        Self { intercept, slopes }
    }

    /// Intercept first, then slopes in column order
    pub fn from_vec(values: &[f64]) -> Result<Self, PricingError> {
        match values.split_first() {
            Some((intercept, slopes)) if !slopes.is_empty() => Ok(Self::new(*intercept, slopes.to_vec())),
            _ => Err(PricingError::DimensionMismatch {
                what: "parameter vector",
                expected: 2,
                actual: values.len(),
            }),
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.slopes.len() + 1);
        values.push(self.intercept);
        values.extend_from_slice(&self.slopes);
        values
    }

    pub fn kind(&self) -> Option<ModelKind> {
        match self.slopes.len() {
            1 => Some(ModelKind::PriceOnly),
            2 => Some(ModelKind::PriceAndOrderSize),
            _ => None,
        }
    }

    pub fn price_coefficient(&self) -> Option<f64> {
        self.slopes.first().copied()
    }

    pub fn order_size_coefficient(&self) -> Option<f64> {
        self.slopes.get(1).copied()
    }

    pub fn is_finite(&self) -> bool {
        self.intercept.is_finite() && self.slopes.iter().all(|s| s.is_finite())
    }

    pub fn linear_predictor(&self, features: &[f64]) -> f64 {
        debug_assert_eq!(features.len(), self.slopes.len());
        self.intercept + self.slopes.iter().zip(features).map(|(b, x)| b * x).sum::<f64>()
    }

    /// Win probability for one feature row
    pub fn probability(&self, features: &[f64]) -> f64 {
        logistic(self.linear_predictor(features))
    }

    /// Price at which the price-only model predicts the target win probability
    pub fn price_for_probability(&self, target: f64, reference_price: f64) -> Option<f64> {
        if self.kind() != Some(ModelKind::PriceOnly) {
            return None;
        }
        let b = self.price_coefficient().filter(|b| *b != 0.0)?;
        let target = target.clamp(EPSILON, 1.0 - EPSILON);
        let logit = target.ln() - (1.0 - target).ln();
        Some((logit - self.intercept) / b * reference_price)
    }

    /// a:.., b:.., c:.. with three decimals
    pub fn describe(&self) -> String {
        let mut text = format!("a:{:.3}", self.intercept);
        if let Some(b) = self.price_coefficient() {
            text.push_str(&format!(", b:{:.3}", b));
        }
        if let Some(c) = self.order_size_coefficient() {
            text.push_str(&format!(", c:{:.3}", c));
        }
        text
    }
}

/// Overflow-safe logistic function, clamped to [EPSILON, 1 - EPSILON]
pub fn logistic(z: f64) -> f64 {
    let p = if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    };
    p.clamp(EPSILON, 1.0 - EPSILON)
}

/// `probability(params, features)` for callers holding a raw feature row
pub fn probability(params: &ModelParameters, features: &[f64]) -> f64 {
    params.probability(features)
}
