use crate::errors::PricingError;
use crate::logger::{LogEvent, Logger};
use crate::logln;

/// One historical fleet-sales bid.
///
/// Only the base fields are stored; total price, units sold and total margin are
/// always recomputed from them so they can never disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct BidRecord {
    pub unit_count: u32,
    pub unit_price: f64,
    pub won: bool,
    /// (list_price - unit_price) / list_price
    pub discount_rate: f64,
    /// list_price - unit_cost
    pub unit_margin: f64,
}

impl BidRecord {
    pub fn new(unit_count: u32, unit_price: f64, won: bool, discount_rate: f64, unit_margin: f64) -> Result<Self, PricingError> {
        if unit_count == 0 {
            return Err(PricingError::MalformedData {
                line: 0,
                reason: "unit count must be positive".to_string(),
            });
        }
        if !(unit_price.is_finite() && unit_price > 0.0) {
            return Err(PricingError::MalformedData {
                line: 0,
                reason: format!("unit price must be positive, got {}", unit_price),
            });
        }
        if !discount_rate.is_finite() || !unit_margin.is_finite() {
            return Err(PricingError::MalformedData {
                line: 0,
                reason: "discount rate and unit margin must be finite".to_string(),
            });
        }
        Ok(Self {
            unit_count,
            unit_price,
            won,
            discount_rate,
            unit_margin,
        })
    }

    pub fn total_price(&self) -> f64 {
        self.unit_count as f64 * self.unit_price
    }

    pub fn units_sold(&self) -> u32 {
        if self.won {
            self.unit_count
        } else {
            0
        }
    }

    pub fn total_margin(&self) -> f64 {
        self.unit_margin * self.units_sold() as f64
    }

    /// Win indicator as the 0/1 observation used by the likelihood
    pub fn outcome(&self) -> f64 {
        if self.won {
            1.0
        } else {
            0.0
        }
    }

    /// Unit price normalized by the reference (list) price
    pub fn price_ratio(&self, reference_price: f64) -> f64 {
        self.unit_price / reference_price
    }
}

/// Ordered, read-only collection of bids.
///
/// Segments are contiguous half-open row ranges; slicing copies the rows so every
/// segment owns its data and can be handed to a scenario independently.
#[derive(Debug, Clone, PartialEq)]
pub struct BidDataset {
    pub name: String,
    records: Vec<BidRecord>,
}

impl BidDataset {
    pub fn new(name: &str, records: Vec<BidRecord>) -> Self {
        Self {
            name: name.to_string(),
            records,
        }
    }

    pub fn records(&self) -> &[BidRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows [start, end) as a new named dataset
    pub fn slice(&self, name: &str, start: usize, end: usize) -> Result<BidDataset, PricingError> {
        if start > end || end > self.records.len() {
            return Err(PricingError::SegmentOutOfRange {
                name: name.to_string(),
                start,
                end,
                rows: self.records.len(),
            });
        }
        if start == end {
            return Err(PricingError::EmptySegment { name: name.to_string() });
        }
        Ok(BidDataset::new(name, self.records[start..end].to_vec()))
    }

    /// Fail fast before fitting anything on a zero-row dataset
    pub fn ensure_not_empty(&self) -> Result<(), PricingError> {
        if self.is_empty() {
            Err(PricingError::EmptySegment { name: self.name.clone() })
        } else {
            Ok(())
        }
    }

    pub fn outcomes(&self) -> Vec<f64> {
        self.records.iter().map(BidRecord::outcome).collect()
    }

    /// Units offered across all bids, won or lost
    pub fn total_units(&self) -> u64 {
        self.records.iter().map(|r| r.unit_count as u64).sum()
    }

    pub fn total_units_sold(&self) -> u64 {
        self.records.iter().map(|r| r.units_sold() as u64).sum()
    }

    /// Contribution actually realized in the historical data
    pub fn realized_total_margin(&self) -> f64 {
        self.records.iter().map(BidRecord::total_margin).sum()
    }

    pub fn mean_order_size(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.total_units() as f64 / self.records.len() as f64
    }

    pub fn win_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.records.iter().filter(|r| r.won).count() as f64 / self.records.len() as f64
    }

    pub fn printout(&self, logger: &mut Logger) {
        logln!(
            logger,
            LogEvent::Scenario,
            "Dataset '{}': {} bids, {} units offered, {} units sold, win rate {:.3}, realized margin {:.0}",
            self.name,
            self.len(),
            self.total_units(),
            self.total_units_sold(),
            self.win_rate(),
            self.realized_total_margin()
        );
    }
}
