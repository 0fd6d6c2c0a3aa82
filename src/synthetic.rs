use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal};

use crate::bids::{BidDataset, BidRecord};
use crate::config::PricingConfig;
use crate::errors::PricingError;
use crate::sigmoid::ModelParameters;

/// Rows of the reference bid file
const FLEET_ROWS: usize = 4000;

/// Convert mean and standard deviation to log-normal distribution parameters
///
/// For LogNormal(μ, σ):
/// - E[X] = exp(μ + σ²/2)
/// - Var[X] = (exp(σ²) - 1) * exp(2μ + σ²)
///
/// so σ = sqrt(ln(1 + s²/m²)) and μ = ln(m) - σ²/2
fn lognormal_from_mean_stddev(mean: f64, stddev: f64) -> (f64, f64) {
    let sigma_squared = (1.0 + (stddev * stddev) / (mean * mean)).ln();
    (mean.ln() - sigma_squared / 2.0, sigma_squared.sqrt())
}

/// Log-normal distribution with the given mean and standard deviation
pub fn create_lognormal(mean: f64, stddev: f64) -> Result<LogNormal<f64>, PricingError> {
    if !(mean > 0.0 && stddev >= 0.0) {
        return Err(PricingError::InvalidConfig(format!(
            "order size distribution needs a positive mean, got mean {} stddev {}",
            mean, stddev
        )));
    }
    let (mu, sigma) = lognormal_from_mean_stddev(mean, stddev);
    LogNormal::new(mu, sigma).map_err(|e| PricingError::InvalidConfig(format!("order size distribution: {}", e)))
}

/// How bids of one buyer class are drawn
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentProfile {
    pub name: String,
    pub rows: usize,
    /// Win model the outcomes are drawn from; one slope draws on price only
    pub truth: ModelParameters,
    /// Quoted price as a fraction of the reference price, drawn uniformly
    pub min_price_ratio: f64,
    pub max_price_ratio: f64,
    pub order_size_mean: f64,
    pub order_size_stddev: f64,
    pub max_order_size: u32,
}

impl SegmentProfile {
    /// Price-sensitive buyers: steep win curve, optimum well below list price
    pub fn police(rows: usize) -> Self {
        Self {
            name: "police".to_string(),
            rows,
            truth: ModelParameters::new(12.4, vec![-16.0, -0.02]),
            min_price_ratio: 0.6,
            max_price_ratio: 1.0,
            order_size_mean: 20.0,
            order_size_stddev: 15.0,
            max_order_size: 100,
        }
    }

    /// Less price-sensitive buyers: flatter win curve, optimum closer to list price
    pub fn corporate(rows: usize) -> Self {
        Self {
            name: "corporate".to_string(),
            rows,
            truth: ModelParameters::new(5.2, vec![-6.0, -0.01]),
            min_price_ratio: 0.6,
            max_price_ratio: 1.0,
            order_size_mean: 20.0,
            order_size_stddev: 15.0,
            max_order_size: 100,
        }
    }
}

/// Draw one segment of bids from its profile
pub fn generate_segment(profile: &SegmentProfile, reference_price: f64, unit_cost: f64, rng: &mut StdRng) -> Result<BidDataset, PricingError> {
    if !(profile.min_price_ratio > 0.0 && profile.min_price_ratio < profile.max_price_ratio) {
        return Err(PricingError::InvalidConfig(format!(
            "profile '{}' price ratio range {}..{} is invalid",
            profile.name, profile.min_price_ratio, profile.max_price_ratio
        )));
    }
    let kind = profile.truth.kind().ok_or(PricingError::DimensionMismatch {
        what: "profile slopes",
        expected: 2,
        actual: profile.truth.slopes.len(),
    })?;
    let order_sizes = create_lognormal(profile.order_size_mean, profile.order_size_stddev)?;
    let max_order = profile.max_order_size.max(1) as f64;
    let unit_margin = reference_price - unit_cost;

    let mut records = Vec::with_capacity(profile.rows);
    for _ in 0..profile.rows {
        let ratio = rng.gen_range(profile.min_price_ratio..profile.max_price_ratio);
        let unit_price = (ratio * reference_price).round();
        let unit_count = order_sizes.sample(rng).round().clamp(1.0, max_order) as u32;
        let features = kind.features_for(unit_price, reference_price, Some(unit_count as f64))?;
        let won = rng.gen::<f64>() < profile.truth.probability(&features);
        let discount_rate = (reference_price - unit_price) / reference_price;
        records.push(BidRecord::new(unit_count, unit_price, won, discount_rate, unit_margin)?);
    }
    Ok(BidDataset::new(&profile.name, records))
}

/// Police then corporate bids, laid out like the reference file
/// Police and corporate row counts for a configuration: police rows up to the end
/// of the first segment, corporate rows from there to the furthest segment end
pub fn fleet_layout(config: &PricingConfig) -> (usize, usize) {
    let total = config.segments.iter().map(|s| s.end).max().unwrap_or(FLEET_ROWS);
    let police = config.segments.first().map_or(total / 2, |s| s.end.min(total));
    (police, total - police)
}

pub fn generate_fleet_dataset(config: &PricingConfig, police_rows: usize, corporate_rows: usize, seed: u64) -> Result<BidDataset, PricingError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let unit_cost = config.costs.unit_cost;
    let mut records = Vec::with_capacity(police_rows + corporate_rows);
    for profile in [SegmentProfile::police(police_rows), SegmentProfile::corporate(corporate_rows)] {
        let segment = generate_segment(&profile, config.reference_price, unit_cost, &mut rng)?;
        records.extend_from_slice(segment.records());
    }
    Ok(BidDataset::new("all", records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentSpec;

    #[test]
    fn test_fleet_layout_covers_every_segment() {
        let mut config = PricingConfig::default();
        assert_eq!(fleet_layout(&config), (2000, 2000));

        config.segments = vec![SegmentSpec::new("first", 0, 100), SegmentSpec::new("second", 200, 300)];
        let (police, corporate) = fleet_layout(&config);
        assert_eq!((police, corporate), (100, 200));

        let dataset = generate_fleet_dataset(&config, police, corporate, 5).unwrap();
        assert_eq!(dataset.len(), 300);
        assert!(dataset.slice("second", 200, 300).is_ok());

        config.segments.clear();
        assert_eq!(fleet_layout(&config), (2000, 2000));
    }

    #[test]
    fn test_lognormal_moments() {
        let (mu, sigma) = lognormal_from_mean_stddev(20.0, 15.0);
        let mean = (mu + sigma * sigma / 2.0).exp();
        let variance = ((sigma * sigma).exp() - 1.0) * (2.0 * mu + sigma * sigma).exp();
        assert!((mean - 20.0).abs() < 1e-9);
        assert!((variance.sqrt() - 15.0).abs() < 1e-9);
        assert!(create_lognormal(0.0, 1.0).is_err());
    }

    #[test]
    fn test_generated_segment_is_consistent() {
        let mut rng = StdRng::seed_from_u64(1);
        let dataset = generate_segment(&SegmentProfile::police(500), 25000.0, 15000.0, &mut rng).unwrap();
        assert_eq!(dataset.len(), 500);
        assert_eq!(dataset.name, "police");
        for record in dataset.records() {
            assert!(record.unit_count >= 1 && record.unit_count <= 100);
            assert!(record.unit_price >= 15000.0 && record.unit_price <= 25000.0);
            assert_eq!(record.unit_margin, 10000.0);
            assert!((record.discount_rate - (25000.0 - record.unit_price) / 25000.0).abs() < 1e-12);
        }
        let win_rate = dataset.win_rate();
        assert!(win_rate > 0.2 && win_rate < 0.8, "win rate {}", win_rate);
    }

    #[test]
    fn test_fleet_dataset_layout_and_seed() {
        let config = PricingConfig::default();
        let first = generate_fleet_dataset(&config, 30, 20, 42).unwrap();
        let second = generate_fleet_dataset(&config, 30, 20, 42).unwrap();
        let other = generate_fleet_dataset(&config, 30, 20, 43).unwrap();
        assert_eq!(first.len(), 50);
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_rejects_bad_profile() {
        let profile = SegmentProfile {
            min_price_ratio: 1.0,
            max_price_ratio: 0.5,
            ..SegmentProfile::corporate(10)
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert!(generate_segment(&profile, 25000.0, 15000.0, &mut rng).is_err());
    }
}
