use std::fs::{File, create_dir_all};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::bids::{BidDataset, BidRecord};
use crate::errors::PricingError;

/// Column layout of the bid file, in order
pub const BID_COLUMNS: [&str; 8] = [
    "unit_number",
    "unit_price",
    "total_price",
    "win",
    "discount_rate",
    "unit_margin",
    "unit_sold_number",
    "total_margin",
];

const DERIVED_TOLERANCE: f64 = 1e-6;

/// Source of historical bids.
///
/// The pricing core never reads files itself; it only asks a provider for the
/// whole table and slices segments out of it.
pub trait DataProvider {
    fn load_all(&self) -> Result<BidDataset, PricingError>;

    /// Half-open row range [start, end) of a loaded dataset
    fn slice(&self, dataset: &BidDataset, name: &str, start: usize, end: usize) -> Result<BidDataset, PricingError> {
        dataset.slice(name, start, end)
    }
}

/// Reads the eight-column bid file
pub struct CsvDataProvider {
    path: PathBuf,
}

impl CsvDataProvider {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }
}

/// One row as it appears in the file, deserialized positionally
#[derive(Debug, Deserialize)]
struct RawBidRow(u32, f64, f64, i64, f64, f64, f64, f64);

impl RawBidRow {
    fn into_record(self, line: usize) -> Result<BidRecord, PricingError> {
        let RawBidRow(unit_count, unit_price, total_price, win, discount_rate, unit_margin, units_sold, total_margin) = self;
        let malformed = |reason: String| PricingError::MalformedData { line, reason };

        let won = match win {
            0 => false,
            1 => true,
            other => return Err(malformed(format!("win indicator must be 0 or 1, got {}", other))),
        };
        let record = BidRecord::new(unit_count, unit_price, won, discount_rate, unit_margin).map_err(|e| match e {
            PricingError::MalformedData { reason, .. } => malformed(reason),
            other => other,
        })?;

        let derived = [
            ("total_price", total_price, record.total_price()),
            ("unit_sold_number", units_sold, record.units_sold() as f64),
            ("total_margin", total_margin, record.total_margin()),
        ];
        for (column, found, expected) in derived {
            if (found - expected).abs() > DERIVED_TOLERANCE * expected.abs().max(1.0) {
                return Err(malformed(format!("{} is {} but recomputes to {}", column, found, expected)));
            }
        }
        Ok(record)
    }
}

impl DataProvider for CsvDataProvider {
    fn load_all(&self) -> Result<BidDataset, PricingError> {
        let file = File::open(&self.path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let header_len = rdr.headers()?.len();
        if header_len != BID_COLUMNS.len() {
            return Err(PricingError::MalformedData {
                line: 1,
                reason: format!("expected {} columns, header has {}", BID_COLUMNS.len(), header_len),
            });
        }

        let mut records = Vec::new();
        for (index, result) in rdr.records().enumerate() {
            // header is line 1
            let line = index + 2;
            let row = result.map_err(|e| PricingError::MalformedData { line, reason: e.to_string() })?;
            if row.len() != BID_COLUMNS.len() {
                return Err(PricingError::MalformedData {
                    line,
                    reason: format!("expected {} columns, found {}", BID_COLUMNS.len(), row.len()),
                });
            }
            let raw: RawBidRow = row
                .deserialize(None)
                .map_err(|e| PricingError::MalformedData { line, reason: e.to_string() })?;
            records.push(raw.into_record(line)?);
        }

        debug!(path = %self.path.display(), rows = records.len(), "loaded bid file");
        let dataset = BidDataset::new("all", records);
        dataset.ensure_not_empty()?;
        Ok(dataset)
    }
}

/// Provider over bids that are already in memory (generated or built by tests)
pub struct InMemoryProvider {
    dataset: BidDataset,
}

impl InMemoryProvider {
    pub fn new(dataset: BidDataset) -> Self {
        Self { dataset }
    }
}

impl DataProvider for InMemoryProvider {
    fn load_all(&self) -> Result<BidDataset, PricingError> {
        self.dataset.ensure_not_empty()?;
        Ok(self.dataset.clone())
    }
}

/// Write a dataset in the same eight-column layout the loader reads
pub fn write_csv(dataset: &BidDataset, path: &Path) -> Result<(), PricingError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(BID_COLUMNS)?;
    for record in dataset.records() {
        wtr.write_record(&[
            record.unit_count.to_string(),
            record.unit_price.to_string(),
            record.total_price().to_string(),
            (record.won as u8).to_string(),
            record.discount_rate.to_string(),
            record.unit_margin.to_string(),
            record.units_sold().to_string(),
            record.total_margin().to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fleetprice-{}-{}", std::process::id(), name))
    }

    const HEADER: &str = "unit_number,unit_price,total_price,win,discount_rate,unit_margin,unit_sold_number,total_margin\n";

    #[test]
    fn test_load_well_formed_file() {
        let path = temp_path("good.csv");
        fs::write(
            &path,
            format!("{}10,20000,200000,1,0.2,10000,10,100000\n20,22000,440000,0,0.12,10000,0,0\n", HEADER),
        )
        .unwrap();

        let dataset = CsvDataProvider::new(&path).load_all().unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(dataset.len(), 2);
        assert!(dataset.records()[0].won);
        assert!(!dataset.records()[1].won);
        assert_eq!(dataset.total_units(), 30);
        assert_eq!(dataset.realized_total_margin(), 100000.0);
    }

    #[test]
    fn test_rejects_non_binary_win() {
        let path = temp_path("nonbinary.csv");
        fs::write(&path, format!("{}10,20000,200000,2,0.2,10000,20,200000\n", HEADER)).unwrap();
        let err = CsvDataProvider::new(&path).load_all().unwrap_err();
        fs::remove_file(&path).ok();
        match err {
            PricingError::MalformedData { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("0 or 1"));
            }
            other => panic!("expected MalformedData, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_missing_columns() {
        let path = temp_path("short.csv");
        fs::write(&path, "unit_number,unit_price,win\n10,20000,1\n").unwrap();
        let err = CsvDataProvider::new(&path).load_all().unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, PricingError::MalformedData { line: 1, .. }));
    }

    #[test]
    fn test_rejects_inconsistent_derived_column() {
        let path = temp_path("derived.csv");
        fs::write(&path, format!("{}10,20000,150000,1,0.2,10000,10,100000\n", HEADER)).unwrap();
        let err = CsvDataProvider::new(&path).load_all().unwrap_err();
        fs::remove_file(&path).ok();
        match err {
            PricingError::MalformedData { reason, .. } => assert!(reason.contains("total_price")),
            other => panic!("expected MalformedData, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_header_only_file() {
        let path = temp_path("empty.csv");
        fs::write(&path, HEADER).unwrap();
        let err = CsvDataProvider::new(&path).load_all().unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, PricingError::EmptySegment { .. }));
    }

    #[test]
    fn test_written_file_loads_back() {
        let records = vec![
            BidRecord::new(12, 19500.0, true, 0.22, 10000.0).unwrap(),
            BidRecord::new(3, 23750.0, false, 0.05, 10000.0).unwrap(),
        ];
        let dataset = BidDataset::new("all", records);
        let path = temp_path("written.csv");
        write_csv(&dataset, &path).unwrap();
        let loaded = CsvDataProvider::new(&path).load_all().unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(loaded, dataset);
    }

    #[test]
    fn test_provider_slice() {
        let records = (1..=4)
            .map(|n| BidRecord::new(n, 20000.0, n % 2 == 0, 0.2, 10000.0).unwrap())
            .collect();
        let provider = InMemoryProvider::new(BidDataset::new("all", records));
        let all = provider.load_all().unwrap();
        let tail = provider.slice(&all, "tail", 2, 4).unwrap();
        assert_eq!(tail.total_units(), 7);
    }
}
