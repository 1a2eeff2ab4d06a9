//! CSV file market data adapter.
//!
//! One file per symbol, `<base>/<SYMBOL>.csv`, with a header row. Only a
//! `close` (or `price`) column is required; `date`/`timestamp`, `open`, `high`
//! and `low` are read when present. Extra columns such as `volume` are ignored.

use crate::domain::error::EngineError;
use crate::domain::price::{PriceBar, PriceWindow};
use crate::ports::market_data_port::MarketDataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

pub struct CsvMarketData {
    base_path: PathBuf,
}

struct Columns {
    timestamp: Option<usize>,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: usize,
}

impl CsvMarketData {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    /// Every bar in the file for `symbol`, oldest first.
    pub fn load_bars(&self, symbol: &str) -> Result<Vec<PriceBar>, EngineError> {
        let data_err = |reason: String| EngineError::MarketData {
            symbol: symbol.to_string(),
            reason,
        };

        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path)
            .map_err(|e| data_err(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = rdr
            .headers()
            .map_err(|e| data_err(format!("CSV header error: {}", e)))?
            .clone();
        let columns = Columns::from_headers(&headers).map_err(&data_err)?;

        let mut bars = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let line = row + 2;
            let record = result.map_err(|e| data_err(format!("CSV parse error: {}", e)))?;

            let close = parse_price(&record, columns.close, "close", line)
                .map_err(&data_err)?
                .ok_or_else(|| data_err(format!("line {}: missing close value", line)))?;
            let optional = |idx: Option<usize>, name: &str| match idx {
                Some(i) => parse_price(&record, i, name, line),
                None => Ok(None),
            };

            let timestamp = match columns.timestamp.and_then(|i| record.get(i)) {
                Some(raw) if !raw.is_empty() => Some(
                    parse_timestamp(raw)
                        .ok_or_else(|| data_err(format!("line {}: invalid date '{}'", line, raw)))?,
                ),
                _ => None,
            };

            bars.push(PriceBar {
                timestamp,
                open: optional(columns.open, "open").map_err(&data_err)?,
                high: optional(columns.high, "high").map_err(&data_err)?,
                low: optional(columns.low, "low").map_err(&data_err)?,
                close,
            });
        }

        // files without timestamps keep their row order
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, String> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        };
        Ok(Self {
            timestamp: find(&["date", "timestamp", "datetime", "time"]),
            open: find(&["open"]),
            high: find(&["high"]),
            low: find(&["low"]),
            close: find(&["close", "price"]).ok_or("missing close column")?,
        })
    }
}

fn parse_price(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
    line: usize,
) -> Result<Option<f64>, String> {
    match record.get(idx) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|e| format!("line {}: invalid {} value '{}': {}", line, name, raw, e)),
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl MarketDataPort for CsvMarketData {
    fn get_price_history(&self, symbol: &str, limit: usize) -> Result<PriceWindow, EngineError> {
        let mut bars = self.load_bars(symbol)?;
        if bars.is_empty() {
            return Err(EngineError::MarketData {
                symbol: symbol.to_string(),
                reason: "no price rows".into(),
            });
        }
        let start = bars.len().saturating_sub(limit.max(1));
        let recent = bars.split_off(start);
        PriceWindow::new(recent)
    }

    fn list_symbols(&self) -> Result<Vec<String>, EngineError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| EngineError::MarketData {
            symbol: "*".into(),
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
