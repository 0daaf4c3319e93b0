//! File-backed candle store.
//!
//! Layout: `{dir}/{SYMBOL}_{timeframe}.json` or `{dir}/{SYMBOL}_{timeframe}.csv`.
//!
//! JSON files hold an array of raw candles, either positional
//! `[time, open, high, low, close, volume, ...]` rows or field-named objects.
//! CSV files either start with a header row naming the columns (exchange
//! aliases accepted) or are headerless positional rows.
//!
//! Rows that fail to parse or fail the OHLC sanity check are dropped with a
//! warning; the rest are sorted and de-duplicated by open time.

use scanlab_core::domain::candle::Numeric;
use scanlab_core::domain::{normalize_series, Candle, RawCandle};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no candle file for {symbol} {timeframe} in {}", dir.display())]
    NotFound {
        symbol: String,
        timeframe: String,
        dir: PathBuf,
    },

    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("parse {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("no usable candles for {symbol} {timeframe}")]
    Empty { symbol: String, timeframe: String },
}

/// Anything that can hand the runner a candle series.
pub trait CandleSource: Send + Sync {
    /// Sorted, de-duplicated candles for one symbol and timeframe.
    fn load(&self, symbol: &str, timeframe: &str) -> Result<Vec<Candle>, LoadError>;

    /// Symbols that have data for `timeframe`, sorted.
    fn symbols(&self, timeframe: &str) -> Result<Vec<String>, LoadError>;
}

#[derive(Debug, Clone)]
pub struct FileCandleStore {
    dir: PathBuf,
}

impl FileCandleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str, timeframe: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{symbol}_{timeframe}.{ext}"))
    }
}

impl CandleSource for FileCandleStore {
    fn load(&self, symbol: &str, timeframe: &str) -> Result<Vec<Candle>, LoadError> {
        let json = self.path_for(symbol, timeframe, "json");
        let csv = self.path_for(symbol, timeframe, "csv");
        let raw = if json.is_file() {
            read_json(&json)?
        } else if csv.is_file() {
            read_csv(&csv)?
        } else {
            return Err(LoadError::NotFound {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                dir: self.dir.clone(),
            });
        };

        let total = raw.len();
        let mut candles = Vec::with_capacity(total);
        let mut first_error = None;
        for row in &raw {
            match row.normalize() {
                Ok(c) if c.is_sane() => candles.push(c),
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        let dropped = total - candles.len();
        if dropped > 0 {
            warn!(
                symbol,
                timeframe,
                dropped,
                total,
                first_error = ?first_error,
                "dropped malformed candle rows"
            );
        }

        let candles = normalize_series(candles);
        if candles.is_empty() {
            return Err(LoadError::Empty {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
            });
        }
        debug!(symbol, timeframe, candles = candles.len(), "loaded candles");
        Ok(candles)
    }

    fn symbols(&self, timeframe: &str) -> Result<Vec<String>, LoadError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| LoadError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let suffixes = [format!("_{timeframe}.json"), format!("_{timeframe}.csv")];

        let mut symbols: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| {
                suffixes
                    .iter()
                    .find_map(|s| name.strip_suffix(s.as_str()).map(str::to_string))
            })
            .filter(|symbol| !symbol.is_empty())
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}

fn read_json(path: &Path) -> Result<Vec<RawCandle>, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Header aliases per canonical column, in `[time, open, high, low, close, volume]` order.
const HEADER_ALIASES: [&[&str]; 6] = [
    &["open_time", "time", "timestamp", "t", "opentime", "date"],
    &["open", "o"],
    &["high", "h"],
    &["low", "l"],
    &["close", "c"],
    &["volume", "vol", "v"],
];

/// Column positions when `record` is a header row naming all six columns.
fn header_columns(record: &csv::StringRecord) -> Option<[usize; 6]> {
    let names: Vec<String> = record.iter().map(|f| f.to_ascii_lowercase()).collect();
    let mut map = [0usize; 6];
    for (slot, aliases) in map.iter_mut().zip(HEADER_ALIASES) {
        *slot = names.iter().position(|n| aliases.contains(&n.as_str()))?;
    }
    Some(map)
}

fn read_csv(path: &Path) -> Result<Vec<RawCandle>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let mut columns = None;
    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(csv_err)?;
        if line == 0 {
            if let Some(map) = header_columns(&record) {
                columns = Some(map);
                continue;
            }
        }
        let fields: Vec<Numeric> = match columns {
            Some(map) => map
                .iter()
                .map(|&i| Numeric::Text(record.get(i).unwrap_or_default().to_string()))
                .collect(),
            None => record.iter().map(|f| Numeric::Text(f.to_string())).collect(),
        };
        rows.push(RawCandle::Positional(fields));
    }
    Ok(rows)
}
