//! Candle: the fundamental market data unit.
//!
//! Sources deliver candles either as column-positional arrays
//! `[time, open, high, low, close, volume, ...]` or as field-named objects.
//! Both shapes deserialize into [`RawCandle`] and normalize into [`Candle`].

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV candle for one instrument on one timeframe.
///
/// `open_time` is epoch milliseconds (UTC). Candles are unique per
/// (instrument, timeframe, open_time) and never mutated once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Returns true if any OHLCV field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
    }

    /// Basic OHLCV sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.open_time).single()
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Errors raised while normalizing raw candle rows.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("positional candle needs at least 6 columns, got {0}")]
    ColumnCount(usize),

    #[error("column '{column}' is not numeric: {value}")]
    NotNumeric { column: &'static str, value: String },
}

/// A numeric field that may arrive as a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn to_f64(&self, column: &'static str) -> Result<f64, CandleError> {
        match self {
            Numeric::Number(v) => Ok(*v),
            Numeric::Text(s) => s.trim().parse::<f64>().map_err(|_| CandleError::NotNumeric {
                column,
                value: s.clone(),
            }),
        }
    }
}

/// Field-named candle object. Common exchange aliases are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedCandle {
    #[serde(alias = "time", alias = "timestamp", alias = "t", alias = "openTime")]
    pub open_time: Numeric,
    #[serde(alias = "o")]
    pub open: Numeric,
    #[serde(alias = "h")]
    pub high: Numeric,
    #[serde(alias = "l")]
    pub low: Numeric,
    #[serde(alias = "c")]
    pub close: Numeric,
    #[serde(alias = "v", alias = "vol")]
    pub volume: Numeric,
}

/// Wire shape accepted from candle sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCandle {
    Positional(Vec<Numeric>),
    Named(NamedCandle),
}

const COLUMNS: [&str; 6] = ["open_time", "open", "high", "low", "close", "volume"];

impl RawCandle {
    /// Convert into a [`Candle`]. Extra positional columns (close time,
    /// quote volume, ...) are ignored.
    pub fn normalize(&self) -> Result<Candle, CandleError> {
        match self {
            RawCandle::Positional(cols) => {
                if cols.len() < COLUMNS.len() {
                    return Err(CandleError::ColumnCount(cols.len()));
                }
                let mut values = [0.0_f64; 6];
                for (i, column) in COLUMNS.iter().enumerate() {
                    values[i] = cols[i].to_f64(column)?;
                }
                Ok(Candle {
                    open_time: values[0] as i64,
                    open: values[1],
                    high: values[2],
                    low: values[3],
                    close: values[4],
                    volume: values[5],
                })
            }
            RawCandle::Named(n) => Ok(Candle {
                open_time: n.open_time.to_f64("open_time")? as i64,
                open: n.open.to_f64("open")?,
                high: n.high.to_f64("high")?,
                low: n.low.to_f64("low")?,
                close: n.close.to_f64("close")?,
                volume: n.volume.to_f64("volume")?,
            }),
        }
    }
}

/// Order candles by open time and keep one candle per open time (the last
/// one delivered wins).
pub fn normalize_series(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.open_time);
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match out.last_mut() {
            Some(last) if last.open_time == candle.open_time => *last = candle,
            _ => out.push(candle),
        }
    }
    out
}

/// Smallest positive spacing between consecutive open times, in milliseconds.
pub fn interval_ms(candles: &[Candle]) -> Option<i64> {
    candles
        .windows(2)
        .map(|w| w[1].open_time - w[0].open_time)
        .filter(|d| *d > 0)
        .min()
}
