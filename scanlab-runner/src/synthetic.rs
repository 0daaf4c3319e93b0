//! Deterministic synthetic data for demos and tests.
//!
//! Each symbol seeds its own `StdRng` from the BLAKE3 hash of its name, so a
//! symbol always produces the same candles and market snapshot. HTF candles are
//! aggregated from the LTF series, which keeps both timeframes consistent.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scanlab_core::domain::Candle;
use scanlab_core::market::MarketPoint;
use serde_json::json;
use std::path::Path;
use thiserror::Error;

/// 2023-11-14 00:00:00 UTC, aligned to every timeframe up to 1d.
pub const SYNTHETIC_START_MS: i64 = 1_699_920_000_000;

#[derive(Debug, Error)]
pub enum SyntheticError {
    #[error("unknown timeframe '{0}' (expected e.g. 15m, 1h, 4h, 1d)")]
    Timeframe(String),

    #[error("htf {htf} must be a whole multiple of ltf {ltf}")]
    Misaligned { ltf: String, htf: String },

    #[error("write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("serialize synthetic data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Timeframe label to milliseconds: `30s`, `15m`, `4h`, `1d`, `1w`.
pub fn timeframe_ms(label: &str) -> Option<i64> {
    let label = label.trim();
    let unit = label.chars().last()?;
    let count: i64 = label[..label.len() - unit.len_utf8()].parse().ok()?;
    let unit_ms = match unit {
        's' => 1_000,
        'm' => 60_000,
        'h' => 3_600_000,
        'd' => 86_400_000,
        'w' => 604_800_000,
        _ => return None,
    };
    (count > 0).then_some(count * unit_ms)
}

fn rng_for(symbol: &str, stream: &str) -> StdRng {
    let seed = blake3::hash(format!("{symbol}/{stream}").as_bytes());
    StdRng::from_seed(*seed.as_bytes())
}

/// Regime-switching random walk: every 150 candles a new drift is drawn.
pub fn synthetic_candles(symbol: &str, count: usize, interval_ms: i64) -> Vec<Candle> {
    let mut rng = rng_for(symbol, "candles");
    let mut price: f64 = rng.gen_range(20.0..200.0);
    let mut drift: f64 = 0.0;
    let mut candles = Vec::with_capacity(count);

    for i in 0..count {
        if i % 150 == 0 {
            drift = rng.gen_range(-0.0015..0.0015);
        }
        let ret: f64 = drift + rng.gen_range(-0.006..0.006);
        let open = price;
        let close = (price * (1.0 + ret)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));
        let volume = rng.gen_range(500.0..5_000.0) * (1.0 + ret.abs() * 100.0);

        candles.push(Candle {
            open_time: SYNTHETIC_START_MS + i as i64 * interval_ms,
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
    }
    candles
}

/// Merge LTF candles into buckets of `interval_ms` aligned to the epoch.
/// A trailing partial bucket is kept.
pub fn aggregate(ltf: &[Candle], interval_ms: i64) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::new();
    for c in ltf {
        let bucket = c.open_time - c.open_time.rem_euclid(interval_ms);
        match out.last_mut() {
            Some(last) if last.open_time == bucket => {
                last.high = last.high.max(c.high);
                last.low = last.low.min(c.low);
                last.close = c.close;
                last.volume += c.volume;
            }
            _ => out.push(Candle {
                open_time: bucket,
                ..*c
            }),
        }
    }
    out
}

/// Open interest loosely following price, with small funding and a
/// long/short ratio around 1. One point every `every` candles.
pub fn synthetic_market(symbol: &str, ltf: &[Candle], every: usize) -> Vec<MarketPoint> {
    let mut rng = rng_for(symbol, "market");
    let mut oi: f64 = rng.gen_range(1.0e8..1.0e9);
    let mut prev_close = ltf.first().map(|c| c.close).unwrap_or(1.0);

    ltf.iter()
        .step_by(every.max(1))
        .map(|c| {
            let price_change = (c.close - prev_close) / prev_close;
            prev_close = c.close;
            oi *= 1.0 + price_change * 0.5 + rng.gen_range(-0.01..0.01);
            MarketPoint {
                time: c.open_time,
                open_interest: oi,
                funding_rate: Some(rng.gen_range(-0.0003..0.0006)),
                long_short_ratio: Some(rng.gen_range(0.7..1.6)),
            }
        })
        .collect()
}

/// Write `{SYMBOL}_{ltf}.json`, `{SYMBOL}_{htf}.json` into `candles_dir` and,
/// when given, `{SYMBOL}.json` into `market_dir`.
pub fn write_dataset(
    candles_dir: &Path,
    market_dir: Option<&Path>,
    symbols: &[String],
    ltf: &str,
    htf: &str,
    ltf_count: usize,
) -> Result<(), SyntheticError> {
    let ltf_ms = timeframe_ms(ltf).ok_or_else(|| SyntheticError::Timeframe(ltf.into()))?;
    let htf_ms = timeframe_ms(htf).ok_or_else(|| SyntheticError::Timeframe(htf.into()))?;
    if htf_ms <= ltf_ms || htf_ms % ltf_ms != 0 {
        return Err(SyntheticError::Misaligned {
            ltf: ltf.into(),
            htf: htf.into(),
        });
    }

    create_dir(candles_dir)?;
    if let Some(dir) = market_dir {
        create_dir(dir)?;
    }

    for symbol in symbols {
        let ltf_candles = synthetic_candles(symbol, ltf_count, ltf_ms);
        let htf_candles = aggregate(&ltf_candles, htf_ms);
        write_json(
            &candles_dir.join(format!("{symbol}_{ltf}.json")),
            &positional(&ltf_candles),
        )?;
        write_json(
            &candles_dir.join(format!("{symbol}_{htf}.json")),
            &positional(&htf_candles),
        )?;
        if let Some(dir) = market_dir {
            let points = synthetic_market(symbol, &ltf_candles, 4);
            let snapshot = json!({ "points": points });
            write_json(&dir.join(format!("{symbol}.json")), &snapshot)?;
        }
    }
    Ok(())
}

fn positional(candles: &[Candle]) -> serde_json::Value {
    candles
        .iter()
        .map(|c| json!([c.open_time, c.open, c.high, c.low, c.close, c.volume]))
        .collect()
}

fn create_dir(dir: &Path) -> Result<(), SyntheticError> {
    std::fs::create_dir_all(dir).map_err(|source| SyntheticError::Io {
        path: dir.display().to_string(),
        source,
    })
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<(), SyntheticError> {
    let text = serde_json::to_string(value)?;
    std::fs::write(path, text).map_err(|source| SyntheticError::Io {
        path: path.display().to_string(),
        source,
    })
}
