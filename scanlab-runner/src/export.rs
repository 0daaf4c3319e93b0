//! Export: signal feeds and backtest runs as JSON, the trade tape as CSV.
//!
//! A saved backtest is a directory named after the first 12 characters of the
//! run id containing:
//! - `run.json`: the full `BacktestRun`
//! - `statistics.json`: aggregate statistics only
//! - `trades.csv`: one row per simulated trade

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use scanlab_core::domain::{TradeRecord, TradeResult};

use crate::backtest::BacktestRun;
use crate::scan::SignalFeed;
use crate::statistics::RunStatistics;

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_feed_json(feed: &SignalFeed) -> Result<String> {
    serde_json::to_string_pretty(feed).context("failed to serialize SignalFeed to JSON")
}

pub fn export_statistics_json(stats: &RunStatistics) -> Result<String> {
    serde_json::to_string_pretty(stats).context("failed to serialize RunStatistics to JSON")
}

pub fn export_run_json(run: &BacktestRun) -> Result<String> {
    serde_json::to_string_pretty(run).context("failed to serialize BacktestRun to JSON")
}

/// Load a `BacktestRun` back from its JSON form.
pub fn import_run_json(json: &str) -> Result<BacktestRun> {
    serde_json::from_str(json).context("failed to deserialize BacktestRun from JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export a trade list as CSV.
///
/// Columns: symbol, strategy, signal_time, candle_index, score, side, entry,
/// stop_loss, take_profit, risk_reward, result, pnl_fraction,
/// candles_to_resolution, time_exit, never_filled, fill_invalidated,
/// fill_price, exit_price
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "symbol",
        "strategy",
        "signal_time",
        "candle_index",
        "score",
        "side",
        "entry",
        "stop_loss",
        "take_profit",
        "risk_reward",
        "result",
        "pnl_fraction",
        "candles_to_resolution",
        "time_exit",
        "never_filled",
        "fill_invalidated",
        "fill_price",
        "exit_price",
    ])?;

    let price = |v: Option<f64>| v.map(|p| format!("{p:.8}")).unwrap_or_default();
    for t in trades {
        let o = &t.outcome;
        let result = match o.result {
            TradeResult::Win => "WIN",
            TradeResult::Loss => "LOSS",
            TradeResult::Expired => "EXPIRED",
        };
        wtr.write_record([
            t.symbol.as_str(),
            t.strategy.as_str(),
            &t.signal_time.to_string(),
            &t.candle_index.to_string(),
            &format!("{:.2}", t.score),
            &t.side.to_string(),
            &format!("{:.8}", t.setup.entry),
            &format!("{:.8}", t.setup.stop_loss),
            &format!("{:.8}", t.setup.take_profit),
            &format!("{:.4}", t.setup.risk_reward),
            result,
            &format!("{:.6}", o.realized_pnl_fraction),
            &o.candles_to_resolution.to_string(),
            &o.was_time_exit.to_string(),
            &o.was_never_filled.to_string(),
            &o.fill_invalidated.to_string(),
            &price(o.fill_price),
            &price(o.exit_price),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save `run.json`, `statistics.json` and `trades.csv` under
/// `{output_dir}/{run_id prefix}/`. Returns the created directory.
pub fn save_backtest(run: &BacktestRun, output_dir: &Path) -> Result<PathBuf> {
    let prefix: String = run.run_id.chars().take(12).collect();
    if prefix.is_empty() {
        bail!("backtest run has an empty run id");
    }
    let run_dir = output_dir.join(prefix);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("run.json"), export_run_json(run)?)?;
    std::fs::write(
        run_dir.join("statistics.json"),
        export_statistics_json(&run.statistics)?,
    )?;
    std::fs::write(run_dir.join("trades.csv"), export_trades_csv(&run.trades)?)?;

    Ok(run_dir)
}

pub fn load_backtest(dir: &Path) -> Result<BacktestRun> {
    let path = dir.join("run.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_run_json(&json)
}

/// Write a feed to `path`, creating parent directories.
pub fn save_feed(feed: &SignalFeed, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, export_feed_json(feed)?)
        .with_context(|| format!("failed to write {}", path.display()))
}
