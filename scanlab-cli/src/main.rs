//! ScanLab CLI: scan, backtest, config and synthetic-data commands.
//!
//! Commands:
//! - `scan`: evaluate the latest context of every instrument and write a signal feed
//! - `backtest`: replay strategies over history and save run artifacts
//! - `config`: print the default run configuration as TOML
//! - `synth`: write a deterministic synthetic dataset for offline runs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scanlab_core::domain::StrategyKind;
use scanlab_core::market::{CachedProvider, CircuitBreaker, MarketCache, MarketStructureProvider};
use scanlab_runner::export::{export_feed_json, save_backtest, save_feed};
use scanlab_runner::synthetic::write_dataset;
use scanlab_runner::{
    run_backtest, scan, BacktestRun, FileCandleStore, FileMarketProvider, Progress, RunConfig,
    SignalFeed,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const MARKET_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(
    name = "scanlab",
    about = "ScanLab CLI: signal scanner and backtest simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by `scan` and `backtest`.
#[derive(clap::Args)]
struct RunArgs {
    /// Path to a TOML run config. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the candle directory.
    #[arg(long)]
    candles_dir: Option<PathBuf>,

    /// Override the market-structure snapshot directory.
    #[arg(long)]
    market_dir: Option<PathBuf>,

    /// Restrict the run to these symbols (repeatable).
    #[arg(long = "symbol")]
    symbols: Vec<String>,

    /// Restrict the run to these strategies (repeatable).
    #[arg(long = "strategy")]
    strategies: Vec<StrategyKind>,

    /// Worker threads (0 = rayon default).
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every instrument's latest context and write a signal feed.
    Scan {
        #[command(flatten)]
        run: RunArgs,

        /// Feed output path.
        #[arg(long, default_value = "feeds/latest.json")]
        output: PathBuf,

        /// Print the feed JSON to stdout instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Rows to print in the table.
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Replay strategies over each instrument's history and save artifacts.
    Backtest {
        #[command(flatten)]
        run: RunArgs,

        /// Evaluate every Nth candle.
        #[arg(long)]
        step: Option<usize>,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Print the default run configuration as TOML.
    Config,
    /// Write a deterministic synthetic dataset.
    Synth {
        /// Symbols to generate.
        #[arg(required = true)]
        symbols: Vec<String>,

        /// LTF candles per symbol.
        #[arg(long, default_value_t = 2_000)]
        candles: usize,

        #[arg(long, default_value = "15m")]
        ltf: String,

        #[arg(long, default_value = "4h")]
        htf: String,

        /// Candle output directory.
        #[arg(long, default_value = "data/candles")]
        candles_dir: PathBuf,

        /// Market snapshot output directory. Skipped when omitted.
        #[arg(long)]
        market_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            run,
            output,
            json,
            top,
        } => run_scan(run, &output, json, top),
        Commands::Backtest {
            run,
            step,
            output_dir,
        } => run_backtest_cmd(run, step, &output_dir),
        Commands::Config => {
            print!("{}", RunConfig::default().to_toml()?);
            Ok(())
        }
        Commands::Synth {
            symbols,
            candles,
            ltf,
            htf,
            candles_dir,
            market_dir,
        } => {
            write_dataset(
                &candles_dir,
                market_dir.as_deref(),
                &symbols,
                &ltf,
                &htf,
                candles,
            )?;
            println!(
                "Wrote {} symbol(s) to {}",
                symbols.len(),
                candles_dir.display()
            );
            Ok(())
        }
    }
}

fn load_config(args: RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(dir) = args.candles_dir {
        config.candles_dir = dir;
    }
    if args.market_dir.is_some() {
        config.market_dir = args.market_dir;
    }
    if !args.symbols.is_empty() {
        config.instruments = args.symbols;
    }
    if !args.strategies.is_empty() {
        config.strategies = args.strategies;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    Ok(config)
}

fn market_provider(config: &RunConfig) -> Option<CachedProvider<FileMarketProvider>> {
    let dir = config.market_dir.as_ref()?;
    Some(CachedProvider::with_breaker(
        FileMarketProvider::new(dir),
        Arc::new(MarketCache::new(MARKET_CACHE_TTL)),
        CircuitBreaker::default_provider(),
    ))
}

fn print_progress(p: &Progress) {
    eprintln!(
        "[{:>3.0}%] {}/{} {}{}",
        p.percent,
        p.completed,
        p.total,
        p.current_symbol,
        p.eta_secs
            .map(|s| format!("  eta {s:.0}s"))
            .unwrap_or_default()
    );
}

fn run_scan(args: RunArgs, output: &Path, json: bool, top: usize) -> Result<()> {
    let config = load_config(args)?;
    if !config.candles_dir.exists() {
        bail!("candle directory does not exist: {}", config.candles_dir.display());
    }
    let store = FileCandleStore::new(&config.candles_dir);
    let provider = market_provider(&config);

    let feed = scan(
        &config,
        &store,
        provider.as_ref().map(|p| p as &dyn MarketStructureProvider),
        Some(&print_progress),
    )?;
    save_feed(&feed, output)?;
    info!(path = %output.display(), "feed written");

    if json {
        println!("{}", export_feed_json(&feed)?);
    } else {
        print_feed(&feed, top);
    }
    Ok(())
}

fn run_backtest_cmd(args: RunArgs, step: Option<usize>, output_dir: &Path) -> Result<()> {
    let mut config = load_config(args)?;
    if let Some(step) = step {
        config.engine.simulation.step = step;
    }
    if !config.candles_dir.exists() {
        bail!("candle directory does not exist: {}", config.candles_dir.display());
    }
    let store = FileCandleStore::new(&config.candles_dir);
    let provider = market_provider(&config);

    let run = run_backtest(
        &config,
        &store,
        provider.as_ref().map(|p| p as &dyn MarketStructureProvider),
        Some(&print_progress),
        None,
    )?;

    print_run(&run);
    let run_dir = save_backtest(&run, output_dir)
        .with_context(|| format!("failed to save artifacts under {}", output_dir.display()))?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn print_feed(feed: &SignalFeed, top: usize) {
    println!();
    println!(
        "=== Signal Feed ({} / {}) {} ===",
        feed.ltf,
        feed.htf,
        feed.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "{:<12} {:<24} {:>6} {:<6} {:<8} {:>14} {:>14} {:>14}",
        "Symbol", "Strategy", "Score", "Bias", "Action", "Entry", "Stop", "Target"
    );
    println!("{}", "-".repeat(106));
    for s in feed.signals.iter().take(top) {
        let (entry, stop, target) = s
            .setup
            .as_ref()
            .map(|x| {
                (
                    format!("{:.6}", x.entry),
                    format!("{:.6}", x.stop_loss),
                    format!("{:.6}", x.take_profit),
                )
            })
            .unwrap_or_default();
        println!(
            "{:<12} {:<24} {:>6.1} {:<6} {:<8} {:>14} {:>14} {:>14}",
            s.instrument.symbol,
            s.strategy.as_str(),
            s.score,
            format!("{:?}", s.bias),
            format!("{:?}", s.action),
            entry,
            stop,
            target
        );
    }
    println!();
    println!(
        "{} signal(s), {} actionable, {} error(s)",
        feed.signals.len(),
        feed.actionable().count(),
        feed.errors.len()
    );
    for e in &feed.errors {
        println!("WARNING: {}: {}", e.symbol, e.error);
    }
}

fn print_run(run: &BacktestRun) {
    println!();
    println!("=== Backtest Result ===");
    println!("Run:            {}", run.run_id);
    println!("Instruments:    {}", run.instruments);
    println!("Elapsed:        {:.1}s", run.elapsed_secs);
    println!();
    print!("{}", run.statistics.summary());
    for (name, s) in &run.statistics.by_strategy {
        println!(
            "{name:<24} trades {:>5}  win rate {:>5.1}%  avg pnl {:+.3}%",
            s.outcomes.trades,
            s.win_rate * 100.0,
            s.avg_pnl * 100.0
        );
    }
    if run.cancelled {
        println!();
        println!("WARNING: run was cancelled, statistics are partial");
    }
    for skip in &run.skipped {
        match skip.strategy {
            Some(kind) => println!("SKIPPED: {} [{kind}]: {}", skip.symbol, skip.reason),
            None => println!("SKIPPED: {}: {}", skip.symbol, skip.reason),
        }
    }
    println!();
}
