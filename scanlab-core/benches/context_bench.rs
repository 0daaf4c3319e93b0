//! Criterion benchmarks for ScanLab hot paths.
//!
//! Benchmarks:
//! 1. Context build (all indicators, trendlines, features)
//! 2. Each evaluator over a prebuilt context
//! 3. Trendline detection over an RSI series
//! 4. Forward trade simulation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use scanlab_core::backtest::simulate_trade;
use scanlab_core::config::{EngineConfig, SimulationConfig, TrendlineConfig};
use scanlab_core::context::{ContextBuilder, MarketInput};
use scanlab_core::domain::{Candle, Instrument, Setup, Side, StrategyKind};
use scanlab_core::indicators::rsi::rsi_of_series;
use scanlab_core::strategy::create_evaluator;
use scanlab_core::trendline;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_candles(n: usize, spacing_ms: i64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + (x * 0.1).sin() * 10.0 + x * 0.02;
            let open = close - 0.3;
            Candle {
                open_time: 1_700_000_000_000 + i as i64 * spacing_ms,
                open,
                high: close + 1.5,
                low: open - 1.5,
                close,
                volume: 1_000_000.0 + (i % 500) as f64 * 1_000.0,
            }
        })
        .collect()
}

// ── 1. Context build ─────────────────────────────────────────────────

fn bench_context_build(c: &mut Criterion) {
    let cfg = EngineConfig::default();
    let builder = ContextBuilder::new(&cfg);
    let instrument = Instrument::new("BTCUSDT", "bench");
    let htf = make_candles(200, 4 * 3_600_000);

    let mut group = c.benchmark_group("context_build");
    for n in [100usize, 300, 1000] {
        let ltf = make_candles(n, 900_000);
        group.bench_with_input(BenchmarkId::from_parameter(n), &ltf, |b, ltf| {
            b.iter(|| {
                builder.build(
                    black_box(&instrument),
                    black_box(ltf),
                    black_box(&htf),
                    MarketInput::None,
                )
            })
        });
    }
    group.finish();
}

// ── 2. Evaluators ────────────────────────────────────────────────────

fn bench_evaluators(c: &mut Criterion) {
    let cfg = EngineConfig::default();
    let ctx = ContextBuilder::new(&cfg).build(
        &Instrument::new("ETHUSDT", "bench"),
        &make_candles(300, 900_000),
        &make_candles(200, 4 * 3_600_000),
        MarketInput::None,
    );

    let mut group = c.benchmark_group("evaluate");
    for kind in StrategyKind::ALL {
        let eval = create_evaluator(kind, &cfg);
        group.bench_function(kind.as_str(), |b| b.iter(|| eval.evaluate(black_box(&ctx))));
    }
    group.finish();
}

// ── 3. Trendline detection ───────────────────────────────────────────

fn bench_trendlines(c: &mut Criterion) {
    let closes: Vec<f64> = make_candles(500, 900_000).iter().map(|c| c.close).collect();
    let rsi = rsi_of_series(&closes, 14);
    let cfg = TrendlineConfig::default();
    c.bench_function("trendline_detect_500", |b| {
        b.iter(|| trendline::detect(black_box(&rsi), black_box(&cfg)))
    });
}

// ── 4. Simulation ────────────────────────────────────────────────────

fn bench_simulate(c: &mut Criterion) {
    let forward = make_candles(96, 900_000);
    let entry = forward[0].close;
    let setup = Setup::new(Side::Long, entry, entry * 0.8, entry * 1.5).expect("valid setup");
    let cfg = SimulationConfig::default();
    c.bench_function("simulate_trade_96", |b| {
        b.iter(|| simulate_trade(black_box(&setup), black_box(&forward), black_box(&cfg)))
    });
}

criterion_group!(
    benches,
    bench_context_build,
    bench_evaluators,
    bench_trendlines,
    bench_simulate
);
criterion_main!(benches);
