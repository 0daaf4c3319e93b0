//! Aggregate statistics over replay reports.
//!
//! Rates and averages are taken over filled trades only: a never-filled
//! setup is counted but contributes nothing to PnL or win rate.

use scanlab_core::backtest::ReplayReport;
use scanlab_core::domain::{StrategyKind, TradeRecord, TradeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Evaluation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub evaluations: usize,
    pub actionable: usize,
    pub rejected: usize,
}

impl Counters {
    fn absorb(&mut self, report: &ReplayReport) {
        self.evaluations += report.evaluations;
        self.actionable += report.actionable;
        self.rejected += report.rejected;
    }
}

/// Trade outcome tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub trades: usize,
    pub filled: usize,
    pub wins: usize,
    pub losses: usize,
    pub expired: usize,
    pub never_filled: usize,
    pub time_exits: usize,
    pub fill_invalidated: usize,
}

impl OutcomeCounts {
    fn tally<'a>(trades: impl IntoIterator<Item = &'a TradeRecord>) -> Self {
        let mut c = Self::default();
        for t in trades {
            let o = &t.outcome;
            c.trades += 1;
            match o.result {
                TradeResult::Win => c.wins += 1,
                TradeResult::Loss => c.losses += 1,
                TradeResult::Expired => c.expired += 1,
            }
            if o.was_never_filled {
                c.never_filled += 1;
            } else {
                c.filled += 1;
            }
            if o.was_time_exit {
                c.time_exits += 1;
            }
            if o.fill_invalidated {
                c.fill_invalidated += 1;
            }
        }
        c
    }
}

/// Trades whose signal score fell in `[lower, upper)` (the last bucket is closed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub lower: f64,
    pub upper: f64,
    pub outcomes: OutcomeCounts,
    pub win_rate: f64,
    pub avg_pnl: f64,
}

/// Summary for one strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub counters: Counters,
    pub outcomes: OutcomeCounts,
    pub win_rate: f64,
    pub avg_pnl: f64,
    pub total_pnl: f64,
    pub profit_factor: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub counters: Counters,
    pub outcomes: OutcomeCounts,
    pub win_rate: f64,
    pub avg_pnl: f64,
    pub total_pnl: f64,
    pub profit_factor: f64,
    /// Mean PnL of winning trades.
    pub avg_win: f64,
    /// Mean PnL of losing trades (negative).
    pub avg_loss: f64,
    pub avg_candles_to_resolution: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub score_buckets: Vec<ScoreBucket>,
    /// Keyed by strategy name.
    pub by_strategy: BTreeMap<String, StrategySummary>,
}

impl RunStatistics {
    /// Aggregate per-instrument reports. Streaks are counted over all trades
    /// in signal-time order, whatever order the reports arrive in.
    pub fn compute<'a>(
        reports: impl IntoIterator<Item = (StrategyKind, &'a ReplayReport)>,
        bucket_width: f64,
    ) -> Self {
        let mut counters = Counters::default();
        let mut per_strategy: BTreeMap<String, (Counters, Vec<&TradeRecord>)> = BTreeMap::new();
        let mut trades: Vec<&TradeRecord> = Vec::new();

        for (strategy, report) in reports {
            counters.absorb(report);
            let entry = per_strategy
                .entry(strategy.as_str().to_string())
                .or_default();
            entry.0.absorb(report);
            entry.1.extend(report.trades.iter());
            trades.extend(report.trades.iter());
        }

        trades.sort_by(|a, b| chronological(a, b));

        let by_strategy = per_strategy
            .into_iter()
            .map(|(name, (counters, trades))| {
                let summary = StrategySummary {
                    counters,
                    outcomes: OutcomeCounts::tally(trades.iter().copied()),
                    win_rate: win_rate(&trades),
                    avg_pnl: avg_pnl(&trades),
                    total_pnl: total_pnl(&trades),
                    profit_factor: profit_factor(&trades),
                };
                (name, summary)
            })
            .collect();

        Self {
            counters,
            outcomes: OutcomeCounts::tally(trades.iter().copied()),
            win_rate: win_rate(&trades),
            avg_pnl: avg_pnl(&trades),
            total_pnl: total_pnl(&trades),
            profit_factor: profit_factor(&trades),
            avg_win: avg_pnl_of(&trades, TradeResult::Win),
            avg_loss: avg_pnl_of(&trades, TradeResult::Loss),
            avg_candles_to_resolution: avg_candles_to_resolution(&trades),
            max_consecutive_wins: max_streak(&trades, TradeResult::Win),
            max_consecutive_losses: max_streak(&trades, TradeResult::Loss),
            score_buckets: score_buckets(&trades, bucket_width),
            by_strategy,
        }
    }

    /// Short human-readable report.
    pub fn summary(&self) -> String {
        let o = &self.outcomes;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "evaluations {}  actionable {}  rejected {}",
            self.counters.evaluations, self.counters.actionable, self.counters.rejected
        );
        let _ = writeln!(
            out,
            "trades {}  filled {}  wins {}  losses {}  expired {}  never filled {}",
            o.trades, o.filled, o.wins, o.losses, o.expired, o.never_filled
        );
        let _ = writeln!(
            out,
            "win rate {:.1}%  avg pnl {:+.3}%  total pnl {:+.2}%  profit factor {:.2}",
            self.win_rate * 100.0,
            self.avg_pnl * 100.0,
            self.total_pnl * 100.0,
            self.profit_factor
        );
        let _ = writeln!(
            out,
            "avg win {:+.3}%  avg loss {:+.3}%  max consec wins {}  max consec losses {}",
            self.avg_win * 100.0,
            self.avg_loss * 100.0,
            self.max_consecutive_wins,
            self.max_consecutive_losses
        );
        for b in &self.score_buckets {
            let _ = writeln!(
                out,
                "  score {:>3.0}-{:<3.0} trades {:>4}  win rate {:>5.1}%  avg pnl {:+.3}%",
                b.lower,
                b.upper,
                b.outcomes.trades,
                b.win_rate * 100.0,
                b.avg_pnl * 100.0
            );
        }
        out
    }
}

// ─── Individual metric functions ────────────────────────────────────

fn chronological(a: &TradeRecord, b: &TradeRecord) -> std::cmp::Ordering {
    a.signal_time
        .cmp(&b.signal_time)
        .then_with(|| a.symbol.cmp(&b.symbol))
        .then_with(|| a.strategy.as_str().cmp(b.strategy.as_str()))
}

fn filled<'a>(trades: &'a [&'a TradeRecord]) -> impl Iterator<Item = &'a TradeRecord> + 'a {
    trades
        .iter()
        .copied()
        .filter(|t| !t.outcome.was_never_filled)
}

/// Wins over filled trades.
pub fn win_rate(trades: &[&TradeRecord]) -> f64 {
    let (wins, n) = filled(trades).fold((0usize, 0usize), |(w, n), t| {
        (w + usize::from(t.outcome.result == TradeResult::Win), n + 1)
    });
    if n == 0 {
        0.0
    } else {
        wins as f64 / n as f64
    }
}

pub fn avg_pnl(trades: &[&TradeRecord]) -> f64 {
    let n = filled(trades).count();
    if n == 0 {
        return 0.0;
    }
    total_pnl(trades) / n as f64
}

pub fn total_pnl(trades: &[&TradeRecord]) -> f64 {
    filled(trades).map(|t| t.outcome.realized_pnl_fraction).sum()
}

/// Gross profit over gross loss, capped at 100 when nothing was lost.
pub fn profit_factor(trades: &[&TradeRecord]) -> f64 {
    let (gross_profit, gross_loss) = filled(trades).fold((0.0, 0.0), |(p, l), t| {
        let pnl = t.outcome.realized_pnl_fraction;
        if pnl > 0.0 {
            (p + pnl, l)
        } else {
            (p, l - pnl)
        }
    });
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

pub fn avg_candles_to_resolution(trades: &[&TradeRecord]) -> f64 {
    let (sum, n) = filled(trades).fold((0usize, 0usize), |(s, n), t| {
        (s + t.outcome.candles_to_resolution, n + 1)
    });
    if n == 0 {
        0.0
    } else {
        sum as f64 / n as f64
    }
}

/// Mean PnL of filled trades with the given result.
pub fn avg_pnl_of(trades: &[&TradeRecord], result: TradeResult) -> f64 {
    let (sum, n) = filled(trades)
        .filter(|t| t.outcome.result == result)
        .fold((0.0, 0usize), |(s, n), t| {
            (s + t.outcome.realized_pnl_fraction, n + 1)
        });
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Longest run of filled trades with the given result.
pub fn max_streak(trades: &[&TradeRecord], result: TradeResult) -> usize {
    let mut max = 0;
    let mut run = 0;
    for t in filled(trades) {
        if t.outcome.result == result {
            run += 1;
            max = max.max(run);
        } else {
            run = 0;
        }
    }
    max
}

/// Non-empty score buckets of `width` points over 0..=100, lowest first.
/// `width` is clamped to `[1, 100]`.
pub fn score_buckets(trades: &[&TradeRecord], width: f64) -> Vec<ScoreBucket> {
    let width = if width.is_finite() { width.clamp(1.0, 100.0) } else { 10.0 };
    let count = (100.0 / width).ceil().max(1.0) as usize;
    let mut grouped: Vec<Vec<&TradeRecord>> = vec![Vec::new(); count];
    for &t in trades {
        let score = if t.score.is_finite() { t.score.clamp(0.0, 100.0) } else { 0.0 };
        let index = ((score / width).floor() as usize).min(count - 1);
        grouped[index].push(t);
    }

    grouped
        .into_iter()
        .enumerate()
        .filter(|(_, bucket)| !bucket.is_empty())
        .map(|(i, bucket)| ScoreBucket {
            lower: i as f64 * width,
            upper: ((i + 1) as f64 * width).min(100.0),
            outcomes: OutcomeCounts::tally(bucket.iter().copied()),
            win_rate: win_rate(&bucket),
            avg_pnl: avg_pnl(&bucket),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlab_core::domain::{Setup, Side, TradeOutcome};

    fn trade(score: f64, result: TradeResult, pnl: f64) -> TradeRecord {
        TradeRecord {
            symbol: "BTCUSDT".into(),
            strategy: StrategyKind::Breakout,
            signal_time: 0,
            candle_index: 0,
            score,
            side: Side::Long,
            setup: Setup::new(Side::Long, 100.0, 95.0, 110.0).unwrap(),
            outcome: TradeOutcome {
                result,
                realized_pnl_fraction: pnl,
                candles_to_resolution: 4,
                was_time_exit: false,
                was_never_filled: false,
                fill_invalidated: false,
                fill_price: Some(100.0),
                exit_price: Some(100.0 * (1.0 + pnl)),
            },
        }
    }

    fn never_filled(score: f64) -> TradeRecord {
        TradeRecord {
            outcome: TradeOutcome::never_filled(96, false),
            ..trade(score, TradeResult::Expired, 0.0)
        }
    }

    fn report(trades: Vec<TradeRecord>) -> ReplayReport {
        ReplayReport {
            evaluations: 50,
            actionable: trades.len(),
            rejected: 2,
            trades,
            cancelled: false,
        }
    }

    #[test]
    fn metrics_ignore_never_filled_trades() {
        let a = trade(65.0, TradeResult::Win, 0.10);
        let b = trade(72.0, TradeResult::Loss, -0.05);
        let c = never_filled(80.0);
        let trades = vec![&a, &b, &c];

        assert!((win_rate(&trades) - 0.5).abs() < 1e-12);
        assert!((total_pnl(&trades) - 0.05).abs() < 1e-12);
        assert!((avg_pnl(&trades) - 0.025).abs() < 1e-12);
        assert!((profit_factor(&trades) - 2.0).abs() < 1e-12);
        assert_eq!(avg_candles_to_resolution(&trades), 4.0);
        assert!((avg_pnl_of(&trades, TradeResult::Win) - 0.10).abs() < 1e-12);
        assert!((avg_pnl_of(&trades, TradeResult::Loss) + 0.05).abs() < 1e-12);
        assert_eq!(avg_pnl_of(&trades, TradeResult::Expired), 0.0);
    }

    #[test]
    fn profit_factor_edge_cases() {
        let w = trade(60.0, TradeResult::Win, 0.1);
        assert_eq!(profit_factor(&[&w]), 100.0);
        assert_eq!(profit_factor(&[]), 0.0);
    }

    #[test]
    fn losing_streak() {
        let w = trade(60.0, TradeResult::Win, 0.1);
        let l = trade(60.0, TradeResult::Loss, -0.05);
        let n = never_filled(60.0);
        // never-filled trades do not break a streak
        let trades = [&l, &w, &l, &n, &l, &l, &w];
        assert_eq!(max_streak(&trades, TradeResult::Loss), 3);
        assert_eq!(max_streak(&trades, TradeResult::Win), 1);
    }

    #[test]
    fn buckets_are_ten_points_wide() {
        let a = trade(61.0, TradeResult::Win, 0.1);
        let b = trade(69.9, TradeResult::Loss, -0.05);
        let c = trade(70.0, TradeResult::Win, 0.1);
        let d = trade(100.0, TradeResult::Win, 0.1);
        let buckets = score_buckets(&[&a, &b, &c, &d], 10.0);

        assert_eq!(buckets.len(), 3);
        assert_eq!((buckets[0].lower, buckets[0].upper), (60.0, 70.0));
        assert_eq!(buckets[0].outcomes.trades, 2);
        assert!((buckets[0].win_rate - 0.5).abs() < 1e-12);
        assert_eq!(buckets[1].lower, 70.0);
        // a perfect score lands in the top bucket
        assert_eq!((buckets[2].lower, buckets[2].upper), (90.0, 100.0));
    }

    #[test]
    fn compute_splits_by_strategy() {
        let r1 = report(vec![
            trade(65.0, TradeResult::Win, 0.10),
            trade(75.0, TradeResult::Loss, -0.05),
        ]);
        let r2 = report(vec![never_filled(90.0)]);
        let stats = RunStatistics::compute(
            [
                (StrategyKind::Breakout, &r1),
                (StrategyKind::InstitutionalBreakout, &r2),
            ],
            10.0,
        );

        assert_eq!(stats.counters.evaluations, 100);
        assert_eq!(stats.counters.actionable, 3);
        assert_eq!(stats.counters.rejected, 4);
        assert_eq!(stats.outcomes.trades, 3);
        assert_eq!(stats.outcomes.filled, 2);
        assert_eq!(stats.outcomes.never_filled, 1);
        assert_eq!(stats.outcomes.expired, 1);
        assert_eq!(stats.score_buckets.len(), 3);

        let breakout = &stats.by_strategy["breakout"];
        assert_eq!(breakout.outcomes.trades, 2);
        assert!((breakout.win_rate - 0.5).abs() < 1e-12);
        let inst = &stats.by_strategy["institutional_breakout"];
        assert_eq!(inst.outcomes.never_filled, 1);
        assert_eq!(inst.win_rate, 0.0);

        let text = stats.summary();
        assert!(text.contains("trades 3"));
        assert!(text.contains("win rate 50.0%"));
    }

    #[test]
    fn streaks_follow_signal_time_across_instruments() {
        let at = |symbol: &str, t: i64, result: TradeResult, pnl: f64| TradeRecord {
            symbol: symbol.into(),
            signal_time: t,
            ..trade(60.0, result, pnl)
        };
        let eth = report(vec![
            at("ETHUSDT", 5, TradeResult::Win, 0.1),
            at("ETHUSDT", 10, TradeResult::Loss, -0.05),
        ]);
        let sol = report(vec![
            at("SOLUSDT", 1, TradeResult::Loss, -0.05),
            at("SOLUSDT", 7, TradeResult::Win, 0.1),
        ]);
        let stats = RunStatistics::compute(
            [(StrategyKind::Breakout, &eth), (StrategyKind::Breakout, &sol)],
            10.0,
        );
        assert_eq!(stats.max_consecutive_losses, 1);
        assert_eq!(stats.max_consecutive_wins, 2);
    }

    #[test]
    fn degenerate_bucket_width_is_clamped() {
        let r = report(vec![trade(65.0, TradeResult::Win, 0.1)]);
        let stats = RunStatistics::compute([(StrategyKind::Breakout, &r)], 1e-18);
        assert_eq!(stats.score_buckets.len(), 1);
        assert_eq!(stats.score_buckets[0].lower, 65.0);
    }

    #[test]
    fn empty_run_is_all_zero() {
        let stats = RunStatistics::compute(std::iter::empty(), 10.0);
        assert_eq!(stats.outcomes.trades, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert!(stats.score_buckets.is_empty());
    }
}
