//! Breakout/retest detection shared by both breakout-style evaluators, plus
//! the hard safety rules (funding, breakout volume).
//!
//! The state machine `IDLE → BREAKOUT_DETECTED → (RETEST_WINDOW_OPEN | EXPIRED)
//! → SIGNAL_EMITTED` is replayed over the candles after the second anchor
//! pivot on every call. Distances are measured in the trade direction:
//! `d = sign * (rsi - line)`, so a LONG breaks resistance upward and a SHORT
//! breaks support downward.

use super::memory::{BreakoutKey, BreakoutMemory};
use crate::config::{BreakoutConfig, SafetyConfig};
use crate::context::Context;
use crate::domain::{interval_ms, BreakoutPhase, Side};
use crate::trendline::{Trendline, TrendlineKind};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Idle,
    Detected { at: usize },
    Retested { at: usize, retest: usize },
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutState {
    pub side: Side,
    pub line: Trendline,
    pub phase: BreakoutPhase,
    pub breakout_index: Option<usize>,
    pub retest_index: Option<usize>,
    /// The emitting transition happened on the last candle.
    pub fresh: bool,
    /// Breakout restored from the caller's memory.
    pub from_memory: bool,
    /// Projected line value at the last candle.
    pub line_value: f64,
    pub rsi: f64,
}

impl BreakoutState {
    pub fn retest_confirmed(&self) -> bool {
        self.retest_index.is_some()
    }

    /// Emitted on this very candle.
    pub fn emits_now(&self) -> bool {
        self.phase == BreakoutPhase::SignalEmitted && self.fresh
    }

    /// Candles since the breakout, relative to `last`.
    pub fn candles_since_breakout(&self, last: usize) -> Option<usize> {
        self.breakout_index.map(|b| last.saturating_sub(b))
    }

    /// Human-readable reason when the state does not emit now.
    pub fn wait_reason(&self, last: usize) -> String {
        match self.phase {
            BreakoutPhase::Idle => format!(
                "no breakout: RSI {:.1} vs {:?} line {:.1}",
                self.rsi, self.line.kind, self.line_value
            ),
            BreakoutPhase::BreakoutDetected => "breakout detected, waiting for retest".into(),
            BreakoutPhase::RetestWindowOpen => format!(
                "retest window open ({} candles since breakout)",
                self.candles_since_breakout(last).unwrap_or(0)
            ),
            BreakoutPhase::Expired => "breakout expired without retest".into(),
            BreakoutPhase::SignalEmitted => format!(
                "signal already emitted {} candles ago",
                self.retest_index
                    .or(self.breakout_index)
                    .map(|i| last.saturating_sub(i))
                    .unwrap_or(0)
            ),
        }
    }
}

/// Replay the breakout state machine against the line on `side`.
///
/// None when the context has no RSI or no trendline on that side.
pub fn detect_breakout(
    ctx: &Context,
    side: Side,
    cfg: &BreakoutConfig,
    memory: Option<&mut BreakoutMemory>,
) -> Option<BreakoutState> {
    let kind = match side {
        Side::Long => TrendlineKind::Resistance,
        Side::Short => TrendlineKind::Support,
    };
    let line = ctx.trendlines.get(kind)?.clone();
    let rsi = ctx.rsi_series()?;
    let last = ctx.last_index();
    if line.pivot_2.index >= last || rsi.len() != ctx.ltf.len() {
        return None;
    }

    let mut scan = run(rsi, &line, side, cfg, line.pivot_2.index + 1, Scan::Idle, last);
    let mut from_memory = false;

    if let Some(memory) = memory {
        let key = BreakoutKey {
            symbol: ctx.instrument.symbol.clone(),
            pivot_1_time: ctx.ltf[line.pivot_1.index].open_time,
            pivot_2_time: ctx.ltf[line.pivot_2.index].open_time,
        };
        let now = ctx.ltf[last].open_time;

        if scan == Scan::Idle {
            if let Some(at) = memory
                .recall(&key, now)
                .and_then(|t| ctx.ltf.binary_search_by_key(&t, |c| c.open_time).ok())
                .filter(|&at| at > line.pivot_2.index)
            {
                debug!(symbol = %ctx.instrument.symbol, at, "breakout restored from memory");
                scan = run(rsi, &line, side, cfg, at + 1, Scan::Detected { at }, last);
                from_memory = true;
            }
        }

        match scan {
            Scan::Detected { at } | Scan::Retested { at, .. } => {
                let interval = interval_ms(&ctx.ltf).unwrap_or(0);
                let breakout_time = ctx.ltf[at].open_time;
                let ttl = interval * cfg.memory_ttl_candles as i64;
                memory.record(key, breakout_time, breakout_time + ttl);
            }
            Scan::Idle => memory.forget(&key),
            Scan::Expired => {}
        }
    }

    let (phase, breakout_index, retest_index, fresh) = match scan {
        Scan::Idle => (BreakoutPhase::Idle, None, None, false),
        Scan::Expired => (BreakoutPhase::Expired, None, None, false),
        Scan::Detected { at } if !cfg.require_retest => {
            (BreakoutPhase::SignalEmitted, Some(at), None, at == last)
        }
        Scan::Detected { at } if at == last => {
            (BreakoutPhase::BreakoutDetected, Some(at), None, false)
        }
        Scan::Detected { at } => (BreakoutPhase::RetestWindowOpen, Some(at), None, false),
        Scan::Retested { at, retest } => {
            (BreakoutPhase::SignalEmitted, Some(at), Some(retest), retest == last)
        }
    };

    Some(BreakoutState {
        side,
        line_value: line.value_at(last),
        rsi: rsi[last],
        line,
        phase,
        breakout_index,
        retest_index,
        fresh,
        from_memory,
    })
}

fn run(
    rsi: &[f64],
    line: &Trendline,
    side: Side,
    cfg: &BreakoutConfig,
    from: usize,
    mut scan: Scan,
    last: usize,
) -> Scan {
    for k in from..=last {
        let r = rsi[k];
        if !r.is_finite() {
            continue;
        }
        let d = side.sign() * (r - line.value_at(k));
        scan = match scan {
            Scan::Idle if d >= cfg.confirmation_buffer => Scan::Detected { at: k },
            Scan::Idle => Scan::Idle,
            Scan::Detected { .. } if d < 0.0 => Scan::Idle,
            Scan::Detected { at } if k - at > cfg.retest_window => Scan::Expired,
            Scan::Detected { at } if cfg.require_retest && d <= cfg.retest_tolerance => {
                Scan::Retested { at, retest: k }
            }
            s @ Scan::Detected { .. } => s,
            Scan::Retested { .. } if d < 0.0 => Scan::Idle,
            s @ Scan::Retested { .. } => s,
            Scan::Expired if d < 0.0 => Scan::Idle,
            Scan::Expired => Scan::Expired,
        };
    }
    scan
}

/// Funding rate that crowds the trade's own side beyond the extreme threshold.
pub fn extreme_funding(ctx: &Context, side: Side, safety: &SafetyConfig) -> Option<f64> {
    let funding = ctx.market.effective_funding()?;
    (funding * side.sign() > safety.extreme_funding).then_some(funding)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeVerdict {
    Reject(f64),
    Weak(f64),
    Normal(f64),
    Strong(f64),
    Unknown,
}

/// Classify breakout-candle volume against its trailing average.
pub fn volume_verdict(ratio: Option<f64>, cfg: &BreakoutConfig) -> VolumeVerdict {
    match ratio {
        None => VolumeVerdict::Unknown,
        Some(r) if r < cfg.volume_reject_ratio => VolumeVerdict::Reject(r),
        Some(r) if r < cfg.volume_weak_ratio => VolumeVerdict::Weak(r),
        Some(r) if r > cfg.volume_bonus_ratio => VolumeVerdict::Strong(r),
        Some(r) => VolumeVerdict::Normal(r),
    }
}
