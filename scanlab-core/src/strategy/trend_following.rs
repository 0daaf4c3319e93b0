//! Trend-following: trade pullbacks in the direction of the HTF trend.
//!
//! Score = trend (HTF EMA alignment + ADX strength) + structure (Fibonacci
//! and slow-EMA confluence) + momentum/timing (RSI reset, aligned divergence,
//! pullback depth). Contrarian divergence and OBV imbalance are penalties.

use super::setup::setup_with_stop;
use super::{insufficient, Decision, Evaluator};
use crate::config::{EngineConfig, TrendFollowingConfig};
use crate::context::Context;
use crate::domain::{Bias, Side, Signal, StrategyKind};
use crate::indicators::IndicatorKey;

const FIB_LEVELS: [f64; 4] = [0.382, 0.5, 0.618, 0.786];

pub struct TrendFollowingEvaluator {
    config: EngineConfig,
}

impl TrendFollowingEvaluator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

/// HTF bias: strong when EMAs align and ADX clears the threshold, otherwise
/// HTF alignment must agree with the LTF close against the LTF slow EMA.
/// Returns the bias and whether it came from the strong rule.
pub fn trend_bias(ctx: &Context, cfg: &TrendFollowingConfig) -> (Bias, bool) {
    let htf = &ctx.htf_indicators;
    let (Some(fast), Some(slow)) = (htf.last(IndicatorKey::EmaFast), htf.last(IndicatorKey::EmaSlow))
    else {
        return (Bias::None, false);
    };
    let htf_side = if fast > slow {
        Side::Long
    } else if fast < slow {
        Side::Short
    } else {
        return (Bias::None, false);
    };
    let to_bias = |side: Side| match side {
        Side::Long => Bias::Long,
        Side::Short => Bias::Short,
    };

    if htf.last(IndicatorKey::Adx).is_some_and(|adx| adx >= cfg.strong_adx) {
        return (to_bias(htf_side), true);
    }

    let close = ctx.last_close();
    match ctx.indicators.last(IndicatorKey::EmaSlow) {
        Some(ltf_slow) if (close - ltf_slow) * htf_side.sign() > 0.0 => (to_bias(htf_side), false),
        _ => (Bias::None, false),
    }
}

/// Nearest Fibonacci level within `tolerance` of `depth`.
fn fib_confluence(depth: f64, tolerance: f64) -> Option<f64> {
    FIB_LEVELS
        .iter()
        .copied()
        .filter(|level| (depth - level).abs() <= tolerance)
        .min_by(|a, b| (depth - a).abs().total_cmp(&(depth - b).abs()))
}

impl Evaluator for TrendFollowingEvaluator {
    fn name(&self) -> &str {
        "trend_following"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::TrendFollowing
    }

    fn evaluate(&self, ctx: &Context) -> Signal {
        if !ctx.is_ready() {
            return insufficient(ctx, self.kind());
        }
        let cfg = &self.config.trend_following;
        let mut d = Decision::new(self.kind(), cfg.min_signal_score);

        let close = ctx.last_close();
        let atr = ctx.atr();
        let rsi = ctx.indicators.last(IndicatorKey::Rsi);
        let htf_adx = ctx.htf_indicators.last(IndicatorKey::Adx);
        let ltf_fast = ctx.indicators.last(IndicatorKey::EmaFast);
        let ltf_slow = ctx.indicators.last(IndicatorKey::EmaSlow);

        let (bias, strong) = trend_bias(ctx, cfg);
        d.bias = bias;
        d.sheet.raw("close", close);
        d.sheet.raw("htf_adx", htf_adx.unwrap_or(0.0));
        d.sheet.raw("rsi", rsi.unwrap_or(0.0));
        d.sheet.raw("atr", atr.unwrap_or(0.0));
        d.sheet.filter("htf_trend", bias != Bias::None);
        d.sheet.filter("strong_trend", strong);

        let Some(side) = bias.side() else {
            d.sheet.component("trend", 0.0, cfg.trend_max);
            d.sheet.component("structure", 0.0, cfg.structure_max);
            d.sheet.component("momentum", 0.0, cfg.momentum_max);
            d.block("no HTF trend alignment");
            return d.into_signal(ctx);
        };

        // Trend: HTF alignment is given by the bias; LTF agreement and ADX add to it.
        let mut trend = 15.0;
        if let (Some(f), Some(s)) = (ltf_fast, ltf_slow) {
            if (f - s) * side.sign() > 0.0 {
                trend += 5.0;
            }
        }
        if let Some(adx) = htf_adx {
            let span = (cfg.adx_full - cfg.adx_floor).max(f64::EPSILON);
            trend += 20.0 * ((adx - cfg.adx_floor) / span).clamp(0.0, 1.0);
        }
        d.sheet.component("trend", trend, cfg.trend_max);

        // Pullback depth inside the last impulse.
        let depth = ctx
            .features
            .swing
            .filter(|s| s.impulse_matches(side))
            .and_then(|s| s.retracement(side, close));
        d.sheet.raw("retracement_depth", depth.unwrap_or(0.0));
        let in_band = depth.is_some_and(|x| (cfg.pullback_min..=cfg.pullback_max).contains(&x));
        d.sheet.filter("pullback", in_band);
        if !in_band {
            d.block(match depth {
                Some(x) => format!(
                    "retracement {:.0}% outside pullback band {:.0}%-{:.0}%",
                    x * 100.0,
                    cfg.pullback_min * 100.0,
                    cfg.pullback_max * 100.0
                ),
                None => "no pullback in the last impulse".to_string(),
            });
        }

        // Structure: Fibonacci level and slow-EMA confluence.
        let mut structure = 0.0;
        if let Some(level) = depth.and_then(|x| fib_confluence(x, cfg.fib_tolerance)) {
            d.sheet.raw("fib_level", level);
            structure += if level == 0.5 || level == 0.618 { 15.0 } else { 10.0 };
        }
        if let (Some(slow), Some(atr)) = (ltf_slow, atr) {
            if (close - slow).abs() <= cfg.ema_confluence_atr * atr {
                structure += 15.0;
            }
        }
        d.sheet.component("structure", structure, cfg.structure_max);

        // Momentum / timing.
        let mut momentum = 0.0;
        if let Some(r) = rsi {
            let (lo, hi) = match side {
                Side::Long => (cfg.rsi_reset_low, cfg.rsi_reset_high),
                Side::Short => (100.0 - cfg.rsi_reset_high, 100.0 - cfg.rsi_reset_low),
            };
            if (lo..=hi).contains(&r) {
                momentum += 12.0;
            }
        }
        match ctx.features.divergence {
            Some(div) if div.kind.side() == side => momentum += 10.0,
            Some(div) => {
                d.sheet.penalty("contrarian_divergence", cfg.divergence_penalty);
                d.sheet.raw("divergence_index", div.index as f64);
            }
            None => {}
        }
        if let Some(x) = depth {
            if (0.5..=0.65).contains(&x) {
                momentum += 8.0;
            } else if in_band {
                momentum += 4.0;
            }
        }
        d.sheet.component("momentum", momentum, cfg.momentum_max);

        if let Some(obv) = ctx.features.obv_slope {
            d.sheet.raw("obv_slope", obv);
            if obv * side.sign() < 0.0 {
                d.sheet.penalty("volume_imbalance", cfg.volume_imbalance_penalty);
            }
        }

        // Stop beyond the swing extreme, padded by ATR.
        if let (Some(swing), Some(atr)) = (ctx.features.swing, atr) {
            let stop = match side {
                Side::Long => swing.low - cfg.stop_atr_buffer * atr,
                Side::Short => swing.high + cfg.stop_atr_buffer * atr,
            };
            d.setup = setup_with_stop(side, close, stop, cfg.target_rr).ok();
        }

        d.rationale = format!(
            "{side} pullback {:.0}% in {} HTF trend",
            depth.unwrap_or(0.0) * 100.0,
            if strong { "strong" } else { "developing" }
        );
        d.into_signal(ctx)
    }
}
