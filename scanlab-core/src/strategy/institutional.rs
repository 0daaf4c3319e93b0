//! Institutionally-filtered breakout.
//!
//! Same breakout/retest detection as the structural evaluator, gated by two
//! mandatory filters: open interest must be unusually elevated (Z-score) and
//! money flow must lean with the bias. Bias comes from the RSI range.

use super::breakout::{apply_funding_rule, record_state};
use super::detection::detect_breakout;
use super::memory::BreakoutMemory;
use super::setup::atr_setup;
use super::{insufficient, Decision, Evaluator};
use crate::config::EngineConfig;
use crate::context::{Context, SwingRange};
use crate::domain::{Action, Bias, Setup, Side, Signal, StrategyKind};
use crate::indicators::IndicatorKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named RSI ranges, each mapped to a bias and a timing weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiRange {
    Oversold,
    Bearish,
    Neutral,
    Bullish,
    Overbought,
}

impl RsiRange {
    pub fn classify(rsi: f64) -> Self {
        if rsi < 30.0 {
            RsiRange::Oversold
        } else if rsi < 45.0 {
            RsiRange::Bearish
        } else if rsi < 55.0 {
            RsiRange::Neutral
        } else if rsi < 70.0 {
            RsiRange::Bullish
        } else {
            RsiRange::Overbought
        }
    }

    /// Oversold and overbought fade the extreme; the middle ranges follow it.
    pub fn bias(self) -> Bias {
        match self {
            RsiRange::Oversold | RsiRange::Bullish => Bias::Long,
            RsiRange::Bearish | RsiRange::Overbought => Bias::Short,
            RsiRange::Neutral => Bias::None,
        }
    }

    /// Fraction of the range score this range earns.
    pub fn timing(self) -> f64 {
        match self {
            RsiRange::Oversold | RsiRange::Overbought => 1.0,
            RsiRange::Bearish | RsiRange::Bullish => 0.6,
            RsiRange::Neutral => 0.0,
        }
    }
}

impl fmt::Display for RsiRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RsiRange::Oversold => "oversold",
            RsiRange::Bearish => "bearish",
            RsiRange::Neutral => "neutral",
            RsiRange::Bullish => "bullish",
            RsiRange::Overbought => "overbought",
        })
    }
}

pub struct InstitutionalEvaluator {
    config: EngineConfig,
}

impl InstitutionalEvaluator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn run(&self, ctx: &Context, memory: Option<&mut BreakoutMemory>) -> Signal {
        if !ctx.is_ready() {
            return insufficient(ctx, self.kind());
        }
        let cfg = &self.config.institutional;
        let safety = &self.config.safety;
        let mut d = Decision::new(self.kind(), cfg.min_signal_score);

        let rsi = ctx.indicators.last(IndicatorKey::Rsi);
        let range = rsi.map(RsiRange::classify);
        d.bias = range.map(RsiRange::bias).unwrap_or(Bias::None);
        let side = d.bias.side();

        // Mandatory filters, always reported.
        let market = &ctx.market;
        d.sheet.raw("oi_z_score", market.oi_zscore);
        let oi_ok = market.oi_zscore_valid && market.oi_zscore > cfg.oi_zscore_min;
        d.sheet.filter("oi_zscore", oi_ok);

        let flow_slope = ctx.features.money_flow_slope;
        d.sheet.raw("money_flow_slope", flow_slope.unwrap_or(0.0));
        let flow_ok = match (side, flow_slope) {
            (Some(side), Some(slope)) => slope * side.sign() > 0.0,
            _ => false,
        };
        d.sheet.filter("money_flow", flow_ok);

        let range_score = range.map(|r| r.timing() * cfg.range_max).unwrap_or(0.0);
        d.sheet.component("rsi_range", range_score, cfg.range_max);
        let flow_score = if oi_ok {
            (market.oi_zscore / cfg.oi_zscore_full).min(1.0) * cfg.flow_max
        } else {
            0.0
        };
        d.sheet.component("institutional_flow", flow_score, cfg.flow_max);
        let confirm = match flow_slope {
            Some(s) if flow_ok => (s.abs() / cfg.money_flow_full).min(1.0) * cfg.money_flow_max,
            _ => 0.0,
        };
        d.sheet.component("money_flow", confirm, cfg.money_flow_max);

        if !oi_ok {
            let detail = if market.oi_zscore_valid {
                format!("OI Z-score {:.2} not above {:.2}", market.oi_zscore, cfg.oi_zscore_min)
            } else {
                "OI Z-score unavailable".to_string()
            };
            d.sheet.override_with(
                "oi_zscore",
                safety.filter_fail_ceiling,
                Action::Wait,
                format!("institutional filter failed: {detail}"),
            );
        } else if !flow_ok {
            d.sheet.override_with(
                "money_flow",
                safety.filter_fail_ceiling,
                Action::Wait,
                format!(
                    "institutional filter failed: money flow slope {:.3} does not confirm {}",
                    flow_slope.unwrap_or(0.0),
                    side.map(|s| s.to_string()).unwrap_or_else(|| "a bias".into())
                ),
            );
        }

        let Some(side) = side else {
            d.block(format!(
                "RSI {} range has no bias",
                range.map(|r| r.to_string()).unwrap_or_else(|| "unknown".into())
            ));
            return d.into_signal(ctx);
        };

        apply_funding_rule(&mut d.sheet, ctx, side, safety);

        let Some(state) = detect_breakout(ctx, side, &self.config.breakout, memory) else {
            d.block(format!("no RSI trendline for a {side} breakout"));
            return d.into_signal(ctx);
        };
        d.phase = Some(state.phase);
        record_state(&mut d.sheet, &state);

        if state.retest_confirmed() {
            d.sheet.bonus("breakout_quality", cfg.retest_bonus);
        } else if state.breakout_index.is_some() {
            d.sheet.bonus("breakout_quality", cfg.fresh_breakout_bonus);
        }

        if !state.emits_now() {
            d.block(state.wait_reason(ctx.last_index()));
        }

        if let Some(atr) = ctx.atr() {
            d.setup = atr_setup(side, ctx.last_close(), atr, cfg.stop_atr_mult, cfg.target_rr).ok();
        }
        if let Some(setup) = &d.setup {
            let rr = structural_rr(setup, ctx.features.swing.as_ref(), ctx.last_index());
            d.sheet.raw("structural_rr", rr);
            // tolerance for the float noise in a setup built at exactly the threshold
            let rr = rr + 1e-9;
            if rr >= cfg.rr_high_threshold {
                d.sheet.bonus("risk_reward", cfg.rr_bonus_high);
            } else if rr >= cfg.rr_mid_threshold {
                d.sheet.bonus("risk_reward", cfg.rr_bonus_mid);
            }
        }

        d.rationale = format!(
            "{side} institutional breakout, RSI {} with OI Z {:.2}",
            range.map(|r| r.to_string()).unwrap_or_default(),
            market.oi_zscore
        );
        d.into_signal(ctx)
    }
}

/// Reward-to-risk with the reward measured to the nearer of the take profit
/// and the opposing swing extreme. An extreme set by the last candle is open
/// space, not a barrier.
pub fn structural_rr(setup: &Setup, swing: Option<&SwingRange>, last: usize) -> f64 {
    let risk = setup.risk();
    if risk <= 0.0 {
        return 0.0;
    }
    let target = (setup.take_profit - setup.entry).abs();
    let barrier = swing.and_then(|s| match setup.side {
        Side::Long if s.high_index < last => Some(s.high),
        Side::Short if s.low_index < last => Some(s.low),
        _ => None,
    });
    let reward = match barrier {
        Some(b) if setup.side.sign() * (b - setup.entry) > 0.0 => {
            (b - setup.entry).abs().min(target)
        }
        _ => target,
    };
    reward / risk
}

impl Evaluator for InstitutionalEvaluator {
    fn name(&self) -> &str {
        "institutional_breakout"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::InstitutionalBreakout
    }

    fn evaluate(&self, ctx: &Context) -> Signal {
        self.run(ctx, None)
    }

    fn evaluate_with_memory(&self, ctx: &Context, memory: &mut BreakoutMemory) -> Signal {
        self.run(ctx, Some(memory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BreakoutPhase;
    use crate::strategy::detection::tests::{flat_resistance, staged_context};

    fn retest_context() -> Context {
        let mut rsi = vec![50.0; 60];
        for (i, v) in [(56, 65.0), (57, 66.0), (58, 64.0), (59, 61.5)] {
            rsi[i] = v;
        }
        let mut ctx = staged_context(rsi, flat_resistance());
        ctx.features.money_flow_slope = Some(0.6);
        ctx.market.oi_available = true;
        ctx
    }

    #[test]
    fn rsi_ranges() {
        assert_eq!(RsiRange::classify(25.0), RsiRange::Oversold);
        assert_eq!(RsiRange::classify(30.0), RsiRange::Bearish);
        assert_eq!(RsiRange::classify(50.0), RsiRange::Neutral);
        assert_eq!(RsiRange::classify(55.0), RsiRange::Bullish);
        assert_eq!(RsiRange::classify(70.0), RsiRange::Overbought);
        assert_eq!(RsiRange::Overbought.bias(), Bias::Short);
        assert_eq!(RsiRange::Neutral.timing(), 0.0);
    }

    #[test]
    fn low_oi_zscore_waits_with_diagnostics() {
        let mut ctx = retest_context();
        ctx.market.oi_zscore = 1.2;
        ctx.market.oi_zscore_valid = true;
        let signal = InstitutionalEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert_eq!(signal.action, Action::Wait);
        assert!(signal.reason.as_deref().unwrap().contains("OI"));
        assert_eq!(signal.composition.raw_inputs["oi_z_score"], 1.2);
        assert!(!signal.composition.filters_passed["oi_zscore"]);
        assert!(signal.composition.filters_passed["money_flow"]);
        assert_eq!(signal.composition.components.len(), 3);
        assert!(signal.score <= 30.0);
    }

    #[test]
    fn money_flow_against_bias_waits() {
        let mut ctx = retest_context();
        ctx.market.oi_zscore = 2.5;
        ctx.market.oi_zscore_valid = true;
        ctx.features.money_flow_slope = Some(-0.4);
        let signal = InstitutionalEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert_eq!(signal.action, Action::Wait);
        assert!(signal.reason.unwrap().contains("money flow"));
        assert!(signal.composition.filters_passed["oi_zscore"]);
        assert!(!signal.composition.filters_passed["money_flow"]);
    }

    #[test]
    fn passing_filters_with_retest_goes_long() {
        let mut ctx = retest_context();
        ctx.market.oi_zscore = 3.0;
        ctx.market.oi_zscore_valid = true;
        let signal = InstitutionalEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert_eq!(signal.meta.phase, Some(BreakoutPhase::SignalEmitted));
        // bullish range 15 + flow 30 + money flow 20 + retest 15 + rr 10
        assert!((signal.score - 90.0).abs() < 1e-9, "score {}", signal.score);
        assert_eq!(signal.action, Action::Long);
        let setup = signal.setup.unwrap();
        assert_eq!(setup.side, Side::Long);
        assert!(setup.is_bracketed());
    }

    #[test]
    fn extreme_funding_rejects_even_with_filters_passing() {
        let mut ctx = retest_context();
        ctx.market.oi_zscore = 3.0;
        ctx.market.oi_zscore_valid = true;
        ctx.market.funding_available = true;
        ctx.market.funding_rate = 0.003;
        let signal = InstitutionalEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert_eq!(signal.action, Action::Rejected);
        assert!(signal.score <= 20.0);
    }

    #[test]
    fn rr_bonus_follows_room_to_the_swing() {
        let setup = Setup::new(Side::Long, 100.0, 95.0, 115.0).unwrap();
        let swing = |high: f64, high_index: usize| SwingRange {
            high,
            high_index,
            low: 90.0,
            low_index: 10,
        };
        // open space above: the full 3R target counts
        assert!((structural_rr(&setup, None, 59) - 3.0).abs() < 1e-12);
        assert!((structural_rr(&setup, Some(&swing(101.0, 59)), 59) - 3.0).abs() < 1e-12);
        // an earlier swing high 10 above entry caps the reward at 2R
        assert!((structural_rr(&setup, Some(&swing(110.0, 40)), 59) - 2.0).abs() < 1e-12);
        // a swing high below entry is no barrier
        assert!((structural_rr(&setup, Some(&swing(99.0, 40)), 59) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn nearby_swing_high_shrinks_the_score() {
        let mut ctx = retest_context();
        ctx.market.oi_zscore = 3.0;
        ctx.market.oi_zscore_valid = true;
        let open = InstitutionalEvaluator::new(EngineConfig::default()).evaluate(&ctx);

        let entry = ctx.last_close();
        ctx.features.swing = Some(SwingRange {
            high: entry + 0.01,
            high_index: 30,
            low: entry - 20.0,
            low_index: 10,
        });
        let capped = InstitutionalEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert!(capped.composition.raw_inputs["structural_rr"] < 1.0);
        assert!((open.score - capped.score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn unavailable_oi_waits() {
        let ctx = retest_context();
        let signal = InstitutionalEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert_eq!(signal.action, Action::Wait);
        assert!(signal.reason.unwrap().contains("unavailable"));
    }
}
