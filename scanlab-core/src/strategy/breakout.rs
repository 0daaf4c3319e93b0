//! Structural breakout: RSI breaks its own trendline in the HTF direction,
//! then retests it.

use super::detection::{detect_breakout, extreme_funding, volume_verdict, BreakoutState, VolumeVerdict};
use super::memory::BreakoutMemory;
use super::scoring::ScoreSheet;
use super::setup::atr_setup;
use super::{insufficient, Decision, Evaluator};
use crate::config::{BreakoutConfig, EngineConfig, OiSlopePolicy, SafetyConfig};
use crate::context::Context;
use crate::domain::{Action, Bias, Side, Signal, StrategyKind};
use crate::indicators::IndicatorKey;

pub struct BreakoutEvaluator {
    config: EngineConfig,
}

impl BreakoutEvaluator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn run(&self, ctx: &Context, memory: Option<&mut BreakoutMemory>) -> Signal {
        if !ctx.is_ready() {
            return insufficient(ctx, self.kind());
        }
        let cfg = &self.config.breakout;
        let mut d = Decision::new(self.kind(), cfg.min_signal_score);
        d.bias = htf_bias(ctx);

        let Some(side) = d.bias.side() else {
            zero_components(&mut d.sheet, cfg);
            d.block("no HTF EMA alignment");
            return d.into_signal(ctx);
        };

        apply_funding_rule(&mut d.sheet, ctx, side, &self.config.safety);

        let Some(state) = detect_breakout(ctx, side, cfg, memory) else {
            zero_components(&mut d.sheet, cfg);
            d.block(format!("no RSI {} line", line_name(side)));
            return d.into_signal(ctx);
        };
        let last = ctx.last_index();
        d.phase = Some(state.phase);
        record_state(&mut d.sheet, &state);

        // Geometry: a longer, steeper line carries more weight.
        let force = state.line.force();
        d.sheet.raw("trendline_force", force);
        d.sheet.component(
            "geometry",
            (force / cfg.target_area).min(1.0) * cfg.geometry_max,
            cfg.geometry_max,
        );

        d.sheet
            .component("momentum", momentum_score(ctx, side, cfg), cfg.momentum_max);

        let flow = flow_score(ctx, &state, side, cfg, &mut d.sheet);
        d.sheet.component("flow", flow, cfg.flow_max);

        d.sheet.component(
            "sentiment",
            sentiment_score(ctx, side, cfg, &self.config.safety),
            cfg.sentiment_max,
        );

        if let Some(at) = state.breakout_index {
            apply_volume_rule(&mut d.sheet, ctx.volume_ratio_at(at), cfg, &self.config.safety);
        }

        if !state.emits_now() {
            d.block(state.wait_reason(last));
        }

        if let Some(atr) = ctx.atr() {
            d.setup = atr_setup(side, ctx.last_close(), atr, cfg.stop_atr_mult, cfg.target_rr).ok();
        }
        d.rationale = format!(
            "{side} RSI {} breakout{}",
            line_name(side),
            if state.retest_confirmed() { " with retest" } else { "" }
        );
        d.into_signal(ctx)
    }
}

impl Evaluator for BreakoutEvaluator {
    fn name(&self) -> &str {
        "breakout"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Breakout
    }

    fn evaluate(&self, ctx: &Context) -> Signal {
        self.run(ctx, None)
    }

    fn evaluate_with_memory(&self, ctx: &Context, memory: &mut BreakoutMemory) -> Signal {
        self.run(ctx, Some(memory))
    }
}

fn line_name(side: Side) -> &'static str {
    match side {
        Side::Long => "resistance",
        Side::Short => "support",
    }
}

fn zero_components(sheet: &mut ScoreSheet, cfg: &BreakoutConfig) {
    sheet.component("geometry", 0.0, cfg.geometry_max);
    sheet.component("momentum", 0.0, cfg.momentum_max);
    sheet.component("flow", 0.0, cfg.flow_max);
    sheet.component("sentiment", 0.0, cfg.sentiment_max);
}

/// HTF fast EMA against slow EMA.
pub(crate) fn htf_bias(ctx: &Context) -> Bias {
    match (
        ctx.htf_indicators.last(IndicatorKey::EmaFast),
        ctx.htf_indicators.last(IndicatorKey::EmaSlow),
    ) {
        (Some(fast), Some(slow)) if fast > slow => Bias::Long,
        (Some(fast), Some(slow)) if fast < slow => Bias::Short,
        _ => Bias::None,
    }
}

/// Raw inputs and filters every breakout-style evaluator reports.
pub(crate) fn record_state(sheet: &mut ScoreSheet, state: &BreakoutState) {
    sheet.raw("rsi", state.rsi);
    sheet.raw("line_value", state.line_value);
    sheet.raw("line_slope", state.line.slope);
    sheet.filter("breakout", state.breakout_index.is_some());
    sheet.filter("retest", state.retest_confirmed());
    sheet.filter("from_memory", state.from_memory);
}

/// Funding crowding the trade's side caps the score and rejects.
pub(crate) fn apply_funding_rule(sheet: &mut ScoreSheet, ctx: &Context, side: Side, safety: &SafetyConfig) {
    if let Some(funding) = ctx.market.effective_funding() {
        sheet.raw("funding_rate", funding);
    }
    let extreme = extreme_funding(ctx, side, safety);
    sheet.filter("funding", extreme.is_none());
    if let Some(funding) = extreme {
        sheet.override_with(
            "extreme_funding",
            safety.funding_reject_ceiling,
            Action::Rejected,
            format!(
                "extreme funding {:.4}% crowds the {side} side (limit {:.4}%)",
                funding * 100.0,
                safety.extreme_funding * 100.0
            ),
        );
    }
}

fn apply_volume_rule(sheet: &mut ScoreSheet, ratio: Option<f64>, cfg: &BreakoutConfig, safety: &SafetyConfig) {
    let verdict = volume_verdict(ratio, cfg);
    if let Some(r) = ratio {
        sheet.raw("volume_ratio", r);
    }
    sheet.filter("volume", !matches!(verdict, VolumeVerdict::Reject(_)));
    match verdict {
        VolumeVerdict::Reject(r) => sheet.override_with(
            "breakout_volume",
            safety.volume_reject_ceiling,
            Action::Rejected,
            format!(
                "breakout volume {:.2}x average is below {:.2}x",
                r, cfg.volume_reject_ratio
            ),
        ),
        VolumeVerdict::Weak(_) => sheet.penalty("weak_volume", cfg.volume_penalty),
        VolumeVerdict::Strong(_) => sheet.bonus("strong_volume", cfg.volume_bonus),
        VolumeVerdict::Normal(_) | VolumeVerdict::Unknown => {}
    }
}

/// RSI slope in the trade direction plus any divergence agreeing with it.
fn momentum_score(ctx: &Context, side: Side, cfg: &BreakoutConfig) -> f64 {
    let slope_max = (cfg.momentum_max - cfg.divergence_points).max(0.0);
    let last = ctx.last_index();
    let slope = ctx.rsi_series().and_then(|rsi| {
        let now = *rsi.get(last)?;
        let then = *rsi.get(last.checked_sub(cfg.rsi_slope_lookback)?)?;
        (now.is_finite() && then.is_finite()).then_some(side.sign() * (now - then))
    });
    let mut score = slope
        .map(|s| (s / cfg.rsi_slope_full).clamp(0.0, 1.0) * slope_max)
        .unwrap_or(0.0);
    if ctx.features.divergence.is_some_and(|d| d.kind.side() == side) {
        score += cfg.divergence_points;
    }
    score
}

/// OI change since the first anchor pivot, scored per the configured policy.
fn flow_score(
    ctx: &Context,
    state: &BreakoutState,
    side: Side,
    cfg: &BreakoutConfig,
    sheet: &mut ScoreSheet,
) -> f64 {
    let Some(since) = ctx.ltf.get(state.line.pivot_1.index).map(|c| c.open_time) else {
        return 0.0;
    };
    let Some(change) = ctx.market.oi_change_since(since) else {
        return 0.0;
    };
    sheet.raw("oi_change", change);
    let scale = |x: f64| (x / cfg.oi_change_full).clamp(0.0, 1.0) * cfg.flow_max;
    match (cfg.oi_slope_policy, side) {
        (OiSlopePolicy::TrendConfirmation, _) | (OiSlopePolicy::DistributionTrap, Side::Long) => {
            scale(change)
        }
        (OiSlopePolicy::DistributionTrap, Side::Short) if change > 0.0 => {
            sheet.penalty("distribution_trap", cfg.distribution_trap_penalty);
            0.0
        }
        (OiSlopePolicy::DistributionTrap, Side::Short) => scale(-change),
    }
}

/// Half funding, half L/S delta. Each half pays out more the more the
/// crowd leans against the trade; neutral readings earn half.
fn sentiment_score(ctx: &Context, side: Side, cfg: &BreakoutConfig, safety: &SafetyConfig) -> f64 {
    let half = cfg.sentiment_max / 2.0;
    let lean = |value: f64, full: f64| (0.5 - 0.5 * value * side.sign() / full).clamp(0.0, 1.0) * half;
    let funding = ctx
        .market
        .effective_funding()
        .map(|f| lean(f, safety.extreme_funding))
        .unwrap_or(0.0);
    let crowd = if ctx.market.long_short_available {
        lean(ctx.market.long_short_delta, cfg.ls_delta_full)
    } else {
        0.0
    };
    funding + crowd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BreakoutPhase;
    use crate::strategy::detection::tests::{flat_resistance, staged_context};
    use crate::trendline::{Trendline, TrendlineKind, TrendlinePivot};

    fn retest_rsi() -> Vec<f64> {
        let mut rsi = vec![50.0; 60];
        for (i, v) in [(56, 65.0), (57, 66.0), (58, 64.0), (59, 61.5)] {
            rsi[i] = v;
        }
        rsi
    }

    fn steep_resistance() -> Trendline {
        Trendline::through(
            TrendlineKind::Resistance,
            TrendlinePivot { index: 10, value: 70.0, prominence: 15.0 },
            TrendlinePivot { index: 40, value: 62.0, prominence: 12.0 },
        )
        .unwrap()
    }

    #[test]
    fn retest_emits_phase_and_components() {
        let ctx = staged_context(retest_rsi(), flat_resistance());
        let signal = BreakoutEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert_eq!(signal.bias, Bias::Long);
        assert_eq!(signal.meta.phase, Some(BreakoutPhase::SignalEmitted));
        assert_eq!(signal.composition.components.len(), 4);
        assert!(signal.composition.filters_passed["retest"]);
        // flat line, no market data: geometry, flow, sentiment all zero
        assert_eq!(signal.composition.component("geometry"), Some(0.0));
        assert_eq!(signal.composition.component("flow"), Some(0.0));
        assert_eq!(signal.action, Action::Wait);
        assert!(signal.reason.unwrap().contains("below minimum"));
    }

    #[test]
    fn waiting_for_retest_reports_phase() {
        let mut rsi = vec![50.0; 60];
        rsi[59] = 63.0;
        let ctx = staged_context(rsi, flat_resistance());
        let signal = BreakoutEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert_eq!(signal.meta.phase, Some(BreakoutPhase::BreakoutDetected));
        assert_eq!(signal.action, Action::Wait);
        assert!(signal.reason.unwrap().contains("waiting for retest"));
    }

    #[test]
    fn extreme_funding_rejects_valid_breakout() {
        // line projects to ~56.9 at the last candle; 58.5 is a clean retest
        let mut rsi = retest_rsi();
        rsi[59] = 58.5;
        let mut ctx = staged_context(rsi, steep_resistance());
        assert!(detect_breakout(&ctx, Side::Long, &BreakoutConfig::default(), None)
            .unwrap()
            .emits_now());
        ctx.market.funding_available = true;
        ctx.market.funding_rate = 0.002;
        let cfg = EngineConfig::default();
        let signal = BreakoutEvaluator::new(cfg.clone()).evaluate(&ctx);
        assert_eq!(signal.action, Action::Rejected);
        assert!(signal.score <= cfg.safety.funding_reject_ceiling);
        let applied = signal.composition.override_applied.unwrap();
        assert_eq!(applied.rule, "extreme_funding");
        assert!(!signal.composition.filters_passed["funding"]);
    }

    #[test]
    fn predicted_funding_takes_precedence() {
        let mut ctx = staged_context(retest_rsi(), flat_resistance());
        ctx.market.funding_available = true;
        ctx.market.funding_rate = 0.002;
        ctx.market.predicted_funding_rate = Some(0.0001);
        let signal = BreakoutEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert_ne!(signal.action, Action::Rejected);
        assert_eq!(signal.composition.raw_inputs["funding_rate"], 0.0001);
    }

    #[test]
    fn steep_line_earns_geometry() {
        let ctx = staged_context(retest_rsi(), steep_resistance());
        let signal = BreakoutEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        // force = 8/30 * 30^2 = 240 of 400
        let geometry = signal.composition.component("geometry").unwrap();
        assert!((geometry - 18.0).abs() < 1e-9, "geometry {geometry}");
    }

    #[test]
    fn weak_volume_is_penalized() {
        let mut ctx = staged_context(retest_rsi(), flat_resistance());
        ctx.ltf[56].volume = 700.0;
        let signal = BreakoutEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert!(signal.composition.penalties() > 0.0);
    }

    #[test]
    fn dead_volume_rejects() {
        let mut ctx = staged_context(retest_rsi(), flat_resistance());
        ctx.ltf[56].volume = 100.0;
        let signal = BreakoutEvaluator::new(EngineConfig::default()).evaluate(&ctx);
        assert_eq!(signal.action, Action::Rejected);
        assert!(signal.score <= 25.0);
    }

    #[test]
    fn distribution_trap_penalizes_rising_oi_on_short() {
        let mut sheet = ScoreSheet::new();
        let mut ctx = staged_context(retest_rsi(), flat_resistance());
        ctx.market.oi_available = true;
        ctx.market.oi_series = vec![
            crate::market::MarketPoint {
                time: ctx.ltf[0].open_time,
                open_interest: 100.0,
                funding_rate: None,
                long_short_ratio: None,
            },
            crate::market::MarketPoint {
                time: ctx.ltf[59].open_time,
                open_interest: 110.0,
                funding_rate: None,
                long_short_ratio: None,
            },
        ];
        let state = detect_breakout(&ctx, Side::Long, &BreakoutConfig::default(), None).unwrap();
        let cfg = BreakoutConfig {
            oi_slope_policy: OiSlopePolicy::DistributionTrap,
            ..BreakoutConfig::default()
        };
        assert_eq!(flow_score(&ctx, &state, Side::Short, &cfg, &mut sheet), 0.0);
        assert_eq!(sheet.finish().penalties(), cfg.distribution_trap_penalty);

        let mut sheet = ScoreSheet::new();
        let confirm = BreakoutConfig::default();
        let flow = flow_score(&ctx, &state, Side::Long, &confirm, &mut sheet);
        assert!((flow - confirm.flow_max).abs() < 1e-9);
    }
}
