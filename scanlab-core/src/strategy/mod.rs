//! Strategy evaluators: pure functions from a [`Context`] to a [`Signal`].
//!
//! All three variants share the output shape and the action rule; they
//! differ in bias determination and scoring.

pub mod breakout;
pub mod detection;
pub mod institutional;
pub mod memory;
pub mod scoring;
pub mod setup;
pub mod trend_following;

pub use breakout::BreakoutEvaluator;
pub use detection::{detect_breakout, BreakoutState, VolumeVerdict};
pub use institutional::{InstitutionalEvaluator, RsiRange};
pub use memory::{BreakoutKey, BreakoutMemory};
pub use scoring::ScoreSheet;
pub use trend_following::TrendFollowingEvaluator;

use crate::config::EngineConfig;
use crate::context::Context;
use crate::domain::{Action, Bias, BreakoutPhase, Setup, Signal, StrategyKind};

pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> StrategyKind;

    fn evaluate(&self, ctx: &Context) -> Signal;

    /// Evaluate with caller-owned breakout memory. Evaluators without
    /// cross-call state ignore it.
    fn evaluate_with_memory(&self, ctx: &Context, memory: &mut BreakoutMemory) -> Signal {
        let _ = memory;
        self.evaluate(ctx)
    }
}

/// Build the evaluator for `kind` over `config`.
pub fn create_evaluator(kind: StrategyKind, config: &EngineConfig) -> Box<dyn Evaluator> {
    match kind {
        StrategyKind::TrendFollowing => Box::new(TrendFollowingEvaluator::new(config.clone())),
        StrategyKind::Breakout => Box::new(BreakoutEvaluator::new(config.clone())),
        StrategyKind::InstitutionalBreakout => {
            Box::new(InstitutionalEvaluator::new(config.clone()))
        }
    }
}

/// WAIT, score 0, no setup: what every evaluator returns for an unready context.
pub(crate) fn insufficient(ctx: &Context, strategy: StrategyKind) -> Signal {
    let reason = match ctx.status {
        crate::context::ContextStatus::InsufficientHistory {
            ltf,
            htf,
            required_ltf,
            required_htf,
        } => format!(
            "insufficient history: ltf {ltf}/{required_ltf}, htf {htf}/{required_htf}"
        ),
        crate::context::ContextStatus::Ready => "context not ready".to_string(),
    };
    Signal::neutral(
        ctx.instrument.clone(),
        strategy,
        ctx.last_close(),
        reason,
        ctx.meta(),
    )
}

/// Everything an evaluator gathered, before the action rule is applied.
pub(crate) struct Decision {
    pub strategy: StrategyKind,
    pub bias: Bias,
    pub sheet: ScoreSheet,
    pub setup: Option<Setup>,
    pub min_score: f64,
    pub phase: Option<BreakoutPhase>,
    /// First reason the evaluator found for not acting, if any.
    pub blocker: Option<String>,
    /// Reason attached to a directional signal.
    pub rationale: String,
}

impl Decision {
    pub fn new(strategy: StrategyKind, min_score: f64) -> Self {
        Self {
            strategy,
            bias: Bias::None,
            sheet: ScoreSheet::new(),
            setup: None,
            min_score,
            phase: None,
            blocker: None,
            rationale: String::new(),
        }
    }

    /// Record a blocking reason; the first one recorded is reported.
    pub fn block(&mut self, reason: impl Into<String>) {
        if self.blocker.is_none() {
            self.blocker = Some(reason.into());
        }
    }

    /// Apply the action rule: directional only when no override applies,
    /// nothing blocks, a valid setup exists and the score clears the minimum.
    pub fn into_signal(self, ctx: &Context) -> Signal {
        let composition = self.sheet.finish();
        let score = composition.total;

        let (action, reason) = if let Some(o) = &composition.override_applied {
            (o.action, Some(o.reason.clone()))
        } else if let Some(blocker) = self.blocker {
            (Action::Wait, Some(blocker))
        } else {
            match (self.bias.side(), &self.setup) {
                (None, _) => (Action::Wait, Some("no directional bias".to_string())),
                (Some(_), None) => (Action::Wait, Some("no valid setup".to_string())),
                (Some(side), Some(_)) if score >= self.min_score => {
                    (side.action(), Some(self.rationale))
                }
                (Some(_), Some(_)) => (
                    Action::Wait,
                    Some(format!(
                        "score {score:.1} below minimum {:.1}",
                        self.min_score
                    )),
                ),
            }
        };

        let mut meta = ctx.meta();
        meta.phase = self.phase;

        Signal {
            instrument: ctx.instrument.clone(),
            strategy: self.strategy,
            last_price: ctx.last_close(),
            score,
            bias: self.bias,
            action,
            setup: self.setup,
            composition,
            reason: reason.filter(|r| !r.is_empty()),
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextBuilder, MarketInput};
    use crate::domain::{Instrument, Side};
    use crate::indicators::make_candles;

    fn short_context() -> Context {
        let cfg = EngineConfig::default();
        let candles = make_candles(&[100.0; 10]);
        ContextBuilder::new(&cfg).build(
            &Instrument::new("ETHUSDT", "test"),
            &candles,
            &candles,
            MarketInput::None,
        )
    }

    #[test]
    fn every_evaluator_waits_on_short_history() {
        let cfg = EngineConfig::default();
        let ctx = short_context();
        for kind in StrategyKind::ALL {
            let signal = create_evaluator(kind, &cfg).evaluate(&ctx);
            assert_eq!(signal.action, Action::Wait, "{kind}");
            assert_eq!(signal.score, 0.0);
            assert!(signal.setup.is_none());
            assert!(signal.reason.unwrap().contains("insufficient history"));
        }
    }

    #[test]
    fn decision_below_minimum_waits() {
        let ctx = short_context();
        let mut d = Decision::new(StrategyKind::Breakout, 60.0);
        d.bias = Bias::Long;
        d.sheet.component("a", 50.0, 100.0);
        d.setup = Some(Setup::new(Side::Long, 100.0, 95.0, 110.0).unwrap());
        let signal = d.into_signal(&ctx);
        assert_eq!(signal.action, Action::Wait);
        assert!(signal.reason.unwrap().contains("below minimum"));
    }

    #[test]
    fn decision_above_minimum_is_directional() {
        let ctx = short_context();
        let mut d = Decision::new(StrategyKind::Breakout, 60.0);
        d.bias = Bias::Short;
        d.sheet.component("a", 70.0, 100.0);
        d.setup = Some(Setup::new(Side::Short, 100.0, 105.0, 90.0).unwrap());
        d.rationale = "test".into();
        let signal = d.into_signal(&ctx);
        assert_eq!(signal.action, Action::Short);
        assert!(signal.is_actionable());
    }

    #[test]
    fn override_beats_blocker() {
        let ctx = short_context();
        let mut d = Decision::new(StrategyKind::Breakout, 60.0);
        d.block("waiting");
        d.sheet
            .override_with("funding", 20.0, Action::Rejected, "extreme funding".into());
        let signal = d.into_signal(&ctx);
        assert_eq!(signal.action, Action::Rejected);
        assert_eq!(signal.reason.as_deref(), Some("extreme funding"));
    }
}
