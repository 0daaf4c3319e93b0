//! Output sanitization: no NaN or infinity ever leaves the engine.

use super::outcome::{TradeOutcome, TradeRecord};
use super::signal::{ScoreComposition, Signal};

/// Replace a non-finite value with 0.0.
pub fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Records that can scrub their numeric fields before emission.
pub trait Sanitize {
    fn sanitize(&mut self);
}

impl Sanitize for ScoreComposition {
    fn sanitize(&mut self) {
        for c in &mut self.components {
            c.value = finite_or_zero(c.value);
            c.max = finite_or_zero(c.max);
        }
        for a in &mut self.adjustments {
            a.value = finite_or_zero(a.value);
        }
        for v in self.raw_inputs.values_mut() {
            *v = finite_or_zero(*v);
        }
        if let Some(o) = &mut self.override_applied {
            o.ceiling = finite_or_zero(o.ceiling);
        }
        self.base_score = finite_or_zero(self.base_score);
        self.total = finite_or_zero(self.total);
    }
}

impl Sanitize for Signal {
    fn sanitize(&mut self) {
        self.last_price = finite_or_zero(self.last_price);
        self.score = finite_or_zero(self.score).clamp(0.0, 100.0);
        self.composition.sanitize();
        let setup_is_finite = self.setup.is_some_and(|s| {
            [s.entry, s.stop_loss, s.take_profit, s.risk_reward]
                .iter()
                .all(|v| v.is_finite())
        });
        if !setup_is_finite {
            self.setup = None;
        }
    }
}

impl Sanitize for TradeOutcome {
    fn sanitize(&mut self) {
        self.realized_pnl_fraction = finite_or_zero(self.realized_pnl_fraction);
        self.fill_price = self.fill_price.filter(|v| v.is_finite());
        self.exit_price = self.exit_price.filter(|v| v.is_finite());
    }
}

impl Sanitize for TradeRecord {
    fn sanitize(&mut self) {
        self.score = finite_or_zero(self.score);
        self.outcome.sanitize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Action, Bias, Instrument, ScoreComponent, Setup, Side, SignalMeta, StrategyKind,
    };

    fn meta() -> SignalMeta {
        SignalMeta {
            ltf: "15m".into(),
            htf: "4h".into(),
            calculated_at: 0,
            candle_index: 0,
            phase: None,
        }
    }

    #[test]
    fn signal_non_finite_fields_zeroed() {
        let mut s = Signal::neutral(
            Instrument::new("BTCUSDT", "test"),
            StrategyKind::Breakout,
            f64::NAN,
            "x",
            meta(),
        );
        s.score = f64::INFINITY;
        s.composition.components.push(ScoreComponent {
            name: "geometry".into(),
            value: f64::NAN,
            max: 30.0,
        });
        s.composition.raw_inputs.insert("oi_z_score".into(), f64::NEG_INFINITY);
        s.sanitize();
        assert_eq!(s.last_price, 0.0);
        assert_eq!(s.score, 0.0);
        assert_eq!(s.composition.components[0].value, 0.0);
        assert_eq!(s.composition.raw_inputs["oi_z_score"], 0.0);
    }

    #[test]
    fn corrupted_setup_dropped() {
        let mut s = Signal::neutral(
            Instrument::new("BTCUSDT", "test"),
            StrategyKind::Breakout,
            100.0,
            "x",
            meta(),
        );
        let mut setup = Setup::new(Side::Long, 100.0, 95.0, 110.0).unwrap();
        setup.risk_reward = f64::NAN;
        s.setup = Some(setup);
        s.action = Action::Long;
        s.bias = Bias::Long;
        s.sanitize();
        assert!(s.setup.is_none());
    }
}
