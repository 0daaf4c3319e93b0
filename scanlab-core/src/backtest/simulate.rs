//! Forward walk of one setup over the candles that follow its signal.
//!
//! Entry is a limit order. Once filled, each candle checks the stop before the
//! target, so a candle spanning both resolves as a LOSS.

use crate::config::{FillPolicy, SimulationConfig};
use crate::domain::{Candle, Setup, Side, TradeOutcome, TradeResult};

fn touches_entry(setup: &Setup, c: &Candle) -> bool {
    match setup.side {
        Side::Long => c.low <= setup.entry,
        Side::Short => c.high >= setup.entry,
    }
}

fn hits_stop(setup: &Setup, c: &Candle) -> bool {
    match setup.side {
        Side::Long => c.low <= setup.stop_loss,
        Side::Short => c.high >= setup.stop_loss,
    }
}

fn hits_target(setup: &Setup, c: &Candle) -> bool {
    match setup.side {
        Side::Long => c.high >= setup.take_profit,
        Side::Short => c.low <= setup.take_profit,
    }
}

fn closes_beyond_target(setup: &Setup, c: &Candle) -> bool {
    match setup.side {
        Side::Long => c.close >= setup.take_profit,
        Side::Short => c.close <= setup.take_profit,
    }
}

fn closes_beyond_stop(setup: &Setup, c: &Candle) -> bool {
    match setup.side {
        Side::Long => c.close <= setup.stop_loss,
        Side::Short => c.close >= setup.stop_loss,
    }
}

fn pnl_fraction(side: Side, fill: f64, exit: f64) -> f64 {
    side.sign() * (exit - fill) / fill
}

fn exited(
    setup: &Setup,
    fill: f64,
    exit: f64,
    walked: usize,
    result: TradeResult,
    time_exit: bool,
) -> TradeOutcome {
    TradeOutcome {
        result,
        realized_pnl_fraction: pnl_fraction(setup.side, fill, exit),
        candles_to_resolution: walked,
        was_time_exit: time_exit,
        was_never_filled: false,
        fill_invalidated: false,
        fill_price: Some(fill),
        exit_price: Some(exit),
    }
}

/// Walk at most `config.lookahead` candles of `forward` (the candles strictly
/// after the signal candle) and classify the trade.
pub fn simulate_trade(setup: &Setup, forward: &[Candle], config: &SimulationConfig) -> TradeOutcome {
    let window = &forward[..forward.len().min(config.lookahead)];

    let Some(touch) = window.iter().position(|c| touches_entry(setup, c)) else {
        return TradeOutcome::never_filled(window.len(), false);
    };
    let candle = &window[touch];

    let fill = match config.fill_policy {
        FillPolicy::Immediate => {
            if hits_stop(setup, candle) {
                return exited(setup, setup.entry, setup.stop_loss, touch + 1, TradeResult::Loss, false);
            }
            setup.entry
        }
        FillPolicy::ConfirmOnClose => {
            if closes_beyond_stop(setup, candle) {
                return TradeOutcome::never_filled(touch + 1, true);
            }
            // touched entry and ran through the target within one candle
            if closes_beyond_target(setup, candle) {
                return exited(setup, setup.entry, setup.take_profit, touch + 1, TradeResult::Win, false);
            }
            candle.close
        }
    };

    for (offset, c) in window[touch + 1..].iter().enumerate() {
        let walked = touch + 2 + offset;
        if hits_stop(setup, c) {
            return exited(setup, fill, setup.stop_loss, walked, TradeResult::Loss, false);
        }
        if hits_target(setup, c) {
            return exited(setup, fill, setup.take_profit, walked, TradeResult::Win, false);
        }
        let elapsed = offset + 1;
        if config.time_stop_candles.is_some_and(|n| elapsed >= n) {
            let pnl = pnl_fraction(setup.side, fill, c.close);
            let result = if pnl > 0.0 {
                TradeResult::Win
            } else if pnl < 0.0 {
                TradeResult::Loss
            } else {
                TradeResult::Expired
            };
            return exited(setup, fill, c.close, walked, result, true);
        }
    }

    TradeOutcome {
        result: TradeResult::Expired,
        realized_pnl_fraction: 0.0,
        candles_to_resolution: window.len(),
        was_time_exit: false,
        was_never_filled: false,
        fill_invalidated: false,
        fill_price: Some(fill),
        exit_price: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle {
            open_time: 0,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 1.0,
        }
    }

    fn long_setup() -> Setup {
        Setup::new(Side::Long, 100.0, 95.0, 110.0).unwrap()
    }

    fn cfg() -> SimulationConfig {
        SimulationConfig::default()
    }

    #[test]
    fn touch_then_target_wins() {
        let forward = [bar(101.0, 102.0, 99.5, 100.5), bar(109.5, 111.0, 109.0, 110.5)];
        let out = simulate_trade(&long_setup(), &forward, &cfg());
        assert_eq!(out.result, TradeResult::Win);
        assert!((out.realized_pnl_fraction - 0.10).abs() < 1e-12);
        assert_eq!(out.candles_to_resolution, 2);
        assert_eq!(out.fill_price, Some(100.0));
    }

    #[test]
    fn touch_then_stop_loses() {
        let forward = [bar(101.0, 102.0, 99.5, 100.5), bar(99.0, 99.5, 94.0, 96.0)];
        let out = simulate_trade(&long_setup(), &forward, &cfg());
        assert_eq!(out.result, TradeResult::Loss);
        assert!((out.realized_pnl_fraction + 0.05).abs() < 1e-12);
    }

    #[test]
    fn never_touched_expires_flat() {
        let forward = vec![bar(102.0, 104.0, 101.0, 103.0); 10];
        let out = simulate_trade(&long_setup(), &forward, &cfg());
        assert_eq!(out.result, TradeResult::Expired);
        assert!(out.was_never_filled);
        assert_eq!(out.realized_pnl_fraction, 0.0);
        assert_eq!(out.candles_to_resolution, 10);
    }

    #[test]
    fn stop_and_target_in_one_candle_is_a_loss() {
        let forward = [bar(101.0, 102.0, 99.5, 100.5), bar(100.0, 112.0, 94.0, 105.0)];
        let out = simulate_trade(&long_setup(), &forward, &cfg());
        assert_eq!(out.result, TradeResult::Loss);
    }

    #[test]
    fn immediate_fill_checks_stop_on_fill_candle() {
        let forward = [bar(101.0, 101.5, 94.5, 96.0)];
        let out = simulate_trade(&long_setup(), &forward, &cfg());
        assert_eq!(out.result, TradeResult::Loss);
        assert_eq!(out.candles_to_resolution, 1);
    }

    #[test]
    fn confirm_on_close_invalidates_close_beyond_stop() {
        let config = SimulationConfig {
            fill_policy: FillPolicy::ConfirmOnClose,
            ..cfg()
        };
        let forward = [bar(101.0, 101.5, 94.0, 94.5), bar(95.0, 120.0, 95.0, 119.0)];
        let out = simulate_trade(&long_setup(), &forward, &config);
        assert!(out.was_never_filled);
        assert!(out.fill_invalidated);
        assert_eq!(out.result, TradeResult::Expired);
        assert_eq!(out.realized_pnl_fraction, 0.0);
    }

    #[test]
    fn confirm_on_close_fills_at_close() {
        let config = SimulationConfig {
            fill_policy: FillPolicy::ConfirmOnClose,
            ..cfg()
        };
        // wick through the stop but close above it
        let forward = [bar(101.0, 101.5, 94.0, 98.0), bar(99.0, 111.0, 98.5, 110.5)];
        let out = simulate_trade(&long_setup(), &forward, &config);
        assert_eq!(out.fill_price, Some(98.0));
        assert_eq!(out.result, TradeResult::Win);
        assert!((out.realized_pnl_fraction - 12.0 / 98.0).abs() < 1e-12);
    }

    #[test]
    fn confirm_on_close_beyond_target_wins_at_target() {
        let config = SimulationConfig {
            fill_policy: FillPolicy::ConfirmOnClose,
            ..cfg()
        };
        let forward = [bar(101.0, 113.0, 99.0, 112.0), bar(112.0, 112.5, 111.0, 111.5)];
        let out = simulate_trade(&long_setup(), &forward, &config);
        assert_eq!(out.result, TradeResult::Win);
        assert_eq!(out.candles_to_resolution, 1);
        assert_eq!(out.fill_price, Some(100.0));
        assert_eq!(out.exit_price, Some(110.0));
        assert!((out.realized_pnl_fraction - 0.10).abs() < 1e-12);

        let short = Setup::new(Side::Short, 100.0, 105.0, 90.0).unwrap();
        let forward = [bar(99.0, 101.0, 88.0, 89.0)];
        let out = simulate_trade(&short, &forward, &config);
        assert_eq!(out.result, TradeResult::Win);
        assert!(out.realized_pnl_fraction > 0.0);
    }

    #[test]
    fn time_stop_exits_at_close() {
        let config = SimulationConfig {
            time_stop_candles: Some(2),
            ..cfg()
        };
        let forward = [
            bar(101.0, 102.0, 99.5, 100.5),
            bar(100.5, 103.0, 100.0, 102.0),
            bar(102.0, 104.0, 101.0, 103.0),
            bar(103.0, 115.0, 102.0, 114.0),
        ];
        let out = simulate_trade(&long_setup(), &forward, &config);
        assert!(out.was_time_exit);
        assert_eq!(out.result, TradeResult::Win);
        assert_eq!(out.exit_price, Some(103.0));
        assert_eq!(out.candles_to_resolution, 3);
    }

    #[test]
    fn filled_but_unresolved_expires_flat() {
        let forward = [bar(101.0, 102.0, 99.5, 100.5), bar(100.5, 103.0, 100.0, 102.0)];
        let out = simulate_trade(&long_setup(), &forward, &cfg());
        assert_eq!(out.result, TradeResult::Expired);
        assert!(!out.was_never_filled);
        assert_eq!(out.realized_pnl_fraction, 0.0);
    }

    #[test]
    fn short_mirror() {
        let setup = Setup::new(Side::Short, 100.0, 105.0, 90.0).unwrap();
        let forward = [bar(99.0, 100.5, 98.0, 99.0), bar(95.0, 96.0, 89.0, 90.5)];
        let out = simulate_trade(&setup, &forward, &cfg());
        assert_eq!(out.result, TradeResult::Win);
        assert!((out.realized_pnl_fraction - 0.10).abs() < 1e-12);
    }

    #[test]
    fn lookahead_bounds_the_walk() {
        let config = SimulationConfig {
            lookahead: 3,
            ..cfg()
        };
        let mut forward = vec![bar(102.0, 104.0, 101.0, 103.0); 5];
        forward.push(bar(101.0, 102.0, 99.0, 100.0));
        let out = simulate_trade(&long_setup(), &forward, &config);
        assert!(out.was_never_filled);
        assert_eq!(out.candles_to_resolution, 3);
    }
}
