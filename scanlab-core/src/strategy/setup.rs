//! Trade setup construction shared by the evaluators.
//!
//! Entry is always the last close; take profit sits `target_rr` risks away.

use crate::domain::{Setup, SetupError, Side};

/// Stop `stop_mult` ATRs away from entry.
pub fn atr_setup(
    side: Side,
    entry: f64,
    atr: f64,
    stop_mult: f64,
    target_rr: f64,
) -> Result<Setup, SetupError> {
    let stop = entry - side.sign() * stop_mult * atr;
    setup_with_stop(side, entry, stop, target_rr)
}

/// Explicit stop; the target is derived from the risk it implies.
pub fn setup_with_stop(
    side: Side,
    entry: f64,
    stop_loss: f64,
    target_rr: f64,
) -> Result<Setup, SetupError> {
    let risk = (entry - stop_loss).abs();
    let take_profit = entry + side.sign() * target_rr * risk;
    Setup::new(side, entry, stop_loss, take_profit)
}
