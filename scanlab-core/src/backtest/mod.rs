//! Historical replay and forward trade simulation.

pub mod replay;
pub mod simulate;

pub use replay::{replay_instrument, ReplayError, ReplayReport};
pub use simulate::simulate_trade;
