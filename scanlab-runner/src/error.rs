use crate::config::RunConfigError;
use crate::store::LoadError;
use thiserror::Error;

/// Errors that stop a whole scan or backtest. Per-instrument failures never
/// surface here; they are recorded on the result and the run continues.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] RunConfigError),

    #[error("no instruments to process")]
    NoInstruments,

    #[error("list instruments: {0}")]
    Listing(#[from] LoadError),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}
