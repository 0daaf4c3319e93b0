//! Signal records: the evaluator output shape shared by every strategy.
//!
//! A [`Signal`] is immutable once an evaluator returns it. It always carries a
//! full [`ScoreComposition`] so consumers can render a breakdown that sums to
//! the displayed total, even when the action is WAIT or REJECTED.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::instrument::Instrument;

/// Directional bias derived by an evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Long,
    Short,
    None,
}

impl Bias {
    pub fn side(self) -> Option<Side> {
        match self {
            Bias::Long => Some(Side::Long),
            Bias::Short => Some(Side::Short),
            Bias::None => None,
        }
    }
}

/// Trade side of a setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn action(self) -> Action {
        match self {
            Side::Long => Action::Long,
            Side::Short => Action::Short,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        })
    }
}

/// What the caller should do with the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Long,
    Short,
    Wait,
    Rejected,
}

impl Action {
    pub fn is_directional(self) -> bool {
        matches!(self, Action::Long | Action::Short)
    }
}

/// The three evaluator variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    TrendFollowing,
    Breakout,
    InstitutionalBreakout,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::TrendFollowing,
        StrategyKind::Breakout,
        StrategyKind::InstitutionalBreakout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::TrendFollowing => "trend_following",
            StrategyKind::Breakout => "breakout",
            StrategyKind::InstitutionalBreakout => "institutional_breakout",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "trend_following" | "trend" => Ok(StrategyKind::TrendFollowing),
            "breakout" => Ok(StrategyKind::Breakout),
            "institutional_breakout" | "institutional" => Ok(StrategyKind::InstitutionalBreakout),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Errors from [`Setup::new`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetupError {
    #[error("setup prices must be finite and positive")]
    NonFinite,

    #[error(
        "{side:?} setup is not bracketed: stop_loss={stop_loss}, entry={entry}, take_profit={take_profit}"
    )]
    Bracketing {
        side: Side,
        entry: f64,
        stop_loss: f64,
        take_profit: f64,
    },
}

/// A proposed trade. Only constructible through [`Setup::new`], which enforces
/// `stop_loss < entry < take_profit` for longs and the mirror for shorts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward: f64,
}

impl Setup {
    pub fn new(side: Side, entry: f64, stop_loss: f64, take_profit: f64) -> Result<Self, SetupError> {
        let prices = [entry, stop_loss, take_profit];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(SetupError::NonFinite);
        }
        let bracketed = match side {
            Side::Long => stop_loss < entry && entry < take_profit,
            Side::Short => take_profit < entry && entry < stop_loss,
        };
        if !bracketed {
            return Err(SetupError::Bracketing {
                side,
                entry,
                stop_loss,
                take_profit,
            });
        }
        let risk = (entry - stop_loss).abs();
        let reward = (take_profit - entry).abs();
        Ok(Self {
            side,
            entry,
            stop_loss,
            take_profit,
            risk_reward: reward / risk,
        })
    }

    /// Whether stop and target bracket the entry consistently with `side`.
    pub fn is_bracketed(&self) -> bool {
        match self.side {
            Side::Long => self.stop_loss < self.entry && self.entry < self.take_profit,
            Side::Short => self.take_profit < self.entry && self.entry < self.stop_loss,
        }
    }

    pub fn risk(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }
}

/// One capped sub-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub name: String,
    pub value: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Bonus,
    Penalty,
}

/// Explicitly labeled bonus or penalty line item (value is a magnitude).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAdjustment {
    pub name: String,
    pub kind: AdjustmentKind,
    pub value: f64,
}

/// Hard-rule override applied after summation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOverride {
    pub rule: String,
    pub ceiling: f64,
    pub action: Action,
    pub reason: String,
}

/// Score breakdown.
///
/// `base_score` is the sum of `components` (pre-cap). `total` is
/// `clamp(base_score + bonuses - penalties, 0, 100)`, then lowered to the
/// override ceiling when `override_applied` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComposition {
    pub components: Vec<ScoreComponent>,
    pub adjustments: Vec<ScoreAdjustment>,
    pub base_score: f64,
    pub total: f64,
    pub raw_inputs: BTreeMap<String, f64>,
    pub filters_passed: BTreeMap<String, bool>,
    pub override_applied: Option<ScoreOverride>,
}

impl ScoreComposition {
    pub fn component(&self, name: &str) -> Option<f64> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
    }

    pub fn bonuses(&self) -> f64 {
        self.adjustments
            .iter()
            .filter(|a| a.kind == AdjustmentKind::Bonus)
            .map(|a| a.value)
            .sum()
    }

    pub fn penalties(&self) -> f64 {
        self.adjustments
            .iter()
            .filter(|a| a.kind == AdjustmentKind::Penalty)
            .map(|a| a.value)
            .sum()
    }

    /// Total before any override: `clamp(base + bonuses - penalties, 0, 100)`.
    pub fn arithmetic_total(&self) -> f64 {
        (self.base_score + self.bonuses() - self.penalties()).clamp(0.0, 100.0)
    }
}

/// Breakout state machine phase, re-derived on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakoutPhase {
    Idle,
    BreakoutDetected,
    RetestWindowOpen,
    Expired,
    SignalEmitted,
}

/// Diagnostic metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMeta {
    pub ltf: String,
    pub htf: String,
    /// Open time (epoch ms) of the last LTF candle the context was built from.
    pub calculated_at: i64,
    /// Index of that candle in the full candle series.
    pub candle_index: usize,
    pub phase: Option<BreakoutPhase>,
}

/// Evaluator output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: Instrument,
    pub strategy: StrategyKind,
    pub last_price: f64,
    pub score: f64,
    pub bias: Bias,
    pub action: Action,
    pub setup: Option<Setup>,
    pub composition: ScoreComposition,
    pub reason: Option<String>,
    pub meta: SignalMeta,
}

impl Signal {
    /// Neutral WAIT signal with score 0 and no setup.
    pub fn neutral(
        instrument: Instrument,
        strategy: StrategyKind,
        last_price: f64,
        reason: impl Into<String>,
        meta: SignalMeta,
    ) -> Self {
        Self {
            instrument,
            strategy,
            last_price,
            score: 0.0,
            bias: Bias::None,
            action: Action::Wait,
            setup: None,
            composition: ScoreComposition::default(),
            reason: Some(reason.into()),
            meta,
        }
    }

    /// Directional action with a setup attached.
    pub fn is_actionable(&self) -> bool {
        self.action.is_directional() && self.setup.is_some()
    }
}
