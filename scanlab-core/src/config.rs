//! Engine configuration: one immutable value passed into every call.
//!
//! Every section and every field has a default (`#[serde(default)]`), so a
//! TOML file only needs to name the knobs it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub context: ContextConfig,
    pub trendline: TrendlineConfig,
    pub trend_following: TrendFollowingConfig,
    pub breakout: BreakoutConfig,
    pub institutional: InstitutionalConfig,
    pub safety: SafetyConfig,
    pub simulation: SimulationConfig,
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject combinations no evaluator can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.context;
        if c.ema_fast == 0 || c.ema_fast >= c.ema_slow {
            return Err(ConfigError::Invalid(format!(
                "ema_fast ({}) must be >= 1 and below ema_slow ({})",
                c.ema_fast, c.ema_slow
            )));
        }
        if c.rsi_period == 0 || c.adx_period == 0 || c.atr_period == 0 {
            return Err(ConfigError::Invalid("indicator periods must be >= 1".into()));
        }
        let tf = &self.trend_following;
        if !(0.0..=1.0).contains(&tf.pullback_min)
            || !(0.0..=1.0).contains(&tf.pullback_max)
            || tf.pullback_min >= tf.pullback_max
        {
            return Err(ConfigError::Invalid(format!(
                "pullback band [{}, {}] must be an increasing range inside [0, 1]",
                tf.pullback_min, tf.pullback_max
            )));
        }
        if self.trendline.min_separation == 0 {
            return Err(ConfigError::Invalid("trendline min_separation must be >= 1".into()));
        }
        if self.simulation.lookahead == 0 || self.simulation.step == 0 {
            return Err(ConfigError::Invalid("lookahead and step must be >= 1".into()));
        }
        if self.breakout.target_area <= 0.0 {
            return Err(ConfigError::Invalid("breakout target_area must be > 0".into()));
        }
        let b = &self.breakout;
        if !(0.0..b.confirmation_buffer).contains(&b.retest_tolerance) {
            return Err(ConfigError::Invalid(format!(
                "retest_tolerance ({}) must be in [0, confirmation_buffer ({}))",
                b.retest_tolerance, b.confirmation_buffer
            )));
        }
        let inst = &self.institutional;
        if inst.rr_mid_threshold > inst.rr_high_threshold {
            return Err(ConfigError::Invalid(
                "rr_mid_threshold must not exceed rr_high_threshold".into(),
            ));
        }
        let sim = &self.simulation;
        if sim.time_stop_candles == Some(0) {
            return Err(ConfigError::Invalid("time_stop_candles must be >= 1".into()));
        }
        if !(1.0..=100.0).contains(&sim.score_bucket_width) {
            return Err(ConfigError::Invalid(format!(
                "score_bucket_width ({}) must be in [1, 100]",
                sim.score_bucket_width
            )));
        }
        Ok(())
    }
}

/// Context builder knobs: history thresholds, indicator periods, feature windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub min_ltf_candles: usize,
    pub min_htf_candles: usize,
    pub rsi_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub adx_period: usize,
    pub atr_period: usize,
    pub volume_avg_window: usize,
    pub swing_lookback: usize,
    pub divergence_lookback: usize,
    pub divergence_separation: usize,
    pub money_flow_lookback: usize,
    pub oi_zscore_window: usize,
    pub ls_delta_lookback: usize,
    pub ltf_label: String,
    pub htf_label: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            min_ltf_candles: 50,
            min_htf_candles: 50,
            rsi_period: 14,
            ema_fast: 20,
            ema_slow: 50,
            adx_period: 14,
            atr_period: 14,
            volume_avg_window: 20,
            swing_lookback: 50,
            divergence_lookback: 40,
            divergence_separation: 5,
            money_flow_lookback: 20,
            oi_zscore_window: 30,
            ls_delta_lookback: 6,
            ltf_label: "15m".into(),
            htf_label: "4h".into(),
        }
    }
}

/// Pivot/trendline detection over the RSI series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendlineConfig {
    pub lookback: usize,
    pub min_separation: usize,
    pub min_prominence: f64,
}

impl Default for TrendlineConfig {
    fn default() -> Self {
        Self {
            lookback: 100,
            min_separation: 10,
            min_prominence: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendFollowingConfig {
    /// HTF ADX at or above this marks a strong trend.
    pub strong_adx: f64,
    /// ADX scoring ramps linearly from `adx_floor` to `adx_full`.
    pub adx_floor: f64,
    pub adx_full: f64,
    pub pullback_min: f64,
    pub pullback_max: f64,
    pub trend_max: f64,
    pub structure_max: f64,
    pub momentum_max: f64,
    /// Max distance (fraction of swing range) from a Fibonacci level to count as confluence.
    pub fib_tolerance: f64,
    /// Max distance (in ATRs) from the LTF slow EMA to count as confluence.
    pub ema_confluence_atr: f64,
    /// RSI band in which a long pullback is considered reset; shorts mirror it around 50.
    pub rsi_reset_low: f64,
    pub rsi_reset_high: f64,
    pub divergence_penalty: f64,
    pub volume_imbalance_penalty: f64,
    /// Stop sits this many ATRs beyond the swing extreme.
    pub stop_atr_buffer: f64,
    pub target_rr: f64,
    pub min_signal_score: f64,
}

impl Default for TrendFollowingConfig {
    fn default() -> Self {
        Self {
            strong_adx: 25.0,
            adx_floor: 15.0,
            adx_full: 40.0,
            pullback_min: 0.30,
            pullback_max: 0.80,
            trend_max: 40.0,
            structure_max: 30.0,
            momentum_max: 30.0,
            fib_tolerance: 0.05,
            ema_confluence_atr: 0.5,
            rsi_reset_low: 35.0,
            rsi_reset_high: 55.0,
            divergence_penalty: 15.0,
            volume_imbalance_penalty: 10.0,
            stop_atr_buffer: 0.5,
            target_rr: 2.0,
            min_signal_score: 60.0,
        }
    }
}

/// How a rising open interest is scored on short setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OiSlopePolicy {
    /// Rising OI confirms the move in either direction.
    TrendConfirmation,
    /// Rising OI into a short is treated as trapped longs being built, and penalized.
    DistributionTrap,
}

/// Structural breakout evaluator; the detection knobs are shared with the
/// institutionally-filtered evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutConfig {
    /// RSI points beyond the projected line required to call a breakout.
    pub confirmation_buffer: f64,
    /// Candles after the breakout during which a retest is accepted.
    pub retest_window: usize,
    /// RSI distance from the line that counts as a retest.
    pub retest_tolerance: f64,
    pub require_retest: bool,
    /// Trendline force (|slope| * duration^2) that earns the full geometry score.
    pub target_area: f64,
    pub geometry_max: f64,
    pub momentum_max: f64,
    pub flow_max: f64,
    pub sentiment_max: f64,
    pub rsi_slope_lookback: usize,
    /// RSI rise over `rsi_slope_lookback` candles that earns the full slope score.
    pub rsi_slope_full: f64,
    pub divergence_points: f64,
    /// OI fractional change over the trendline duration that earns the full flow score.
    pub oi_change_full: f64,
    pub oi_slope_policy: OiSlopePolicy,
    pub distribution_trap_penalty: f64,
    /// L/S ratio move (against the trade) that earns the full sentiment half.
    pub ls_delta_full: f64,
    pub volume_reject_ratio: f64,
    pub volume_weak_ratio: f64,
    pub volume_bonus_ratio: f64,
    pub volume_penalty: f64,
    pub volume_bonus: f64,
    pub stop_atr_mult: f64,
    pub target_rr: f64,
    pub min_signal_score: f64,
    /// How long a remembered breakout survives, in LTF candles.
    pub memory_ttl_candles: usize,
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            confirmation_buffer: 2.0,
            retest_window: 4,
            retest_tolerance: 1.5,
            require_retest: true,
            target_area: 400.0,
            geometry_max: 30.0,
            momentum_max: 25.0,
            flow_max: 25.0,
            sentiment_max: 20.0,
            rsi_slope_lookback: 3,
            rsi_slope_full: 10.0,
            divergence_points: 10.0,
            oi_change_full: 0.05,
            oi_slope_policy: OiSlopePolicy::TrendConfirmation,
            distribution_trap_penalty: 10.0,
            ls_delta_full: 0.2,
            volume_reject_ratio: 0.5,
            volume_weak_ratio: 0.8,
            volume_bonus_ratio: 1.5,
            volume_penalty: 10.0,
            volume_bonus: 10.0,
            stop_atr_mult: 1.5,
            target_rr: 2.5,
            min_signal_score: 60.0,
            memory_ttl_candles: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstitutionalConfig {
    /// Mandatory: OI Z-score must exceed this.
    pub oi_zscore_min: f64,
    /// Z-score that earns the full institutional-flow score.
    pub oi_zscore_full: f64,
    pub range_max: f64,
    pub flow_max: f64,
    pub money_flow_max: f64,
    /// Normalized money-flow slope that earns the full confirmation score.
    pub money_flow_full: f64,
    pub retest_bonus: f64,
    pub fresh_breakout_bonus: f64,
    /// Structural reward-to-risk earning `rr_bonus_high`.
    pub rr_high_threshold: f64,
    /// Structural reward-to-risk earning `rr_bonus_mid`.
    pub rr_mid_threshold: f64,
    pub rr_bonus_high: f64,
    pub rr_bonus_mid: f64,
    pub stop_atr_mult: f64,
    pub target_rr: f64,
    pub min_signal_score: f64,
}

impl Default for InstitutionalConfig {
    fn default() -> Self {
        Self {
            oi_zscore_min: 1.5,
            oi_zscore_full: 3.0,
            range_max: 25.0,
            flow_max: 30.0,
            money_flow_max: 20.0,
            money_flow_full: 0.5,
            retest_bonus: 15.0,
            fresh_breakout_bonus: 5.0,
            rr_high_threshold: 3.0,
            rr_mid_threshold: 2.0,
            rr_bonus_high: 10.0,
            rr_bonus_mid: 5.0,
            stop_atr_mult: 1.5,
            target_rr: 3.0,
            min_signal_score: 60.0,
        }
    }
}

/// Hard safety caps applied after summation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Funding rate (fraction per interval) considered extreme in the trade direction.
    pub extreme_funding: f64,
    pub funding_reject_ceiling: f64,
    pub volume_reject_ceiling: f64,
    pub filter_fail_ceiling: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            extreme_funding: 0.001,
            funding_reject_ceiling: 20.0,
            volume_reject_ceiling: 25.0,
            filter_fail_ceiling: 30.0,
        }
    }
}

/// How a setup's limit entry is considered filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Filled at the entry price on the first touch.
    Immediate,
    /// Touch must close on the right side of the stop; filled at that close.
    ConfirmOnClose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Forward candles walked after the signal candle.
    pub lookahead: usize,
    pub fill_policy: FillPolicy,
    /// Force-exit at the close once this many candles elapsed since fill.
    pub time_stop_candles: Option<usize>,
    /// Evaluate every `step` candles.
    pub step: usize,
    /// LTF candles handed to the context builder at each point.
    pub context_window: usize,
    /// Width of the calibration score buckets.
    pub score_bucket_width: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            lookahead: 96,
            fill_policy: FillPolicy::Immediate,
            time_stop_candles: None,
            step: 1,
            context_window: 300,
            score_bucket_width: 10.0,
        }
    }
}
