//! Shared scoring: clamp components, keep bonus/penalty line items separate,
//! apply hard overrides only after summation.
//!
//! The emitted breakdown always reconciles: `base_score` is the sum of the
//! component values, and `total` is `clamp(base + bonuses - penalties, 0, 100)`
//! unless an override ceiling is lower.

use crate::domain::{
    finite_or_zero, Action, AdjustmentKind, ScoreAdjustment, ScoreComponent, ScoreComposition,
    ScoreOverride,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ScoreSheet {
    components: Vec<ScoreComponent>,
    adjustments: Vec<ScoreAdjustment>,
    raw_inputs: BTreeMap<String, f64>,
    filters: BTreeMap<String, bool>,
    override_: Option<ScoreOverride>,
}

impl ScoreSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Named sub-score, clamped to `[0, max]`.
    pub fn component(&mut self, name: &str, value: f64, max: f64) -> f64 {
        let max = finite_or_zero(max).max(0.0);
        let value = finite_or_zero(value).clamp(0.0, max);
        self.components.push(ScoreComponent {
            name: name.to_string(),
            value,
            max,
        });
        value
    }

    /// Bonus line item; zero and negative values are not recorded.
    pub fn bonus(&mut self, name: &str, value: f64) {
        self.adjust(name, AdjustmentKind::Bonus, value);
    }

    pub fn penalty(&mut self, name: &str, value: f64) {
        self.adjust(name, AdjustmentKind::Penalty, value);
    }

    fn adjust(&mut self, name: &str, kind: AdjustmentKind, value: f64) {
        let value = finite_or_zero(value);
        if value > 0.0 {
            self.adjustments.push(ScoreAdjustment {
                name: name.to_string(),
                kind,
                value,
            });
        }
    }

    pub fn raw(&mut self, name: &str, value: f64) {
        self.raw_inputs.insert(name.to_string(), finite_or_zero(value));
    }

    pub fn filter(&mut self, name: &str, passed: bool) {
        self.filters.insert(name.to_string(), passed);
    }

    /// Cap the total and force `action`. When several rules fire, the one with
    /// the lowest ceiling wins; equal ceilings keep the first.
    pub fn override_with(&mut self, rule: &str, ceiling: f64, action: Action, reason: String) {
        let ceiling = finite_or_zero(ceiling).clamp(0.0, 100.0);
        let replace = match &self.override_ {
            Some(existing) => ceiling < existing.ceiling,
            None => true,
        };
        if replace {
            self.override_ = Some(ScoreOverride {
                rule: rule.to_string(),
                ceiling,
                action,
                reason,
            });
        }
    }

    pub fn has_override(&self) -> bool {
        self.override_.is_some()
    }

    pub fn component_total(&self) -> f64 {
        self.components.iter().map(|c| c.value).sum()
    }

    pub fn finish(self) -> ScoreComposition {
        let mut composition = ScoreComposition {
            components: self.components,
            adjustments: self.adjustments,
            base_score: 0.0,
            total: 0.0,
            raw_inputs: self.raw_inputs,
            filters_passed: self.filters,
            override_applied: self.override_,
        };
        composition.base_score = composition.components.iter().map(|c| c.value).sum();
        let arithmetic = composition.arithmetic_total();
        composition.total = match &composition.override_applied {
            Some(o) => arithmetic.min(o.ceiling),
            None => arithmetic,
        };
        composition
    }
}
