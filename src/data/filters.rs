//! Filters: show/hide definitions and the per-import matcher.
//!
//! A filter is a boolean expression over the five input slots plus a time
//! buffer and a mode. Matching runs per import on that import's local time
//! base; the matcher only reports the offset-corrected matching timestamps.
//! Buffering and interval merging happen once at the unified cross-import
//! level (see `engine`), so buffering semantics are identical no matter
//! which import contributed a match.

use serde::{Deserialize, Serialize};

use crate::data::channel::Import;
use crate::data::math::{structural_check, validate_expression};
use crate::data::slots::{bind_slots, SlotBindings};
use crate::error::EngineError;
use crate::expr::{evaluate, EvalContext};

/// Whether matching samples are shown or hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    Show,
    Hide,
}

/// Definition of one visibility filter. Global; evaluated independently per
/// import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDef {
    /// Unique name; also the key into the filter order.
    pub name: String,
    /// Boolean formula over the bound slots, e.g. `"x1 > 4000 & x2 < 90"`.
    pub expression: String,
    pub slots: SlotBindings,
    pub mode: FilterMode,
    /// Seconds of padding added around each matching sample before intervals
    /// are merged. Must be ≥ 0.
    pub buffer: f64,
    pub enabled: bool,
}

impl Default for FilterDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            expression: String::new(),
            slots: SlotBindings::default(),
            mode: FilterMode::Show,
            buffer: 0.0,
            enabled: true,
        }
    }
}

impl FilterDef {
    /// Gate for create/edit dialogs; same contract as
    /// [`MathChannelDef::validate`](crate::data::math::MathChannelDef::validate).
    pub fn validate(&self) -> Result<String, EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation { reason: "filter name must not be empty".into() });
        }
        if !self.buffer.is_finite() || self.buffer < 0.0 {
            return Err(EngineError::Validation {
                reason: "buffer must be a non-negative number of seconds".into(),
            });
        }
        structural_check(&self.slots)?;
        validate_expression(&self.expression, &self.slots)
    }
}

/// Result of matching one filter against one import.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterMatch {
    /// Absolute-time (offset-corrected) timestamps of matching samples,
    /// unmerged and unbuffered.
    Matches(Vec<f64>),
    NoMatch,
}

/// Evaluate `filter` against one import. Returns the import-local matching
/// sample timestamps shifted into absolute time by the import's offset.
/// A missing mandatory channel or a failing expression yields `NoMatch` for
/// this import only.
pub fn match_filter(filter: &FilterDef, import: &Import) -> FilterMatch {
    let base = match import.channel(&filter.slots.x1) {
        Some(c) => c,
        None => {
            log::debug!(
                "filter '{}': import '{}' lacks input '{}', no match",
                filter.name,
                import.name,
                filter.slots.x1
            );
            return FilterMatch::NoMatch;
        }
    };
    let t_ref = base.times.clone();
    let bound = match bind_slots(&filter.slots, import, &t_ref) {
        Ok(b) => b,
        Err(e) => {
            log::warn!("filter '{}' skipped for import '{}': {}", filter.name, import.name, e);
            return FilterMatch::NoMatch;
        }
    };
    let mut ctx = EvalContext::new(&t_ref);
    for (slot, values) in &bound {
        ctx = ctx.bind(slot, values);
    }
    let mask = match evaluate(&filter.expression, &ctx).and_then(|v| v.into_array(t_ref.len())) {
        Ok(mask) => mask,
        Err(e) => {
            log::warn!("filter '{}' failed for import '{}': {}", filter.name, import.name, e);
            return FilterMatch::NoMatch;
        }
    };
    let matches: Vec<f64> = t_ref
        .iter()
        .zip(&mask)
        .filter(|(_, &m)| m != 0.0)
        .map(|(&t, _)| t + import.offset)
        .collect();
    if matches.is_empty() {
        FilterMatch::NoMatch
    } else {
        FilterMatch::Matches(matches)
    }
}
