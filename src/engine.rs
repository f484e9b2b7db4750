//! Cross-import synchronization and precedence mask composition.
//!
//! Matching runs per import, but visibility is decided globally: all imports'
//! matches for one filter are unified into a single buffered interval set in
//! absolute time, so a spike seen by one import shows (or hides) the buffered
//! neighborhood in every import, even where that import's own values never
//! satisfy the expression.
//!
//! Precedence is an explicit invariant: index 0 of the filter order is the
//! highest precedence. Composition walks the enabled filters in reverse, so
//! the index-0 filter is applied last and overwrites everything below it.
//!
//! Recomputation is pure and total: every relevant mutation re-runs it from
//! scratch and the previous result is replaced wholesale. There is no
//! incremental update and no cancellation.

use std::collections::HashMap;

use crate::data::channel::Import;
use crate::data::filters::{match_filter, FilterDef, FilterMatch, FilterMode};
use crate::data::math::{self, MathChannelDef};
use crate::error::EngineError;
use crate::intervals::{self, Interval};

/// Immutable-per-recompute configuration snapshot: all definitions plus the
/// filter precedence order. The UI mutates this between recomputes; the
/// compute functions only ever read it.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub filters: HashMap<String, FilterDef>,
    /// Precedence order over filter names: index 0 = highest precedence
    /// (applied last). Every name resolves to an entry in `filters`.
    pub filter_order: Vec<String>,
    pub math_channels: Vec<MathChannelDef>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a filter. New names join the order at the lowest
    /// precedence; re-adding an existing name keeps its position. Returns the
    /// validation preview.
    pub fn add_filter(&mut self, def: FilterDef) -> Result<String, EngineError> {
        let preview = def.validate()?;
        if !self.filters.contains_key(&def.name) {
            self.filter_order.push(def.name.clone());
        }
        self.filters.insert(def.name.clone(), def);
        Ok(preview)
    }

    pub fn remove_filter(&mut self, name: &str) {
        self.filters.remove(name);
        self.filter_order.retain(|n| n != name);
    }

    /// Move a filter to `index` in the precedence order (clamped).
    pub fn reorder_filter(&mut self, name: &str, index: usize) {
        if let Some(pos) = self.filter_order.iter().position(|n| n == name) {
            let name = self.filter_order.remove(pos);
            let index = index.min(self.filter_order.len());
            self.filter_order.insert(index, name);
        }
    }

    pub fn set_filter_enabled(&mut self, name: &str, enabled: bool) {
        if let Some(f) = self.filters.get_mut(name) {
            f.enabled = enabled;
        }
    }

    /// Validate and insert a math-channel definition, replacing any previous
    /// definition of the same name. Returns the validation preview.
    pub fn add_math_channel(&mut self, def: MathChannelDef) -> Result<String, EngineError> {
        let preview = def.validate()?;
        self.math_channels.retain(|d| d.name != def.name);
        self.math_channels.push(def);
        Ok(preview)
    }

    pub fn remove_math_channel(&mut self, name: &str) {
        self.math_channels.retain(|d| d.name != name);
    }

    /// Enabled filters in precedence order (index 0 = highest).
    fn enabled_filters(&self) -> Vec<&FilterDef> {
        self.filter_order
            .iter()
            .filter_map(|n| self.filters.get(n))
            .filter(|f| f.enabled)
            .collect()
    }
}

/// Everything one recompute produces. Fully replaced each time; never
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct VisibilityResult {
    /// import id → channel name → per-sample visibility.
    pub masks: HashMap<u64, HashMap<String, Vec<bool>>>,
    /// import id → contiguous visible runs of the reference channel, in that
    /// import's local time. Consumed by the renderer to break the line.
    pub visible_intervals: HashMap<u64, Vec<Interval>>,
    /// filter name → unified buffered intervals in absolute time.
    pub unified: HashMap<String, Vec<Interval>>,
}

/// Match one filter across all imports and unify the matches into one
/// buffered, merged interval set in absolute time.
pub fn unify(filter: &FilterDef, imports: &[Import]) -> Vec<Interval> {
    let mut all: Vec<f64> = Vec::new();
    for import in imports {
        if let FilterMatch::Matches(ts) = match_filter(filter, import) {
            all.extend(ts);
        }
    }
    intervals::buffered_union(&all, filter.buffer)
}

/// Compose the final per-channel masks for every import, then derive each
/// import's visible interval set from its reference channel.
///
/// The base mask is all-true only while every enabled filter hides; as soon
/// as any enabled show filter exists the base flips to all-false for every
/// channel of every import, including channels no show filter ever targets,
/// which therefore go blank. This is intentional; see the open questions in
/// DESIGN.md before changing it.
pub fn compose(
    cfg: &EngineConfig,
    unified: &HashMap<String, Vec<Interval>>,
    imports: &[Import],
) -> (HashMap<u64, HashMap<String, Vec<bool>>>, HashMap<u64, Vec<Interval>>) {
    let enabled = cfg.enabled_filters();
    let has_any_show = enabled.iter().any(|f| f.mode == FilterMode::Show);
    let mut masks: HashMap<u64, HashMap<String, Vec<bool>>> = HashMap::new();
    let mut visible: HashMap<u64, Vec<Interval>> = HashMap::new();

    for import in imports {
        let mut chan_masks: HashMap<String, Vec<bool>> = import
            .channels
            .iter()
            .map(|(name, ch)| (name.clone(), vec![!has_any_show; ch.len()]))
            .collect();

        // Reverse order: lowest precedence first, so index 0 lands last.
        for filter in enabled.iter().rev() {
            let Some(abs_intervals) = unified.get(&filter.name) else { continue };
            let local = intervals::shift(abs_intervals, -import.offset);
            for (name, ch) in &import.channels {
                let Some(mask) = chan_masks.get_mut(name) else { continue };
                let member = intervals::membership(&local, &ch.times);
                match filter.mode {
                    FilterMode::Show => {
                        for (m, inside) in mask.iter_mut().zip(&member) {
                            *m |= inside;
                        }
                    }
                    FilterMode::Hide => {
                        for (m, inside) in mask.iter_mut().zip(&member) {
                            *m &= !inside;
                        }
                    }
                }
            }
        }

        if let Some(reference) = import.reference_channel() {
            if let (Some(mask), Some(ch)) = (chan_masks.get(reference), import.channel(reference))
            {
                visible.insert(import.id, intervals::true_runs(mask, &ch.times));
            }
        }
        masks.insert(import.id, chan_masks);
    }
    (masks, visible)
}

/// Full, blocking recomputation: materialize math channels, match and unify
/// every enabled filter, compose all masks. Always runs from scratch; a newer
/// mutation simply triggers a fresh recompute afterwards.
pub fn recompute(cfg: &EngineConfig, imports: &mut [Import]) -> VisibilityResult {
    math::apply(&cfg.math_channels, imports);
    let mut unified: HashMap<String, Vec<Interval>> = HashMap::new();
    for name in &cfg.filter_order {
        let Some(filter) = cfg.filters.get(name) else {
            log::warn!("filter order references unknown filter '{name}'");
            continue;
        };
        if !filter.enabled {
            continue;
        }
        unified.insert(name.clone(), unify(filter, imports));
    }
    let (masks, visible_intervals) = compose(cfg, &unified, imports);
    VisibilityResult { masks, visible_intervals, unified }
}

/// Thin stateful wrapper around [`recompute`]: owns nothing but the last
/// computed result, which is fully replaced on every call. Single-writer,
/// single-reader; callers needing concurrency wrap it in their own lock.
#[derive(Debug, Default)]
pub struct FilterEngine {
    last: VisibilityResult,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recompute(&mut self, cfg: &EngineConfig, imports: &mut [Import]) -> &VisibilityResult {
        self.last = recompute(cfg, imports);
        &self.last
    }

    /// The result of the most recent recompute.
    pub fn last(&self) -> &VisibilityResult {
        &self.last
    }
}

/// The samples of one channel that survive its visibility mask, as parallel
/// `(x, y)` arrays in local time. `None` when the channel or its mask is
/// unknown; the caller then draws the unfiltered series.
pub fn filtered_series(
    import: &Import,
    channel: &str,
    result: &VisibilityResult,
) -> Option<(Vec<f64>, Vec<f64>)> {
    let ch = import.channel(channel)?;
    let mask = result.masks.get(&import.id)?.get(channel)?;
    Some(
        ch.times
            .iter()
            .zip(&ch.values)
            .zip(mask)
            .filter(|(_, &keep)| keep)
            .map(|((&t, &v), _)| (t, v))
            .unzip(),
    )
}
