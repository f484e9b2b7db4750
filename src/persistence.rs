//! Saved views: save and load engine configuration to/from JSON files.
//!
//! A saved view records filter and math-channel definitions, the filter
//! precedence order, and per-import display state (offset, color, channel
//! visibility toggles). Computed artifacts (masks, intervals, derived channel
//! data) are never persisted: loading a view re-derives all of them, and
//! recomputing from a reloaded view reproduces bit-identical masks for the
//! same source data.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::channel::Import;
use crate::data::filters::FilterDef;
use crate::data::math::MathChannelDef;
use crate::engine::EngineConfig;

// ---------- Serializable mirror types ----------

/// Serializable display state of one import. Channel data itself reloads
/// from the source file; only what the user can tweak is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStateSerde {
    pub id: u64,
    pub name: String,
    pub color: [u8; 3],
    pub offset: f64,
    /// Channel name → display toggle.
    pub channel_visibility: Vec<(String, bool)>,
}

impl From<&Import> for ImportStateSerde {
    fn from(im: &Import) -> Self {
        Self {
            id: im.id,
            name: im.name.clone(),
            color: im.color,
            offset: im.offset,
            channel_visibility: im
                .channel_order
                .iter()
                .filter_map(|n| im.channels.get(n).map(|c| (n.clone(), c.visible)))
                .collect(),
        }
    }
}

impl ImportStateSerde {
    /// Apply stored display state onto a (re)loaded import. Channels the
    /// import no longer carries are ignored.
    pub fn apply_to(&self, im: &mut Import) {
        im.color = self.color;
        im.offset = self.offset;
        for (name, visible) in &self.channel_visibility {
            if let Some(ch) = im.channels.get_mut(name) {
                ch.visible = *visible;
            }
        }
    }
}

/// One saved view: everything needed to re-derive all masks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedView {
    pub filters: Vec<FilterDef>,
    /// Precedence order (index 0 = highest).
    pub filter_order: Vec<String>,
    pub math_channels: Vec<MathChannelDef>,
    pub imports: Vec<ImportStateSerde>,
}

/// Capture the current configuration and import display state.
pub fn capture_view(cfg: &EngineConfig, imports: &[Import]) -> SavedView {
    SavedView {
        // Stored in precedence order so the JSON is stable and readable.
        filters: cfg
            .filter_order
            .iter()
            .filter_map(|n| cfg.filters.get(n))
            .cloned()
            .collect(),
        filter_order: cfg.filter_order.clone(),
        math_channels: cfg.math_channels.clone(),
        imports: imports.iter().map(ImportStateSerde::from).collect(),
    }
}

impl SavedView {
    /// Rebuild an [`EngineConfig`] and re-apply import display state. The
    /// caller recomputes afterwards; nothing derived is restored directly.
    /// Order entries without a matching filter definition are dropped.
    pub fn apply_to(&self, cfg: &mut EngineConfig, imports: &mut [Import]) {
        cfg.filters = self.filters.iter().map(|f| (f.name.clone(), f.clone())).collect();
        cfg.filter_order = self
            .filter_order
            .iter()
            .filter(|n| cfg.filters.contains_key(n.as_str()))
            .cloned()
            .collect();
        cfg.math_channels = self.math_channels.clone();
        for im in imports.iter_mut() {
            if let Some(state) = self.imports.iter().find(|s| s.id == im.id) {
                state.apply_to(im);
            }
        }
    }
}

// ---------- Public API ----------

/// Serialize a saved view as pretty JSON.
pub fn view_to_json(view: &SavedView) -> Result<String, String> {
    serde_json::to_string_pretty(view).map_err(|e| e.to_string())
}

/// Deserialize a saved view from JSON.
pub fn view_from_json(json: &str) -> Result<SavedView, String> {
    serde_json::from_str(json).map_err(|e| e.to_string())
}

/// Save a view to a JSON file at the given path.
pub fn save_view_to_path(view: &SavedView, path: &Path) -> Result<(), String> {
    let txt = view_to_json(view)?;
    std::fs::write(path, txt).map_err(|e| e.to_string())
}

/// Load a view from a JSON file at the given path.
pub fn load_view_from_path(path: &Path) -> Result<SavedView, String> {
    let txt = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    view_from_json(&txt)
}
