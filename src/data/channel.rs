//! Imports and channels: the loaded data model.

use std::cmp::Ordering;
use std::collections::HashMap;

/// A named time series: parallel `times`/`values` arrays, sorted ascending by
/// timestamp at construction. Duplicate timestamps are allowed; the load-time
/// sort is stable, so the first occurrence stays first.
#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
    /// Unit label, e.g. "rpm" or "°C". Display only.
    pub unit: String,
    /// Computed by the math-channel engine; recomputed, never hand-edited.
    pub derived: bool,
    /// Per-channel display toggle (persisted with saved views).
    pub visible: bool,
}

impl Channel {
    /// Build from raw `[t, v]` samples, sorting by timestamp.
    pub fn from_samples(mut samples: Vec<[f64; 2]>) -> Self {
        samples.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap_or(Ordering::Equal));
        Self {
            times: samples.iter().map(|p| p[0]).collect(),
            values: samples.iter().map(|p| p[1]).collect(),
            unit: String::new(),
            derived: false,
            visible: true,
        }
    }

    /// Build from already-sorted parallel arrays.
    pub fn from_parts(times: Vec<f64>, values: Vec<f64>) -> Self {
        debug_assert_eq!(times.len(), values.len());
        debug_assert!(times.windows(2).all(|w| w[0] <= w[1]));
        Self { times, values, unit: String::new(), derived: false, visible: true }
    }

    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = unit.into();
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// One loaded data source: its channel set plus display metadata and the
/// time offset mapping local sample time to absolute/display time.
#[derive(Debug, Clone, Default)]
pub struct Import {
    pub id: u64,
    /// Display label, typically the source file stem.
    pub name: String,
    /// Display color hint (RGB).
    pub color: [u8; 3],
    /// Seconds added to local sample times to get absolute/display time.
    /// 0 for the base import; mutated by the user's sync action.
    pub offset: f64,
    pub channels: HashMap<String, Channel>,
    /// Channel names in load order, for stable listings and the
    /// reference-channel pick.
    pub channel_order: Vec<String>,
}

impl Import {
    pub fn new<S: Into<String>>(id: u64, name: S) -> Self {
        Self {
            id,
            name: name.into(),
            color: default_color(id as usize),
            offset: 0.0,
            channels: HashMap::new(),
            channel_order: Vec::new(),
        }
    }

    /// Insert or replace a channel, keeping `channel_order` in sync.
    pub fn insert_channel<S: Into<String>>(&mut self, name: S, channel: Channel) {
        let name = name.into();
        if !self.channels.contains_key(&name) {
            self.channel_order.push(name.clone());
        }
        self.channels.insert(name, channel);
    }

    pub fn remove_channel(&mut self, name: &str) {
        self.channels.remove(name);
        self.channel_order.retain(|n| n != name);
    }

    #[inline]
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    #[inline]
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// The channel whose mask yields this import's visible interval set:
    /// the first loaded channel unless the caller names another.
    pub fn reference_channel(&self) -> Option<&str> {
        self.channel_order.first().map(|s| s.as_str())
    }
}

/// Default display color for the n-th loaded import.
pub fn default_color(idx: usize) -> [u8; 3] {
    let palette = [
        [0x3b, 0x82, 0xf6],
        [0x10, 0xb9, 0x81],
        [0xf5, 0x93, 0x00],
        [0xef, 0x44, 0x44],
        [0x8b, 0x5c, 0xff],
    ];
    palette[idx % palette.len()]
}
