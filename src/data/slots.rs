//! The five-slot input scheme shared by math channels and filters.
//!
//! An expression sees up to five named inputs `x1..x5`. `x1` is mandatory and
//! its channel's timestamps become the evaluation time base; the other slots
//! are aligned onto that base, and unbound slots read as all zeros.

use serde::{Deserialize, Serialize};

use crate::align::{resample_nearest, zero_fill};
use crate::data::channel::Import;
use crate::error::EngineError;

/// Channel bindings for the expression inputs `x1..x5`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBindings {
    /// Mandatory input; its timestamps are the time base.
    pub x1: String,
    pub x2: Option<String>,
    pub x3: Option<String>,
    pub x4: Option<String>,
    pub x5: Option<String>,
}

impl SlotBindings {
    /// Bind only the mandatory slot.
    pub fn single<S: Into<String>>(x1: S) -> Self {
        Self { x1: x1.into(), ..Default::default() }
    }

    /// The optional slots with their names, bound or not.
    pub fn optional(&self) -> [(&'static str, Option<&String>); 4] {
        [
            ("x2", self.x2.as_ref()),
            ("x3", self.x3.as_ref()),
            ("x4", self.x4.as_ref()),
            ("x5", self.x5.as_ref()),
        ]
    }

    /// Slot names currently bound to a channel.
    pub fn bound_names(&self) -> Vec<&'static str> {
        let mut out = vec!["x1"];
        for (slot, bound) in self.optional() {
            if bound.is_some() {
                out.push(slot);
            }
        }
        out
    }
}

/// Resolve every slot against `import`, aligning bound channels onto `t_ref`
/// and filling unbound slots with zeros. `x1` is assumed present (callers
/// check it first to decide their skip semantics); a bound optional slot
/// naming a channel the import does not carry is a configuration error.
pub fn bind_slots(
    slots: &SlotBindings,
    import: &Import,
    t_ref: &[f64],
) -> Result<Vec<(&'static str, Vec<f64>)>, EngineError> {
    let mut out = Vec::with_capacity(5);
    match import.channel(&slots.x1) {
        Some(base) => out.push(("x1", base.values.clone())),
        None => {
            return Err(EngineError::Configuration(format!(
                "mandatory input x1 ('{}') is missing from import '{}'",
                slots.x1, import.name
            )))
        }
    }
    for (slot, bound) in slots.optional() {
        match bound {
            None => out.push((slot, zero_fill(t_ref.len()))),
            Some(channel) => match import.channel(channel) {
                Some(ch) => out.push((slot, resample_nearest(t_ref, &ch.times, &ch.values))),
                None => {
                    return Err(EngineError::Configuration(format!(
                        "slot {slot} references channel '{channel}' absent from import '{}'",
                        import.name
                    )))
                }
            },
        }
    }
    Ok(out)
}
