//! Derived ("math") channels: definitions plus the engine that materializes
//! them into each import's channel set.
//!
//! A definition is global; it is applied independently to every import that
//! carries the mandatory input. Incomplete imports are skipped quietly, and a
//! failing evaluation skips only the import it failed for, so one bad import
//! never blocks the others.

use serde::{Deserialize, Serialize};

use crate::data::channel::{Channel, Import};
use crate::data::slots::{bind_slots, SlotBindings};
use crate::error::{EngineError, ExpressionError};
use crate::expr::{evaluate, EvalContext, Value};

/// Definition of one derived channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MathChannelDef {
    /// Output channel name, unique across the channel set.
    pub name: String,
    /// Formula over the bound slots, e.g. `"(x1 - x2) * 3.6"`.
    pub expression: String,
    pub slots: SlotBindings,
    /// Unit label attached to the output channel.
    pub unit: String,
}

impl MathChannelDef {
    /// Gate for create/edit dialogs: checks the structural fields, then
    /// evaluates the expression against synthetic inputs. A failure blocks
    /// acceptance of the definition; nothing is mutated either way.
    pub fn validate(&self) -> Result<String, EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation { reason: "channel name must not be empty".into() });
        }
        structural_check(&self.slots)?;
        validate_expression(&self.expression, &self.slots)
    }
}

pub(crate) fn structural_check(slots: &SlotBindings) -> Result<(), EngineError> {
    if slots.x1.trim().is_empty() {
        return Err(EngineError::Validation {
            reason: "mandatory input x1 is not assigned".into(),
        });
    }
    Ok(())
}

/// Evaluate `expression` against synthetic test inputs: a ramp `1..5` on
/// every bound slot, zeros elsewhere, timestamps `0..4` s. Returns a
/// human-readable preview of the evaluated output on success. This is the
/// same evaluator used at apply time, so validation and apply semantics
/// cannot diverge.
pub fn validate_expression(
    expression: &str,
    slots: &SlotBindings,
) -> Result<String, EngineError> {
    let times = [0.0, 1.0, 2.0, 3.0, 4.0];
    let ramp = [1.0, 2.0, 3.0, 4.0, 5.0];
    let zeros = [0.0; 5];
    let bound = slots.bound_names();
    let mut ctx = EvalContext::new(&times);
    for slot in ["x1", "x2", "x3", "x4", "x5"] {
        let values: &[f64] = if bound.contains(&slot) { &ramp } else { &zeros };
        ctx = ctx.bind(slot, values);
    }
    match evaluate(expression, &ctx) {
        Ok(value) => Ok(preview(&value)),
        Err(e) => Err(EngineError::Validation { reason: e.0 }),
    }
}

/// Compact human-readable summary of an evaluation result, for the
/// create/edit dialog.
fn preview(value: &Value) -> String {
    match value {
        Value::Scalar(s) => format!("= {s}"),
        Value::Array(a) => {
            let shown: Vec<String> = a.iter().take(5).map(|v| format!("{v:.4}")).collect();
            if a.len() > 5 {
                format!("= [{}, …] ({} samples)", shown.join(", "), a.len())
            } else {
                format!("= [{}]", shown.join(", "))
            }
        }
    }
}

/// Materialize every definition into every import that does not yet have the
/// output channel. Imports lacking the mandatory input are skipped at debug
/// level; per-import evaluation failures are logged and skipped so all other
/// imports and definitions still get their channels.
pub fn apply(defs: &[MathChannelDef], imports: &mut [Import]) {
    for def in defs {
        for import in imports.iter_mut() {
            if import.has_channel(&def.name) {
                continue;
            }
            match derive_for_import(def, import) {
                Ok(Some(channel)) => import.insert_channel(def.name.clone(), channel),
                Ok(None) => log::debug!(
                    "math channel '{}': import '{}' lacks input '{}', skipped",
                    def.name,
                    import.name,
                    def.slots.x1
                ),
                Err(e) => log::warn!("math channel '{}' skipped: {}", def.name, e),
            }
        }
    }
}

/// Compute one definition for one import. `Ok(None)` means the mandatory
/// input is absent (incompleteness, not an error).
fn derive_for_import(
    def: &MathChannelDef,
    import: &Import,
) -> Result<Option<Channel>, EngineError> {
    let base = match import.channel(&def.slots.x1) {
        Some(c) => c,
        None => return Ok(None),
    };
    let t_ref = base.times.clone();
    let bound = bind_slots(&def.slots, import, &t_ref)?;
    let mut ctx = EvalContext::new(&t_ref);
    for (slot, values) in &bound {
        ctx = ctx.bind(slot, values);
    }
    let apply_err = |e: ExpressionError| EngineError::Apply { import: import.id, source: e };
    let value = evaluate(&def.expression, &ctx).map_err(apply_err)?;
    // Scalar results broadcast to the full time base.
    let values = value.into_array(t_ref.len()).map_err(apply_err)?;
    let mut channel = Channel::from_parts(t_ref, values).with_unit(def.unit.clone());
    channel.derived = true;
    Ok(Some(channel))
}
