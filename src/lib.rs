//! diagscope crate root: re-exports and module wiring.
//!
//! This crate is the data engine of a diagnostic time-series viewer for
//! vehicle sensor logs. It owns the algorithmic core shared by the UI shells:
//! - `align`: nearest-neighbor resampling of channels onto a common time base
//! - `expr`: sandboxed expression evaluation over channel arrays
//! - `data`: imports, channels, math-channel and filter definitions
//! - `intervals`: buffered interval merging and membership tests
//! - `engine`: cross-import synchronization and precedence mask composition
//! - `persistence`: serializable saved-view records
//!
//! Rendering, file dialogs and widget wiring live in the UI shells; they feed
//! imports and definitions in and take visibility masks and interval sets out.

pub mod align;
pub mod data;
pub mod engine;
pub mod error;
pub mod expr;
pub mod intervals;
pub mod persistence;

// Public re-exports for a compact external API
pub use data::channel::{Channel, Import};
pub use data::filters::{FilterDef, FilterMatch, FilterMode};
pub use data::math::MathChannelDef;
pub use data::slots::SlotBindings;
pub use engine::{EngineConfig, FilterEngine, VisibilityResult};
pub use error::{EngineError, ExpressionError};
