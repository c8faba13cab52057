//! Intervention policy modules.
//!
//! The policy maps a classified session and its intervention history to
//! at most one corrective action per tick. Guidance message texts live
//! alongside it.

pub mod guidance;
pub mod intervention;

pub use intervention::InterventionPolicy;
