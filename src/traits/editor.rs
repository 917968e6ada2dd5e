//! ParameterEditor trait
//!
//! An editor shows the current parameter set and lets the user submit an
//! edited copy. After an edit is committed the coordinator pushes back the
//! authoritative values, which may differ from what was submitted because
//! modules clamp or adjust what they receive.

use crate::parameters::ParameterSet;

/// A view attached to the settings coordinator.
pub trait ParameterEditor: Send {
    /// Replace the displayed values with the committed set.
    fn update(&mut self, parameters: &ParameterSet);
}
