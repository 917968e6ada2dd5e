//! Seams between the settings coordinator and its surroundings.
//!
//! The coordinator talks to the user and to an optional parameter editor only
//! through these traits, so the protocol can run headless, behind a GUI, or
//! against recording doubles in tests.

pub mod editor;
pub mod notifier;
pub use editor::ParameterEditor;
pub use notifier::{rejection_text, TracingNotifier, UserNotifier};
