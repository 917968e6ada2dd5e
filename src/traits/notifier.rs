//! UserNotifier trait
//!
//! Reports failed parameter changes to whoever is operating the microscope.

use crate::protocol::MessageError;

/// Receives one notification per rejected parameter change.
///
/// Implementations should present every error in a single dialog (or log
/// record); the first error is the one that triggered the rollback.
pub trait UserNotifier: Send {
    /// Called once per failed `new parameters` dispatch, before rollback.
    fn parameters_rejected(&self, errors: &[MessageError]);
}

/// Default notifier: writes the rejection as a warning event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl UserNotifier for TracingNotifier {
    fn parameters_rejected(&self, errors: &[MessageError]) {
        let first = errors.first();
        tracing::warn!(
            source = first.map(|e| e.source.as_str()).unwrap_or_default(),
            error_count = errors.len(),
            "{}",
            rejection_text(errors)
        );
    }
}

/// Dialog text naming each offending module and its message.
pub fn rejection_text(errors: &[MessageError]) -> String {
    let mut text = String::from("New Parameters:\n\n");
    for error in errors {
        text.push_str(&format!(
            "Got an error from '{}' of type '{}'!\n\n",
            error.source, error.message
        ));
    }
    text.push_str("Attempting to revert to the last known good parameters.");
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_names_every_source() {
        let errors = vec![
            MessageError::new("mosaic", "unknown objective"),
            MessageError::new("stage", "not homed"),
        ];
        let text = rejection_text(&errors);
        assert!(text.starts_with("New Parameters:"));
        assert!(text.find("'mosaic'").unwrap() < text.find("'stage'").unwrap());
        assert!(text.ends_with("last known good parameters."));
    }

    #[test]
    #[tracing_test::traced_test]
    fn tracing_notifier_logs_first_source() {
        TracingNotifier.parameters_rejected(&[MessageError::new("mosaic", "unknown objective")]);
        assert!(logs_contain("unknown objective"));
    }
}
