//! Commit / rollback state machine for parameter changes.
//!
//! The coordinator owns the parameters of record and decides, once a
//! `new parameters` broadcast has reached every module, whether to commit the
//! modules' responses or to roll back. It does not talk to the hub directly:
//! every operation returns the payloads to broadcast next, in order, and the
//! settings module sends them.
//!
//! # Change cycle
//!
//! ```text
//! request_parameter_change ──> [settings lockout: true] + new parameters
//!                                         │
//!                      on_dispatch_complete(report)
//!                     ┌───────────────────┴──────────────────┐
//!                 no errors                                errors
//!                     │                                       │
//!     commit responses, mark initialized        notify user, then
//!     ──> updated parameters                     is_edit: restore old values ──> new parameters (edit)
//!                     │                          switch:  revert selection   ──> new parameters
//!      on_dispatch_complete(updated)             rollback already failed     ──> give up, unlock
//!                     │
//!     unlock, enable UI ──> settings lockout: false
//! ```

use tracing::{debug, info, instrument, warn};

use super::library::ParameterLibrary;
use crate::error::{AppResult, HalError};
use crate::parameters::ParameterSet;
use crate::protocol::{DispatchReport, Payload, SetSelector};
use crate::traits::{ParameterEditor, TracingNotifier, UserNotifier};

/// Owns the parameters of record and runs the change cycle.
pub struct SettingsCoordinator {
    library: ParameterLibrary,
    locked_out: bool,
    rolling_back: bool,
    filming: bool,
    editor: Option<Box<dyn ParameterEditor>>,
    notifier: Box<dyn UserNotifier>,
}

impl SettingsCoordinator {
    /// Coordinator over `library`, reporting rejections through tracing.
    pub fn new(library: ParameterLibrary) -> Self {
        Self {
            library,
            locked_out: false,
            rolling_back: false,
            filming: false,
            editor: None,
            notifier: Box::new(TracingNotifier),
        }
    }

    /// Replace the user notifier.
    pub fn with_notifier(mut self, notifier: Box<dyn UserNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Refresh `editor` with the committed set after every successful edit.
    pub fn attach_editor(&mut self, editor: Box<dyn ParameterEditor>) {
        self.editor = Some(editor);
    }

    /// The parameter sets known to the coordinator.
    pub fn library(&self) -> &ParameterLibrary {
        &self.library
    }

    /// Mutable access for adding or replacing sets.
    pub fn library_mut(&mut self) -> &mut ParameterLibrary {
        &mut self.library
    }

    /// The current set, one section per module.
    pub fn parameters_of_record(&self) -> &ParameterSet {
        self.library.current()
    }

    /// True while a change is being dispatched.
    pub fn is_locked_out(&self) -> bool {
        self.locked_out
    }

    /// Whether user edits and selections are currently accepted.
    pub fn ui_enabled(&self) -> bool {
        self.library.is_enabled()
    }

    /// Start a change to `parameters`.
    ///
    /// Fails without broadcasting anything while another change is in flight.
    pub fn request_parameter_change(
        &mut self,
        parameters: &ParameterSet,
        is_edit: bool,
    ) -> AppResult<Vec<Payload>> {
        if self.locked_out {
            return Err(HalError::LockedOut("new parameters".into()));
        }
        Ok(self.begin_change(parameters, is_edit))
    }

    /// Make another library set current and broadcast it.
    ///
    /// Selecting the set that is already current broadcasts nothing.
    pub fn switch_to(&mut self, selector: &SetSelector) -> AppResult<Vec<Payload>> {
        if self.locked_out {
            return Err(HalError::LockedOut("set parameters".into()));
        }
        let index = self.library.position(selector)?;
        if !self.library.select(index) {
            debug!(%selector, "parameters already current");
            return Ok(Vec::new());
        }
        let parameters = self.library.current().clone();
        info!(name = %parameters.name(), "switching parameters");
        Ok(self.begin_change(&parameters, false))
    }

    fn begin_change(&mut self, parameters: &ParameterSet, is_edit: bool) -> Vec<Payload> {
        let mut out = Vec::with_capacity(2);
        if !self.locked_out {
            self.locked_out = true;
            out.push(Payload::SettingsLockout { locked_out: true });
        }
        self.library.set_enabled(false);
        out.push(Payload::NewParameters {
            parameters: parameters.clone(),
            is_edit,
        });
        out
    }

    /// Fold the outcome of a broadcast this coordinator started.
    pub fn on_dispatch_complete(&mut self, report: &DispatchReport) -> Vec<Payload> {
        match report.payload() {
            Payload::NewParameters { is_edit, .. } if report.has_errors() => {
                self.roll_back(report, *is_edit)
            }
            Payload::NewParameters { is_edit, .. } => self.commit(report, *is_edit),
            Payload::UpdatedParameters { .. } => self.update_complete(),
            _ => Vec::new(),
        }
    }

    #[instrument(skip_all, fields(is_edit = is_edit, errors = report.errors.len()))]
    fn roll_back(&mut self, report: &DispatchReport, is_edit: bool) -> Vec<Payload> {
        self.notifier.parameters_rejected(&report.errors);

        if self.rolling_back {
            warn!("rollback was rejected too, keeping the parameters of record");
            self.rolling_back = false;
            return self.update_complete();
        }

        if is_edit {
            for (source, old) in report.old_parameters() {
                self.library.update_current(source, old.clone());
            }
            let restored = self.library.current().clone();
            self.rolling_back = true;
            return self.begin_change(&restored, true);
        }

        match self.library.revert_selection() {
            Some(_) => {
                let restored = self.library.current().clone();
                info!(name = %restored.name(), "reverting to previous parameters");
                self.rolling_back = true;
                self.begin_change(&restored, false)
            }
            None => {
                warn!("no previous parameters to revert to");
                self.update_complete()
            }
        }
    }

    #[instrument(skip_all, fields(is_edit = is_edit))]
    fn commit(&mut self, report: &DispatchReport, is_edit: bool) -> Vec<Payload> {
        if !is_edit {
            for (source, old) in report.old_parameters() {
                self.library.update_previous(source, old.clone());
            }
        }
        for (source, new) in report.new_parameters() {
            self.library.update_current(source, new.clone());
        }
        if is_edit {
            if let Some(editor) = self.editor.as_mut() {
                editor.update(self.library.current());
            }
        }
        self.library.mark_current_initialized();
        self.rolling_back = false;
        debug!(name = %self.library.current().name(), "parameters committed");

        vec![Payload::UpdatedParameters {
            parameters: self.library.current().clone(),
        }]
    }

    /// Release the lockout once `updated parameters` has reached every module.
    fn update_complete(&mut self) -> Vec<Payload> {
        self.locked_out = false;
        self.library.set_enabled(!self.filming);
        vec![Payload::SettingsLockout { locked_out: false }]
    }

    /// Filming disables the UI; it is re-enabled when filming stops unless a
    /// change is still in flight.
    pub fn set_filming(&mut self, filming: bool) {
        self.filming = filming;
        self.library.set_enabled(!filming && !self.locked_out);
    }

    /// Store a module's starting parameters in the current set.
    ///
    /// Values the current set already holds for that module win, so a
    /// parameters file can override module defaults.
    pub fn absorb_initial(&mut self, module: &str, parameters: &ParameterSet) {
        let mut record = parameters.clone();
        if let Some(from_file) = self.library.current().section(module) {
            if let Err(err) = record.update_from(from_file) {
                warn!(module, error = %err, "ignoring stored parameters");
            }
        }
        self.library.update_current(module, record);
    }
}
