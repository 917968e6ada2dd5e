//! Settings module: the hub-facing side of the parameter coordinator.
//!
//! Owns the [`SettingsCoordinator`] and translates between it and the
//! message protocol. Payloads the coordinator asks for are sent from this
//! module, so the hub hands their dispatch reports back here and the
//! coordinator can fold them.

pub mod coordinator;
pub mod library;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use coordinator::SettingsCoordinator;
pub use library::ParameterLibrary;

use crate::config::SettingsConfig;
use crate::error::{AppResult, HalError};
use crate::modules::{HalModule, ModuleContext, UiAction, UiReply};
use crate::parameters::ParameterSet;
use crate::protocol::{DispatchReport, HalMessage, Payload, ResponseData};
use crate::traits::{ParameterEditor, UserNotifier};

/// Name the settings module registers under.
pub const SETTINGS_MODULE: &str = "settings";

/// Hub-facing wrapper around the [`SettingsCoordinator`].
pub struct Settings {
    name: String,
    directory: PathBuf,
    coordinator: SettingsCoordinator,
}

impl Settings {
    /// Settings module whose library starts with `default` as set 0.
    pub fn new(default: ParameterSet) -> Self {
        Self {
            name: SETTINGS_MODULE.to_string(),
            directory: PathBuf::from("."),
            coordinator: SettingsCoordinator::new(ParameterLibrary::new(default)),
        }
    }

    /// Build from configuration, loading the default file and any extra
    /// parameter files into the library. A missing default file starts from
    /// an empty default set.
    pub fn from_config(config: &SettingsConfig) -> AppResult<Self> {
        let default_path = config.directory.join(&config.default_file);
        let default = match ParameterSet::load(&default_path) {
            Ok(set) => set,
            Err(HalError::ParametersFileNotFound(path)) => {
                warn!(%path, "default parameters file not found, starting empty");
                ParameterSet::new("default")
            }
            Err(err) => return Err(err),
        };

        let mut settings = Self::new(default).with_directory(&config.directory);
        for file in &config.files {
            let set = ParameterSet::load(settings.resolve(file))?;
            let index = settings.add_parameters(set);
            info!(file = %file.display(), index, "added parameters file");
        }
        Ok(settings)
    }

    /// Directory relative parameter file names are looked up in.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Replace how rejected changes are reported to the user.
    pub fn with_notifier(mut self, notifier: Box<dyn UserNotifier>) -> Self {
        self.coordinator = self.coordinator.with_notifier(notifier);
        self
    }

    /// Attach an editor view that follows committed edits.
    pub fn attach_editor(&mut self, editor: Box<dyn ParameterEditor>) {
        self.coordinator.attach_editor(editor);
    }

    /// Add a set to the library without selecting it.
    pub fn add_parameters(&mut self, set: ParameterSet) -> usize {
        self.coordinator.library_mut().add(set)
    }

    /// The coordinator, for inspecting state.
    pub fn coordinator(&self) -> &SettingsCoordinator {
        &self.coordinator
    }

    /// The parameters directory wins for relative names that exist there.
    fn resolve(&self, filename: &Path) -> PathBuf {
        if filename.is_relative() {
            let candidate = self.directory.join(filename);
            if candidate.exists() {
                return candidate;
            }
        }
        filename.to_path_buf()
    }

    fn send_all(ctx: &mut ModuleContext, payloads: Vec<Payload>) {
        for payload in payloads {
            ctx.send(payload);
        }
    }

    fn new_parameters_file(
        &mut self,
        filename: &Path,
        is_default: bool,
        ctx: &mut ModuleContext,
    ) -> AppResult<()> {
        if !self.coordinator.ui_enabled() {
            return Err(HalError::ParametersFileUnavailable);
        }
        let set = ParameterSet::load(self.resolve(filename))?;
        if is_default {
            info!(name = %set.name(), "replacing default parameters");
            self.coordinator.library_mut().replace_default(set);
            if self.coordinator.library().current_index() != 0 {
                return Ok(());
            }
            // The record itself was replaced. Reconcile every module with it
            // as an edit, leaving the previous selection alone.
            let current = self.coordinator.parameters_of_record().clone();
            let payloads = self.coordinator.request_parameter_change(&current, true)?;
            Self::send_all(ctx, payloads);
            return Ok(());
        }
        let index = self.coordinator.library_mut().add(set);
        let payloads = self.coordinator.switch_to(&index.into())?;
        Self::send_all(ctx, payloads);
        Ok(())
    }
}

#[async_trait]
impl HalModule for Settings {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_message(&mut self, message: &HalMessage, ctx: &mut ModuleContext) -> AppResult<()> {
        match message.payload() {
            Payload::Configure2 => {
                // Broadcast the default set so every module adopts stored values.
                self.coordinator.library_mut().mark_current_initialized();
                let current = self.coordinator.parameters_of_record().clone();
                let payloads = self.coordinator.request_parameter_change(&current, false)?;
                Self::send_all(ctx, payloads);
            }
            Payload::GetParameters { selector } => {
                let set = self.coordinator.library().get(selector)?.clone();
                ctx.respond(ResponseData::Parameters(set));
            }
            Payload::InitialParameters { parameters } => {
                self.coordinator.absorb_initial(message.source(), parameters);
            }
            Payload::NewParametersFile {
                filename,
                is_default,
            } => self.new_parameters_file(filename, *is_default, ctx)?,
            Payload::SetParameters { selector } => {
                let payloads = self.coordinator.switch_to(selector)?;
                Self::send_all(ctx, payloads);
            }
            Payload::StartFilm => self.coordinator.set_filming(true),
            Payload::StopFilm => self.coordinator.set_filming(false),
            _ => {}
        }
        Ok(())
    }

    async fn handle_responses(&mut self, report: &DispatchReport, ctx: &mut ModuleContext) -> AppResult<()> {
        let payloads = self.coordinator.on_dispatch_complete(report);
        Self::send_all(ctx, payloads);
        Ok(())
    }

    async fn handle_ui(&mut self, action: UiAction, ctx: &mut ModuleContext) -> AppResult<UiReply> {
        match action {
            UiAction::EditParameters(parameters) => {
                if !self.coordinator.ui_enabled() {
                    return Err(HalError::LockedOut("edit parameters".into()));
                }
                let payloads = self.coordinator.request_parameter_change(&parameters, true)?;
                Self::send_all(ctx, payloads);
                Ok(UiReply::Done)
            }
            UiAction::SelectParameters(selector) => {
                if !self.coordinator.ui_enabled() {
                    return Err(HalError::LockedOut("select parameters".into()));
                }
                let payloads = self.coordinator.switch_to(&selector)?;
                Self::send_all(ctx, payloads);
                Ok(UiReply::Done)
            }
            UiAction::SaveParameters(path) => {
                self.coordinator.parameters_of_record().save(&path)?;
                info!(path = %path.display(), "saved parameters");
                Ok(UiReply::Done)
            }
            UiAction::CurrentParameters => Ok(UiReply::Parameters(
                self.coordinator.parameters_of_record().clone(),
            )),
            UiAction::ListParameters => Ok(UiReply::Names(self.coordinator.library().names())),
            other => Err(HalError::UnsupportedAction {
                module: self.name.clone(),
                action: other.name().to_string(),
            }),
        }
    }
}
