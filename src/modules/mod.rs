//! Module system: independently addressable units connected by the hub.
//!
//! This module defines the [`HalModule`] trait that every participant in the
//! message protocol implements, the [`ModuleContext`] a module writes its
//! outcome into while handling a message, and the [`ModuleRegistry`] that
//! builds modules from configuration.
//!
//! # Design Philosophy
//!
//! - **Owned state**: each module keeps its own copy of the parameters it
//!   cares about. Nothing is shared; modules learn about changes only from
//!   messages.
//! - **Errors are data**: a module that cannot accept a message returns
//!   `Err`. The hub turns that into a [`MessageError`] on the message instead
//!   of letting it escape the broadcast.
//! - **Collect then fold**: responses, errors and new messages are collected
//!   per module in a [`ModuleContext`]; the hub folds them into one
//!   [`DispatchReport`].
//!
//! # Lifecycle
//!
//! ```text
//! register ──> configure1 ──> configure2 ──> (new parameters / updated parameters / film ...)*
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use storm_hal::error::AppResult;
//! use storm_hal::modules::{HalModule, ModuleContext};
//! use storm_hal::protocol::{HalMessage, Payload};
//!
//! struct Shutter {
//!     open: bool,
//! }
//!
//! #[async_trait]
//! impl HalModule for Shutter {
//!     fn name(&self) -> &str {
//!         "shutter"
//!     }
//!
//!     async fn process_message(
//!         &mut self,
//!         message: &HalMessage,
//!         _ctx: &mut ModuleContext,
//!     ) -> AppResult<()> {
//!         match message.payload() {
//!             Payload::StartFilm => self.open = true,
//!             Payload::StopFilm => self.open = false,
//!             _ => {}
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{AppResult, HalError};
use crate::parameters::ParameterSet;
use crate::protocol::{
    DispatchReport, HalMessage, MessageError, Payload, Response, ResponseData, SetSelector,
};

pub mod display;
pub mod mosaic;
pub mod stage;

pub use display::Display;
pub use mosaic::Mosaic;
pub use stage::Stage;

/// Requests coming from a user interface rather than from another module.
#[derive(Clone, Debug)]
pub enum UiAction {
    /// Submit an edited copy of the current parameters.
    EditParameters(ParameterSet),
    /// Make another named set current.
    SelectParameters(SetSelector),
    /// Write the current set's saved entries to a file.
    SaveParameters(PathBuf),
    /// Return the current set.
    CurrentParameters,
    /// Return the names of all known sets.
    ListParameters,
    /// Close a viewer window; the next request for its kind reopens it.
    HideViewer(String),
}

impl UiAction {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            UiAction::EditParameters(_) => "edit parameters",
            UiAction::SelectParameters(_) => "select parameters",
            UiAction::SaveParameters(_) => "save parameters",
            UiAction::CurrentParameters => "current parameters",
            UiAction::ListParameters => "list parameters",
            UiAction::HideViewer(_) => "hide viewer",
        }
    }
}

/// Result of a [`UiAction`].
#[derive(Clone, Debug, PartialEq)]
pub enum UiReply {
    /// The action was carried out.
    Done,
    /// A parameter set, for queries.
    Parameters(ParameterSet),
    /// Parameter set names, in library order.
    Names(Vec<String>),
}

/// Collects what one module produced while handling one message.
#[derive(Debug)]
pub struct ModuleContext {
    module: String,
    responses: Vec<Response>,
    errors: Vec<MessageError>,
    outgoing: Vec<HalMessage>,
}

impl ModuleContext {
    /// Empty context for `module`.
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            responses: Vec::new(),
            errors: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    /// Module the context collects for.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Respond under this module's name.
    pub fn respond(&mut self, data: ResponseData) {
        let source = self.module.clone();
        self.respond_as(source, data);
    }

    /// Respond under a sub-name, e.g. one of several viewers.
    pub fn respond_as(&mut self, source: impl Into<String>, data: ResponseData) {
        self.responses.push(Response::new(source, data));
    }

    /// Attach an error to the message being handled.
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors
            .push(MessageError::new(self.module.clone(), message));
    }

    /// Record a returned error, without repeating the module name.
    pub fn fail(&mut self, err: HalError) {
        let message = match err {
            HalError::Module { message, .. } => message,
            other => other.to_string(),
        };
        self.error(message);
    }

    /// Queue a new message from this module.
    pub fn send(&mut self, payload: Payload) {
        self.outgoing
            .push(HalMessage::new(self.module.clone(), payload));
    }

    /// Responses added so far.
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    /// Errors added so far.
    pub fn errors(&self) -> &[MessageError] {
        &self.errors
    }

    /// Messages queued so far.
    pub fn outgoing(&self) -> &[HalMessage] {
        &self.outgoing
    }

    pub(crate) fn into_parts(self) -> (Vec<Response>, Vec<MessageError>, Vec<HalMessage>) {
        (self.responses, self.errors, self.outgoing)
    }
}

/// A unit that receives broadcasts and may emit messages of its own.
#[async_trait]
pub trait HalModule: Send {
    /// Unique name, used as the message source and for routing responses.
    fn name(&self) -> &str;

    /// Handle one broadcast message.
    ///
    /// Called exactly once per message. Returning `Err` records an error
    /// on the message; responses already added to `ctx` are kept.
    async fn process_message(
        &mut self,
        message: &HalMessage,
        ctx: &mut ModuleContext,
    ) -> AppResult<()>;

    /// Called once a message sent by this module has reached every module.
    async fn handle_responses(
        &mut self,
        _report: &DispatchReport,
        _ctx: &mut ModuleContext,
    ) -> AppResult<()> {
        Ok(())
    }

    /// Handle a user interface request addressed to this module.
    async fn handle_ui(&mut self, action: UiAction, _ctx: &mut ModuleContext) -> AppResult<UiReply> {
        Err(HalError::UnsupportedAction {
            module: self.name().to_string(),
            action: action.name().to_string(),
        })
    }
}

/// Answer a `new parameters` broadcast for one responder.
///
/// Responds with the old parameters first, so a failed update still leaves a
/// known-good value on the message, then applies `incoming` and responds
/// with the result.
pub fn respond_with_update(
    ctx: &mut ModuleContext,
    responder: &str,
    current: &mut ParameterSet,
    incoming: Option<&ParameterSet>,
) -> AppResult<Vec<String>> {
    ctx.respond_as(responder, ResponseData::OldParameters(current.clone()));
    let changed = match incoming {
        Some(incoming) => current.update_from(incoming).map_err(|err| {
            HalError::module(responder, format!("rejected new parameters: {err}"))
        })?,
        None => Vec::new(),
    };
    ctx.respond_as(responder, ResponseData::NewParameters(current.clone()));
    Ok(changed)
}

type ModuleFactory = Box<dyn Fn(String, ParameterSet) -> Box<dyn HalModule> + Send + Sync>;

/// Registry for module factory functions.
///
/// Enables runtime module creation from configuration without hardcoding
/// module types.
///
/// # Examples
///
/// ```rust
/// use storm_hal::modules::ModuleRegistry;
/// use storm_hal::parameters::ParameterSet;
///
/// let registry = ModuleRegistry::with_builtin();
/// let module = registry
///     .create("mosaic", "mosaic".to_string(), ParameterSet::new("mosaic"))
///     .unwrap();
/// assert_eq!(module.name(), "mosaic");
/// ```
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// Creates a new empty module registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry preloaded with the display, mosaic and stage modules.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("display", |name, params| Box::new(Display::new(name, &params)));
        registry.register("mosaic", |name, params| Box::new(Mosaic::new(name, &params)));
        registry.register("stage", |name, params| Box::new(Stage::new(name, &params)));
        registry
    }

    /// Registers a module factory function.
    ///
    /// # Arguments
    ///
    /// * `module_type` - Type identifier used in configuration (e.g., "mosaic")
    /// * `factory` - Builds a module from its name and initial parameters
    pub fn register<F>(&mut self, module_type: &str, factory: F)
    where
        F: Fn(String, ParameterSet) -> Box<dyn HalModule> + Send + Sync + 'static,
    {
        self.factories
            .insert(module_type.to_string(), Box::new(factory));
    }

    /// Creates a module instance from a registered type.
    pub fn create(
        &self,
        module_type: &str,
        name: String,
        parameters: ParameterSet,
    ) -> AppResult<Box<dyn HalModule>> {
        let factory = self
            .factories
            .get(module_type)
            .ok_or_else(|| HalError::UnknownModuleType(module_type.to_string()))?;
        Ok(factory(name, parameters))
    }

    /// Lists all registered module types
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{Parameter, ParameterValue};

    #[test]
    fn test_module_registry() {
        let registry = ModuleRegistry::with_builtin();
        assert_eq!(registry.list_types(), vec!["display", "mosaic", "stage"]);

        let module = registry
            .create("stage", "stage".to_string(), ParameterSet::new("stage"))
            .unwrap();
        assert_eq!(module.name(), "stage");

        // Unknown type should error
        assert!(matches!(
            registry.create("laser", "l".to_string(), ParameterSet::new("l")),
            Err(HalError::UnknownModuleType(_))
        ));
    }

    #[test]
    fn context_fail_strips_module_prefix() {
        let mut ctx = ModuleContext::new("mosaic");
        ctx.fail(HalError::module("mosaic", "unknown objective"));
        ctx.fail(HalError::ParametersFileUnavailable);
        assert_eq!(ctx.errors()[0].message, "unknown objective");
        assert_eq!(ctx.errors()[0].source, "mosaic");
        assert!(ctx.errors()[1].message.contains("editing / filming"));
    }

    #[test]
    fn update_responds_old_even_on_failure() {
        let mut current = ParameterSet::new("stage");
        current.add("velocity", Parameter::new(1.0).with_range(0.0, 2.0));

        let mut bad = ParameterSet::new("incoming");
        bad.add("velocity", Parameter::new(9.0));

        let mut ctx = ModuleContext::new("stage");
        assert!(respond_with_update(&mut ctx, "stage", &mut current, Some(&bad)).is_err());
        assert_eq!(ctx.responses().len(), 1);
        assert!(ctx.responses()[0].old_parameters().is_some());

        let mut good = ParameterSet::new("incoming");
        good.add("velocity", Parameter::new(1.5));
        let mut ctx = ModuleContext::new("stage");
        let changed = respond_with_update(&mut ctx, "stage", &mut current, Some(&good)).unwrap();
        assert_eq!(changed, vec!["velocity"]);
        assert_eq!(
            ctx.responses()[1]
                .new_parameters()
                .and_then(|p| p.get("velocity")),
            Some(&ParameterValue::Float(1.5))
        );
    }

    #[test]
    fn send_uses_module_as_source() {
        let mut ctx = ModuleContext::new("mosaic");
        ctx.send(Payload::PixelSize { pixel_size: 0.16 });
        assert!(ctx.outgoing()[0].source_is("mosaic"));
    }
}
