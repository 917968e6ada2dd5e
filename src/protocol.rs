//! Message catalog exchanged between modules through the hub.
//!
//! Every message is a [`HalMessage`] envelope around a [`Payload`]. The payload
//! enum is closed: each message type has its own variant with typed fields,
//! so a module matches on the variant instead of inspecting a type tag and
//! pulling untyped values out of a data dictionary.
//!
//! # Dispatch outcome
//!
//! Modules never mutate a shared message. While a message is being delivered,
//! each module appends [`Response`]s and [`MessageError`]s to its own
//! [`ModuleContext`](crate::modules::ModuleContext); the hub folds them into a
//! single [`DispatchReport`] once the last module has seen the message and
//! hands that report back to the module that sent it.
//!
//! ```text
//! source ──post──> Hub ──deliver──> module 1 ─┐
//!                      ──deliver──> module 2 ─┼─> DispatchReport ──> source.handle_responses()
//!                      ──deliver──> module N ─┘
//! ```

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::parameters::ParameterSet;

/// Source name used for messages that originate outside any module.
pub const HAL_SOURCE: &str = "hal";

/// Picks a parameter set from the library by position or by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SetSelector {
    /// Position in the library; 0 is the default set.
    Index(usize),
    /// Set name, usually the file stem.
    Name(String),
}

impl fmt::Display for SetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetSelector::Index(i) => write!(f, "#{i}"),
            SetSelector::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for SetSelector {
    fn from(value: usize) -> Self {
        SetSelector::Index(value)
    }
}

impl From<&str> for SetSelector {
    fn from(value: &str) -> Self {
        SetSelector::Name(value.to_string())
    }
}

/// Typed message payloads, one variant per message type.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// First configuration pass; carries the names of all registered modules.
    Configure1 {
        /// Registered module names, in registration order
        modules: Vec<String>,
    },
    /// Second configuration pass, after every module has announced itself.
    Configure2,
    /// A module announcing the parameters it starts with.
    InitialParameters {
        /// The sender's parameters
        parameters: ParameterSet,
    },
    /// Request for one of the library's parameter sets.
    GetParameters {
        /// Set to return
        selector: SetSelector,
    },
    /// Proposed parameters; modules answer with old and new values.
    NewParameters {
        /// Complete proposed set, one section per module
        parameters: ParameterSet,
        /// True for an edit of the current set, false for a switch
        is_edit: bool,
    },
    /// Add a parameters file to the library.
    NewParametersFile {
        /// Path, relative ones looked up in the parameters directory first
        filename: PathBuf,
        /// Replace the default set instead of adding a new one
        is_default: bool,
    },
    /// Switch the current selection.
    SetParameters {
        /// Set to switch to
        selector: SetSelector,
    },
    /// Whether parameter changes are currently refused.
    SettingsLockout {
        /// True while a change is in flight
        locked_out: bool,
    },
    /// The committed parameters after a successful change.
    UpdatedParameters {
        /// The new parameters of record
        parameters: ParameterSet,
    },
    /// Filming started; parameter changes from the UI are refused until it stops.
    StartFilm,
    /// Filming stopped.
    StopFilm,
    /// Open a camera viewer, reusing a hidden one if possible.
    NewCameraViewer,
    /// Open a feed viewer, reusing a hidden one if possible.
    NewFeedViewer,
    /// Microns per pixel for the current objective.
    PixelSize {
        /// Microns per pixel
        pixel_size: f64,
    },
}

impl Payload {
    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Configure1 { .. } => "configure1",
            Payload::Configure2 => "configure2",
            Payload::InitialParameters { .. } => "initial parameters",
            Payload::GetParameters { .. } => "get parameters",
            Payload::NewParameters { .. } => "new parameters",
            Payload::NewParametersFile { .. } => "new parameters file",
            Payload::SetParameters { .. } => "set parameters",
            Payload::SettingsLockout { .. } => "settings lockout",
            Payload::UpdatedParameters { .. } => "updated parameters",
            Payload::StartFilm => "start film",
            Payload::StopFilm => "stop film",
            Payload::NewCameraViewer => "new camera viewer",
            Payload::NewFeedViewer => "new feed viewer",
            Payload::PixelSize { .. } => "pixel size",
        }
    }
}

/// An addressed message travelling through the hub.
#[derive(Clone, Debug, PartialEq)]
pub struct HalMessage {
    id: Uuid,
    source: String,
    payload: Payload,
}

impl HalMessage {
    /// Message from `source` with a fresh id.
    pub fn new(source: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            payload,
        }
    }

    /// A message sent on behalf of the hub itself (UI, lifecycle).
    pub fn from_hal(payload: Payload) -> Self {
        Self::new(HAL_SOURCE, payload)
    }

    /// Unique message id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the sending module, or [`HAL_SOURCE`].
    pub fn source(&self) -> &str {
        &self.source
    }

    /// What the message carries.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Wire name of the payload.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// Whether `name` sent this message.
    pub fn source_is(&self, name: &str) -> bool {
        self.source == name
    }
}

/// Data carried by a response, keyed by its role.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseData {
    /// The responder's parameters before applying a change.
    OldParameters(ParameterSet),
    /// The responder's parameters after applying a change.
    NewParameters(ParameterSet),
    /// Parameters returned by a query.
    Parameters(ParameterSet),
}

/// One module's answer to a message.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    /// Responder: a module name, or a sub-name such as a viewer.
    pub source: String,
    /// What was returned.
    pub data: ResponseData,
}

impl Response {
    /// Response from `source`.
    pub fn new(source: impl Into<String>, data: ResponseData) -> Self {
        Self {
            source: source.into(),
            data,
        }
    }

    /// The set, for `old parameters` responses.
    pub fn old_parameters(&self) -> Option<&ParameterSet> {
        match &self.data {
            ResponseData::OldParameters(p) => Some(p),
            _ => None,
        }
    }

    /// The set, for `new parameters` responses.
    pub fn new_parameters(&self) -> Option<&ParameterSet> {
        match &self.data {
            ResponseData::NewParameters(p) => Some(p),
            _ => None,
        }
    }

    /// The set, for query responses.
    pub fn parameters(&self) -> Option<&ParameterSet> {
        match &self.data {
            ResponseData::Parameters(p) => Some(p),
            _ => None,
        }
    }
}

/// A module's rejection of a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageError {
    /// Rejecting module.
    pub source: String,
    /// Reason given.
    pub message: String,
}

impl MessageError {
    /// Error from `source`.
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Everything collected while one message was delivered to every module.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchReport {
    /// The dispatched message.
    pub message: HalMessage,
    /// Responses in module order.
    pub responses: Vec<Response>,
    /// Errors in module order.
    pub errors: Vec<MessageError>,
}

impl DispatchReport {
    /// Empty report for `message`.
    pub fn new(message: HalMessage) -> Self {
        Self {
            message,
            responses: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// True if any module rejected the message.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Payload of the dispatched message.
    pub fn payload(&self) -> &Payload {
        self.message.payload()
    }

    /// Every `old parameters` response with its source.
    pub fn old_parameters(&self) -> impl Iterator<Item = (&str, &ParameterSet)> {
        self.responses
            .iter()
            .filter_map(|r| r.old_parameters().map(|p| (r.source.as_str(), p)))
    }

    /// Every `new parameters` response with its source.
    pub fn new_parameters(&self) -> impl Iterator<Item = (&str, &ParameterSet)> {
        self.responses
            .iter()
            .filter_map(|r| r.new_parameters().map(|p| (r.source.as_str(), p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kinds_match_wire_names() {
        let p = ParameterSet::new("p");
        assert_eq!(
            Payload::NewParameters {
                parameters: p.clone(),
                is_edit: true
            }
            .kind(),
            "new parameters"
        );
        assert_eq!(Payload::UpdatedParameters { parameters: p }.kind(), "updated parameters");
        assert_eq!(
            Payload::SettingsLockout { locked_out: false }.kind(),
            "settings lockout"
        );
    }

    #[test]
    fn report_splits_responses_by_role() {
        let mut report = DispatchReport::new(HalMessage::from_hal(Payload::StopFilm));
        let old = ParameterSet::new("old");
        let new = ParameterSet::new("new");
        report
            .responses
            .push(Response::new("stage", ResponseData::OldParameters(old)));
        report
            .responses
            .push(Response::new("stage", ResponseData::NewParameters(new)));
        report
            .responses
            .push(Response::new("display00", ResponseData::Parameters(ParameterSet::new("d"))));

        assert_eq!(report.old_parameters().count(), 1);
        assert_eq!(report.new_parameters().map(|(s, _)| s).collect::<Vec<_>>(), vec!["stage"]);
        assert!(!report.has_errors());
    }

    #[test]
    fn messages_get_unique_ids() {
        let a = HalMessage::from_hal(Payload::Configure2);
        let b = HalMessage::from_hal(Payload::Configure2);
        assert_ne!(a.id(), b.id());
        assert!(a.source_is(HAL_SOURCE));
    }
}
