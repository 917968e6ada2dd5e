//! Display module: bookkeeping for one or more camera / feed viewers.
//!
//! Each viewer owns its own parameters and answers `new parameters` under
//! its own name, so the settings coordinator records one section per viewer
//! (`display00`, `display01`, ...). A viewer with no section in the incoming
//! set falls back to the display defaults.

use async_trait::async_trait;
use tracing::info;

use super::{respond_with_update, HalModule, ModuleContext, UiAction, UiReply};
use crate::error::{AppResult, HalError};
use crate::parameters::{Parameter, ParameterSet};
use crate::protocol::{HalMessage, Payload, ResponseData};

/// Colortables a viewer can be set to.
pub const COLORTABLES: [&str; 5] = ["gray", "hot", "cool", "jet", "idl5"];

/// What a viewer shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerKind {
    /// Live camera images
    Camera,
    /// A processed feed derived from a camera
    Feed,
}

/// One viewer window.
#[derive(Clone, Debug)]
pub struct Viewer {
    name: String,
    kind: ViewerKind,
    visible: bool,
    parameters: ParameterSet,
}

impl Viewer {
    /// Name the viewer responds under, `displayNN`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Camera or feed viewer.
    pub fn kind(&self) -> ViewerKind {
        self.kind
    }

    /// False once hidden, until shown again.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// This viewer's colortable and display range.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }
}

/// Controller for the viewers.
pub struct Display {
    name: String,
    defaults: ParameterSet,
    viewers: Vec<Viewer>,
    filming: bool,
}

impl Display {
    /// Display with one camera viewer. `initial` overrides the viewer defaults.
    pub fn new(name: impl Into<String>, initial: &ParameterSet) -> Self {
        let mut defaults = ParameterSet::new("viewer");
        defaults.add(
            "colortable",
            Parameter::new("gray").with_choices(COLORTABLES),
        );
        defaults.add("display_max", Parameter::new(2000i64));
        defaults.add("display_min", Parameter::new(100i64));
        defaults.add("sync", Parameter::new(0i64));
        if let Err(err) = defaults.update_from(initial) {
            tracing::warn!(error = %err, "ignoring invalid initial display parameters");
        }

        let mut display = Self {
            name: name.into(),
            defaults,
            viewers: Vec::new(),
            filming: false,
        };
        display.add_viewer(ViewerKind::Camera);
        display
    }

    /// Every viewer, hidden ones included, in creation order.
    pub fn viewers(&self) -> &[Viewer] {
        &self.viewers
    }

    /// True between `start film` and `stop film`.
    pub fn is_filming(&self) -> bool {
        self.filming
    }

    fn next_viewer_name(&self) -> String {
        format!("display{:02}", self.viewers.len())
    }

    fn add_viewer(&mut self, kind: ViewerKind) -> &Viewer {
        let name = self.next_viewer_name();
        let mut parameters = self.defaults.clone();
        parameters.set_name(name.clone());
        self.viewers.push(Viewer {
            name,
            kind,
            visible: true,
            parameters,
        });
        &self.viewers[self.viewers.len() - 1]
    }

    /// Hide a viewer; it is reused by the next request for that kind.
    fn hide_viewer(&mut self, name: &str) -> bool {
        match self.viewers.iter_mut().find(|v| v.name == name) {
            Some(viewer) => {
                viewer.visible = false;
                true
            }
            None => false,
        }
    }

    /// Unhide every hidden viewer of `kind`, or create one if there are none.
    fn show_viewer(&mut self, kind: ViewerKind) {
        let mut found = false;
        for viewer in self.viewers.iter_mut().filter(|v| v.kind == kind && !v.visible) {
            viewer.visible = true;
            found = true;
        }
        if !found {
            let viewer = self.add_viewer(kind);
            info!(viewer = %viewer.name, ?kind, "created viewer");
        }
    }
}

#[async_trait]
impl HalModule for Display {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_message(&mut self, message: &HalMessage, ctx: &mut ModuleContext) -> AppResult<()> {
        match message.payload() {
            Payload::NewParameters { parameters, .. } => {
                let defaults = &self.defaults;
                for viewer in self.viewers.iter_mut() {
                    let incoming = parameters
                        .section(&viewer.name)
                        .cloned()
                        .unwrap_or_else(|| defaults.clone());
                    respond_with_update(ctx, &viewer.name, &mut viewer.parameters, Some(&incoming))?;
                }
            }
            Payload::NewCameraViewer => self.show_viewer(ViewerKind::Camera),
            Payload::NewFeedViewer => self.show_viewer(ViewerKind::Feed),
            Payload::StartFilm => self.filming = true,
            Payload::StopFilm => {
                self.filming = false;
                for viewer in &self.viewers {
                    ctx.respond_as(
                        viewer.name.clone(),
                        ResponseData::Parameters(viewer.parameters.clone()),
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn handle_ui(&mut self, action: UiAction, _ctx: &mut ModuleContext) -> AppResult<UiReply> {
        match action {
            UiAction::HideViewer(viewer) => {
                if !self.hide_viewer(&viewer) {
                    return Err(HalError::module(&self.name, format!("no viewer named '{viewer}'")));
                }
                info!(%viewer, "hid viewer");
                Ok(UiReply::Done)
            }
            other => Err(HalError::UnsupportedAction {
                module: self.name.clone(),
                action: other.name().to_string(),
            }),
        }
    }
}
