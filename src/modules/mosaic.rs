//! Mosaic module: tracks the current objective and its pixel scaling.
//!
//! Objectives are stored as text entries of the form
//! `"name,pixel_size,x_offset,y_offset"` (pixel size in microns per pixel);
//! the `objective` entry names the one in use. Switching to an objective that
//! does not exist is rejected, which rolls the whole parameter change back.
//! When a motorized stage is present the module announces the new pixel size
//! after every objective change.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{HalModule, ModuleContext};
use crate::error::{AppResult, HalError};
use crate::parameters::{Parameter, ParameterSet, ParameterValue};
use crate::protocol::{HalMessage, Payload, ResponseData};

/// Parsed objective entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Objective {
    /// Display name, e.g. `100x`
    pub name: String,
    /// Microns per pixel
    pub pixel_size: f64,
    /// Stage X offset in microns
    pub x_offset: f64,
    /// Stage Y offset in microns
    pub y_offset: f64,
}

impl Objective {
    fn parse(key: &str, raw: &str) -> AppResult<Self> {
        let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
        let number = |i: usize| -> AppResult<f64> {
            fields
                .get(i)
                .and_then(|f| f.parse::<f64>().ok())
                .ok_or_else(|| HalError::module("mosaic", format!("malformed objective '{key}': {raw}")))
        };
        let name = fields
            .first()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| HalError::module("mosaic", format!("malformed objective '{key}': {raw}")))?;
        Ok(Self {
            name: name.to_string(),
            pixel_size: number(1)?,
            x_offset: number(2)?,
            y_offset: number(3)?,
        })
    }
}

/// The objective selected by a mosaic parameter set.
pub fn current_objective(parameters: &ParameterSet) -> AppResult<Objective> {
    let key = parameters
        .get("objective")
        .and_then(ParameterValue::as_str)
        .ok_or_else(|| HalError::module("mosaic", "no objective selected"))?;
    let raw = parameters
        .get(key)
        .and_then(ParameterValue::as_str)
        .ok_or_else(|| HalError::module("mosaic", format!("unknown objective '{key}'")))?;
    Objective::parse(key, raw)
}

/// Mosaic settings controller.
pub struct Mosaic {
    name: String,
    parameters: ParameterSet,
    have_stage: bool,
}

impl Mosaic {
    /// Mosaic with `obj1` selected, plus any objectives in `initial`.
    pub fn new(name: impl Into<String>, initial: &ParameterSet) -> Self {
        let name = name.into();
        let mut parameters = ParameterSet::new(name.clone());
        parameters.add(
            "objective",
            Parameter::new("obj1").with_description("Current objective"),
        );
        parameters.add("obj1", Parameter::new("100x,0.160,0.0,0.0"));
        for (key, parameter) in initial.iter() {
            parameters.add(key, parameter.clone());
        }
        Self {
            name,
            parameters,
            have_stage: false,
        }
    }

    /// Parameters currently in effect.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// The selected objective, parsed.
    pub fn objective(&self) -> AppResult<Objective> {
        current_objective(&self.parameters)
    }

    fn new_parameters(&mut self, parameters: &ParameterSet, ctx: &mut ModuleContext) -> AppResult<()> {
        let before = self.objective().ok();

        // Objective entries are open-ended, so adopt any the incoming section defines.
        let mut next = self.parameters.clone();
        let incoming = parameters.section(&self.name).cloned();
        if let Some(section) = &incoming {
            for (key, parameter) in section.iter() {
                if !next.contains(key) && parameter.value().as_str().is_some() {
                    next.add(key, parameter.clone());
                }
            }
        }

        ctx.respond(ResponseData::OldParameters(self.parameters.clone()));
        if let Some(section) = &incoming {
            next.update_from(section)?;
        }
        let objective = current_objective(&next)?;
        self.parameters = next;
        ctx.respond(ResponseData::NewParameters(self.parameters.clone()));

        if before.as_ref().map(|o| &o.name) != Some(&objective.name) {
            info!(objective = %objective.name, pixel_size = objective.pixel_size, "objective changed");
            if self.have_stage {
                ctx.send(Payload::PixelSize {
                    pixel_size: objective.pixel_size,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HalModule for Mosaic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_message(&mut self, message: &HalMessage, ctx: &mut ModuleContext) -> AppResult<()> {
        match message.payload() {
            Payload::Configure1 { modules } => {
                self.have_stage = modules.iter().any(|m| m == "stage");
                debug!(have_stage = self.have_stage, "mosaic configured");
                ctx.send(Payload::InitialParameters {
                    parameters: self.parameters.clone(),
                });
            }
            Payload::NewParameters { parameters, .. } => self.new_parameters(parameters, ctx)?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initial() -> ParameterSet {
        let mut set = ParameterSet::new("mosaic");
        set.add("objective", Parameter::new("obj1"));
        set.add("obj1", Parameter::new("100x,0.160,0.0,0.0"));
        set.add("obj2", Parameter::new("60x,0.267,10.0,-5.0"));
        set
    }

    fn request(objective: &str) -> HalMessage {
        let mut section = initial();
        section.set("objective", objective.into()).unwrap();
        let mut root = ParameterSet::new("default");
        root.set_section("mosaic", section);
        HalMessage::from_hal(Payload::NewParameters {
            parameters: root,
            is_edit: false,
        })
    }

    #[test]
    fn parses_objective_entries() {
        let objective = current_objective(&initial()).unwrap();
        assert_eq!(objective.name, "100x");
        assert_eq!(objective.pixel_size, 0.160);

        let mut bad = initial();
        bad.set("obj1", "100x,fast".into()).unwrap();
        assert!(current_objective(&bad).is_err());
    }

    #[tokio::test]
    async fn objective_change_announces_pixel_size_with_stage() {
        let mut mosaic = Mosaic::new("mosaic", &initial());
        let mut ctx = ModuleContext::new("mosaic");
        mosaic
            .process_message(
                &HalMessage::from_hal(Payload::Configure1 {
                    modules: vec!["mosaic".into(), "stage".into()],
                }),
                &mut ctx,
            )
            .await
            .unwrap();

        let mut ctx = ModuleContext::new("mosaic");
        mosaic.process_message(&request("obj2"), &mut ctx).await.unwrap();

        assert_eq!(mosaic.objective().unwrap().name, "60x");
        assert_eq!(ctx.responses().len(), 2);
        assert!(matches!(
            ctx.outgoing()[0].payload(),
            Payload::PixelSize { pixel_size } if (*pixel_size - 0.267).abs() < 1e-9
        ));
    }

    #[tokio::test]
    async fn unknown_objective_is_rejected_and_state_kept() {
        let mut mosaic = Mosaic::new("mosaic", &initial());
        let mut ctx = ModuleContext::new("mosaic");
        let err = mosaic
            .process_message(&request("obj9"), &mut ctx)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("unknown objective 'obj9'"));
        assert_eq!(mosaic.objective().unwrap().name, "100x");
        // The old parameters were still reported before the failure.
        assert!(matches!(ctx.responses()[0].data, ResponseData::OldParameters(_)));
        assert!(ctx.outgoing().is_empty());
    }

    #[tokio::test]
    async fn no_pixel_size_without_stage() {
        let mut mosaic = Mosaic::new("mosaic", &initial());
        let mut ctx = ModuleContext::new("mosaic");
        mosaic.process_message(&request("obj2"), &mut ctx).await.unwrap();
        assert!(ctx.outgoing().is_empty());
    }
}
