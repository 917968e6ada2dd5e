//! Stage module: the parameter side of motorized stage control.
//!
//! The stage keeps jog velocities and step sizes within what the hardware
//! accepts. Requested values outside those limits are clamped rather than
//! rejected, so the committed parameters can differ from the submitted ones.

use async_trait::async_trait;
use tracing::debug;

use super::{respond_with_update, HalModule, ModuleContext};
use crate::error::AppResult;
use crate::parameters::{Parameter, ParameterSet};
use crate::protocol::{HalMessage, Payload};

/// Parameter handling for a motorized XY stage.
pub struct Stage {
    name: String,
    parameters: ParameterSet,
}

impl Stage {
    /// Stage with default limits, overridden by valid `initial` values.
    pub fn new(name: impl Into<String>, initial: &ParameterSet) -> Self {
        let name = name.into();
        let mut parameters = ParameterSet::new(name.clone());
        parameters.add(
            "x_velocity",
            Parameter::new(5.0)
                .with_range(0.1, 10.0)
                .with_description("X jog velocity (mm/s)"),
        );
        parameters.add(
            "y_velocity",
            Parameter::new(5.0)
                .with_range(0.1, 10.0)
                .with_description("Y jog velocity (mm/s)"),
        );
        parameters.add(
            "small_step_size",
            Parameter::new(10.0)
                .with_range(0.1, 1000.0)
                .with_description("Small jog step (um)"),
        );
        parameters.add(
            "large_step_size",
            Parameter::new(50.0)
                .with_range(0.1, 1000.0)
                .with_description("Large jog step (um)"),
        );

        let mut stage = Self { name, parameters };
        let clamped = stage.clamp(initial);
        if let Err(err) = stage.parameters.update_from(&clamped) {
            tracing::warn!(module = %stage.name, error = %err, "ignoring invalid initial stage parameters");
        }
        stage
    }

    /// Parameters currently in effect.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Copy of `incoming` with numeric values pulled into this stage's limits.
    fn clamp(&self, incoming: &ParameterSet) -> ParameterSet {
        let mut clamped = ParameterSet::new(incoming.name());
        for (key, parameter) in incoming.iter() {
            let value = match self.parameters.parameter(key) {
                Some(ours) => ours.clamp(parameter.value().clone()),
                None => parameter.value().clone(),
            };
            if &value != parameter.value() {
                debug!(key, requested = %parameter.value(), applied = %value, "clamped stage parameter");
            }
            clamped.add(key, Parameter::new(value));
        }
        clamped
    }
}

#[async_trait]
impl HalModule for Stage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_message(&mut self, message: &HalMessage, ctx: &mut ModuleContext) -> AppResult<()> {
        match message.payload() {
            Payload::Configure1 { .. } => {
                ctx.send(Payload::InitialParameters {
                    parameters: self.parameters.clone(),
                });
            }
            Payload::NewParameters { parameters, .. } => {
                let incoming = parameters.section(&self.name).map(|s| self.clamp(s));
                let name = self.name.clone();
                respond_with_update(ctx, &name, &mut self.parameters, incoming.as_ref())?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterValue;

    fn request(x_velocity: f64) -> HalMessage {
        let mut section = ParameterSet::new("stage");
        section.add("x_velocity", Parameter::new(x_velocity));
        let mut root = ParameterSet::new("default");
        root.set_section("stage", section);
        HalMessage::from_hal(Payload::NewParameters {
            parameters: root,
            is_edit: true,
        })
    }

    #[tokio::test]
    async fn out_of_range_velocity_is_clamped() {
        let mut stage = Stage::new("stage", &ParameterSet::new("stage"));
        let mut ctx = ModuleContext::new("stage");
        stage.process_message(&request(25.0), &mut ctx).await.unwrap();

        assert_eq!(
            stage.parameters().get("x_velocity"),
            Some(&ParameterValue::Float(10.0))
        );
        let new = ctx.responses()[1].new_parameters().unwrap();
        assert_eq!(new.get("x_velocity"), Some(&ParameterValue::Float(10.0)));
        let old = ctx.responses()[0].old_parameters().unwrap();
        assert_eq!(old.get("x_velocity"), Some(&ParameterValue::Float(5.0)));
    }

    #[tokio::test]
    async fn missing_section_reports_unchanged_parameters() {
        let mut stage = Stage::new("stage", &ParameterSet::new("stage"));
        let mut ctx = ModuleContext::new("stage");
        let message = HalMessage::from_hal(Payload::NewParameters {
            parameters: ParameterSet::new("default"),
            is_edit: false,
        });
        stage.process_message(&message, &mut ctx).await.unwrap();
        assert_eq!(ctx.responses().len(), 2);
        assert_eq!(
            ctx.responses()[0].old_parameters(),
            ctx.responses()[1].new_parameters()
        );
    }

    #[tokio::test]
    async fn integer_velocity_clamps_to_float_minimum() {
        let mut stage = Stage::new("stage", &ParameterSet::new("stage"));
        let mut section = ParameterSet::new("stage");
        section.add("x_velocity", Parameter::new(0i64));
        let mut root = ParameterSet::new("default");
        root.set_section("stage", section);
        let message = HalMessage::from_hal(Payload::NewParameters {
            parameters: root,
            is_edit: true,
        });

        let mut ctx = ModuleContext::new("stage");
        stage.process_message(&message, &mut ctx).await.unwrap();
        assert_eq!(
            stage.parameters().get("x_velocity"),
            Some(&ParameterValue::Float(0.1))
        );
    }

    #[tokio::test]
    async fn nan_velocity_is_rejected() {
        let mut stage = Stage::new("stage", &ParameterSet::new("stage"));
        let mut ctx = ModuleContext::new("stage");
        assert!(stage
            .process_message(&request(f64::NAN), &mut ctx)
            .await
            .is_err());
        assert_eq!(
            stage.parameters().get("x_velocity"),
            Some(&ParameterValue::Float(5.0))
        );
    }

    #[test]
    fn initial_parameters_from_config_are_clamped() {
        let mut initial = ParameterSet::new("stage");
        initial.add("y_velocity", Parameter::new(0.0));
        let stage = Stage::new("stage", &initial);
        assert_eq!(
            stage.parameters().get("y_velocity"),
            Some(&ParameterValue::Float(0.1))
        );
    }
}
