//! Message hub: delivers every message to every module.
//!
//! The [`Hub`] owns the registered modules and a FIFO queue of pending
//! messages. Draining the queue dispatches one message at a time:
//!
//! 1. the message is handed to every registered module, in registration
//!    order, exactly once;
//! 2. each module's responses, errors and new messages are collected in its
//!    own [`ModuleContext`]; a module returning `Err` becomes a
//!    [`MessageError`](crate::protocol::MessageError) on the report;
//! 3. the folded [`DispatchReport`] is handed to the module that sent the
//!    message (`handle_responses`), once, after the last module;
//! 4. messages emitted in steps 2 and 3 are queued behind the current one.
//!
//! Because a follow-up message is only queued, never delivered inline, a
//! rollback broadcast issued from `handle_responses` always starts after the
//! broadcast that triggered it has finished.
//!
//! # Actor
//!
//! [`HubActor`] runs a hub inside a tokio task and serializes external
//! requests arriving as [`HubCommand`]s. [`HubHandle`] wraps the sending side.
//!
//! ```no_run
//! use storm_hal::hub::{Hub, HubActor};
//! use storm_hal::protocol::{HalMessage, Payload};
//!
//! # async fn example() -> storm_hal::error::AppResult<()> {
//! let (handle, task) = HubActor::spawn(Hub::new(), 32);
//! let reports = handle.post(HalMessage::from_hal(Payload::StartFilm)).await?;
//! assert_eq!(reports.len(), 1);
//! handle.shutdown().await?;
//! task.await.ok();
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::HalConfig;
use crate::error::{AppResult, HalError};
use crate::messages::HubCommand;
use crate::modules::{HalModule, ModuleContext, ModuleRegistry, UiAction, UiReply};
use crate::protocol::{DispatchReport, HalMessage, Payload};
use crate::settings::Settings;

/// Reply to a UI action plus everything it set in motion.
#[derive(Debug, Clone)]
pub struct UiOutcome {
    /// What the module answered.
    pub reply: UiReply,
    /// Reports of every message dispatched as a consequence, in order.
    pub reports: Vec<DispatchReport>,
}

/// Registered modules and the queue of messages waiting for dispatch.
#[derive(Default)]
pub struct Hub {
    modules: Vec<Box<dyn HalModule>>,
    queue: VecDeque<HalMessage>,
    dispatched: u64,
}

impl Hub {
    /// Hub with no modules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the settings module and every enabled module from configuration.
    pub fn from_config(config: &HalConfig, registry: &ModuleRegistry) -> AppResult<Self> {
        Self::with_settings(Settings::from_config(&config.settings)?, config, registry)
    }

    /// Like [`from_config`](Self::from_config) with a prepared settings module.
    pub fn with_settings(
        settings: Settings,
        config: &HalConfig,
        registry: &ModuleRegistry,
    ) -> AppResult<Self> {
        let mut hub = Self::new();
        hub.register(Box::new(settings))?;
        for definition in config.enabled_modules() {
            let parameters = definition.initial_parameters()?;
            let module = registry.create(&definition.r#type, definition.name.clone(), parameters)?;
            info!(module = %definition.name, kind = %definition.r#type, "registered module");
            hub.register(module)?;
        }
        Ok(hub)
    }

    /// Add a module. Names must be unique.
    pub fn register(&mut self, module: Box<dyn HalModule>) -> AppResult<()> {
        if self.modules.iter().any(|m| m.name() == module.name()) {
            return Err(HalError::DuplicateModule(module.name().to_string()));
        }
        self.modules.push(module);
        Ok(())
    }

    /// Module names in registration order.
    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    /// Number of messages waiting to be dispatched.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Total number of messages dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Queue `message` without dispatching it.
    pub fn post(&mut self, message: HalMessage) {
        self.queue.push_back(message);
    }

    /// Post `message` and drain.
    pub async fn send(&mut self, message: HalMessage) -> Vec<DispatchReport> {
        self.post(message);
        self.drain().await
    }

    /// Dispatch queued messages until the queue is empty.
    pub async fn drain(&mut self) -> Vec<DispatchReport> {
        let mut reports = Vec::new();
        while let Some(message) = self.queue.pop_front() {
            reports.push(self.dispatch(message).await);
        }
        reports
    }

    /// Run both configuration passes.
    pub async fn start(&mut self) -> Vec<DispatchReport> {
        let modules = self.module_names();
        info!(?modules, "configuring modules");
        let mut reports = self
            .send(HalMessage::from_hal(Payload::Configure1 { modules }))
            .await;
        reports.extend(self.send(HalMessage::from_hal(Payload::Configure2)).await);
        reports
    }

    /// Route a UI action to `module` and drain whatever it sends.
    pub async fn ui(&mut self, module: &str, action: UiAction) -> AppResult<UiOutcome> {
        let target = self
            .modules
            .iter_mut()
            .find(|m| m.name() == module)
            .ok_or_else(|| HalError::UnknownModule(module.to_string()))?;

        debug!(module, action = action.name(), "ui action");
        let mut ctx = ModuleContext::new(module);
        let reply = target.handle_ui(action, &mut ctx).await;
        let (_, errors, outgoing) = ctx.into_parts();
        for error in errors {
            warn!(%error, "ui action reported an error");
        }
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                if !outgoing.is_empty() {
                    warn!(dropped = outgoing.len(), "discarding messages of failed ui action");
                }
                return Err(err);
            }
        };

        self.queue.extend(outgoing);
        let reports = self.drain().await;
        Ok(UiOutcome { reply, reports })
    }

    #[instrument(skip_all, fields(kind = message.kind(), source = %message.source(), id = %message.id()))]
    async fn dispatch(&mut self, message: HalMessage) -> DispatchReport {
        let mut report = DispatchReport::new(message);
        let mut outgoing = Vec::new();

        for module in self.modules.iter_mut() {
            let mut ctx = ModuleContext::new(module.name());
            if let Err(err) = module.process_message(&report.message, &mut ctx).await {
                debug!(module = %module.name(), error = %err, "module rejected message");
                ctx.fail(err);
            }
            let (responses, errors, sent) = ctx.into_parts();
            report.responses.extend(responses);
            report.errors.extend(errors);
            outgoing.extend(sent);
        }

        let source = report.message.source().to_string();
        if let Some(module) = self.modules.iter_mut().find(|m| m.name() == source) {
            let mut ctx = ModuleContext::new(source.as_str());
            if let Err(err) = module.handle_responses(&report, &mut ctx).await {
                warn!(module = %source, error = %err, "response handling failed");
            }
            let (_, errors, sent) = ctx.into_parts();
            for error in errors {
                warn!(%error, "error while handling responses");
            }
            outgoing.extend(sent);
        }

        if report.has_errors() {
            debug!(errors = report.errors.len(), "dispatch finished with errors");
        }
        self.dispatched += 1;
        self.queue.extend(outgoing);
        report
    }
}

/// Runs a [`Hub`] in its own task, processing commands sequentially.
pub struct HubActor {
    hub: Hub,
}

impl HubActor {
    /// Wrap `hub`; nothing runs until [`run`](Self::run).
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// Start the hub's configuration passes, then serve commands.
    pub fn spawn(hub: Hub, capacity: usize) -> (HubHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let task = tokio::spawn(Self::new(hub).run(command_rx));
        (HubHandle { command_tx }, task)
    }

    /// Main event loop. Exits on `Shutdown` or when every sender is gone.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<HubCommand>) {
        info!("hub actor started");
        let reports = self.hub.start().await;
        debug!(messages = reports.len(), "configuration complete");

        while let Some(command) = command_rx.recv().await {
            match command {
                HubCommand::Post { message, response } => {
                    let reports = self.hub.send(message).await;
                    let _ = response.send(reports);
                }
                HubCommand::Ui {
                    module,
                    action,
                    response,
                } => {
                    let result = self.hub.ui(&module, action).await;
                    let _ = response.send(result);
                }
                HubCommand::ModuleNames { response } => {
                    let _ = response.send(self.hub.module_names());
                }
                HubCommand::Shutdown { response } => {
                    info!("Shutdown command received");
                    let _ = response.send(());
                    break;
                }
            }
        }

        info!(dispatched = self.hub.dispatched(), "hub actor shutting down");
    }
}

/// Sending side of a running [`HubActor`].
#[derive(Clone, Debug)]
pub struct HubHandle {
    command_tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    async fn request<T>(
        &self,
        (command, rx): (HubCommand, tokio::sync::oneshot::Receiver<T>),
    ) -> AppResult<T> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| HalError::HubClosed)?;
        rx.await.map_err(|_| HalError::HubClosed)
    }

    /// Dispatch `message` and everything it triggers.
    pub async fn post(&self, message: HalMessage) -> AppResult<Vec<DispatchReport>> {
        self.request(HubCommand::post(message)).await
    }

    /// Route a UI action to `module`, see [`Hub::ui`].
    pub async fn ui(&self, module: impl Into<String>, action: UiAction) -> AppResult<UiOutcome> {
        self.request(HubCommand::ui(module, action)).await?
    }

    /// Names of the registered modules.
    pub async fn module_names(&self) -> AppResult<Vec<String>> {
        self.request(HubCommand::module_names()).await
    }

    /// Stop the actor after the commands already queued.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.request(HubCommand::shutdown()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::Stage;
    use crate::parameters::ParameterSet;
    use crate::protocol::ResponseData;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Records what it sees and optionally rejects everything.
    struct Listener {
        name: String,
        reject: bool,
        seen: Arc<Mutex<Vec<String>>>,
        finalized: Arc<Mutex<Vec<usize>>>,
    }

    impl Listener {
        fn new(name: &str, reject: bool) -> (Self, Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<usize>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let finalized = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    name: name.to_string(),
                    reject,
                    seen: seen.clone(),
                    finalized: finalized.clone(),
                },
                seen,
                finalized,
            )
        }
    }

    #[async_trait]
    impl HalModule for Listener {
        fn name(&self) -> &str {
            &self.name
        }

        async fn process_message(&mut self, message: &HalMessage, ctx: &mut ModuleContext) -> AppResult<()> {
            self.seen.lock().unwrap().push(message.kind().to_string());
            if self.reject {
                return Err(HalError::module(&self.name, "rejected"));
            }
            if matches!(message.payload(), Payload::StartFilm) && message.source_is(&self.name) {
                ctx.send(Payload::StopFilm);
            }
            ctx.respond(ResponseData::Parameters(ParameterSet::new(self.name.clone())));
            Ok(())
        }

        async fn handle_responses(&mut self, report: &DispatchReport, _ctx: &mut ModuleContext) -> AppResult<()> {
            self.finalized.lock().unwrap().push(report.responses.len());
            Ok(())
        }

        async fn handle_ui(&mut self, _action: UiAction, ctx: &mut ModuleContext) -> AppResult<UiReply> {
            ctx.send(Payload::StartFilm);
            if self.reject {
                return Err(HalError::module(&self.name, "rejected"));
            }
            Ok(UiReply::Done)
        }
    }

    #[tokio::test]
    async fn every_module_sees_message_once_then_source_finalizes() {
        let mut hub = Hub::new();
        let (a, seen_a, finalized_a) = Listener::new("a", false);
        let (b, seen_b, _) = Listener::new("b", true);
        hub.register(Box::new(a)).unwrap();
        hub.register(Box::new(b)).unwrap();

        let reports = hub.send(HalMessage::new("a", Payload::StartFilm)).await;

        // start film from "a" makes "a" send stop film, queued behind it
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].responses.len(), 1);
        assert_eq!(reports[0].errors.len(), 1);
        assert_eq!(reports[0].errors[0].source, "b");
        assert_eq!(reports[0].errors[0].message, "rejected");
        assert_eq!(*seen_a.lock().unwrap(), vec!["start film", "stop film"]);
        assert_eq!(*seen_b.lock().unwrap(), vec!["start film", "stop film"]);
        assert_eq!(*finalized_a.lock().unwrap(), vec![1, 1]);
        assert_eq!(hub.pending(), 0);
        assert_eq!(hub.dispatched(), 2);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let mut hub = Hub::new();
        hub.register(Box::new(Stage::new("stage", &ParameterSet::new("stage"))))
            .unwrap();
        let err = hub
            .register(Box::new(Stage::new("stage", &ParameterSet::new("stage"))))
            .unwrap_err();
        assert!(matches!(err, HalError::DuplicateModule(_)));
    }

    #[tokio::test]
    async fn ui_for_unknown_module_errors() {
        let mut hub = Hub::new();
        let err = hub.ui("nobody", UiAction::ListParameters).await.unwrap_err();
        assert!(matches!(err, HalError::UnknownModule(_)));

        hub.register(Box::new(Stage::new("stage", &ParameterSet::new("stage"))))
            .unwrap();
        let err = hub.ui("stage", UiAction::ListParameters).await.unwrap_err();
        assert!(matches!(err, HalError::UnsupportedAction { .. }));
    }

    #[tokio::test]
    async fn failed_ui_action_sends_nothing() {
        let mut hub = Hub::new();
        let (listener, seen, _) = Listener::new("listener", true);
        hub.register(Box::new(listener)).unwrap();

        assert!(hub.ui("listener", UiAction::ListParameters).await.is_err());
        assert_eq!(hub.pending(), 0);

        let reports = hub.send(HalMessage::from_hal(Payload::StopFilm)).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["stop film"]);
    }

    #[tokio::test]
    async fn actor_serves_commands_until_shutdown() {
        let mut hub = Hub::new();
        let (listener, seen, _) = Listener::new("listener", false);
        hub.register(Box::new(listener)).unwrap();

        let (handle, task) = HubActor::spawn(hub, 4);
        assert_eq!(handle.module_names().await.unwrap(), vec!["listener"]);
        let reports = handle
            .post(HalMessage::from_hal(Payload::NewCameraViewer))
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["configure1", "configure2", "new camera viewer"]
        );
        assert!(matches!(handle.module_names().await, Err(HalError::HubClosed)));
    }
}
