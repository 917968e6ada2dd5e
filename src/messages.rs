//! Commands for the hub actor.
//!
//! External callers (the CLI, a GUI, tests) never touch the [`Hub`] directly.
//! They send [`HubCommand`]s over an mpsc channel to the task running
//! [`HubActor::run`](crate::hub::HubActor::run) and await the reply on the
//! oneshot receiver embedded in each command.
//!
//! ```text
//! Caller                              Hub task
//! ------                              --------
//! 1. Create command with oneshot
//! 2. Send via mpsc channel    ------>
//!                                     3. Post / route to module
//!                                     4. Drain the message queue
//!                                     5. Send reply
//! 6. Await oneshot receiver   <------
//! ```
//!
//! Each variant has a helper that builds the command and returns the
//! receiver:
//!
//! ```rust
//! use storm_hal::messages::HubCommand;
//!
//! let (cmd, rx) = HubCommand::module_names();
//! // cmd_tx.send(cmd).await?;
//! // let names = rx.await?;
//! ```
//!
//! [`Hub`]: crate::hub::Hub

use tokio::sync::oneshot;

use crate::error::AppResult;
use crate::hub::UiOutcome;
use crate::modules::UiAction;
use crate::protocol::{DispatchReport, HalMessage};

/// Commands accepted by the hub actor.
#[derive(Debug)]
pub enum HubCommand {
    /// Queue a message and drain the queue.
    ///
    /// Replies with every dispatch report produced, in dispatch order,
    /// starting with the posted message.
    Post {
        /// Message to post
        message: HalMessage,
        /// Reports, in dispatch order
        response: oneshot::Sender<Vec<DispatchReport>>,
    },

    /// Deliver a user interface action to one module, then drain.
    Ui {
        /// Addressed module
        module: String,
        /// Requested action
        action: UiAction,
        /// Reply and resulting reports, or the module's error
        response: oneshot::Sender<AppResult<UiOutcome>>,
    },

    /// Names of the registered modules, in registration order.
    ModuleNames {
        /// Module names
        response: oneshot::Sender<Vec<String>>,
    },

    /// Stop the actor. Acknowledged before the run loop exits.
    Shutdown {
        /// Acknowledgement
        response: oneshot::Sender<()>,
    },
}

impl HubCommand {
    /// Helper to create a Post command
    pub fn post(message: HalMessage) -> (Self, oneshot::Receiver<Vec<DispatchReport>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Post {
                message,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a Ui command
    pub fn ui(
        module: impl Into<String>,
        action: UiAction,
    ) -> (Self, oneshot::Receiver<AppResult<UiOutcome>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Ui {
                module: module.into(),
                action,
                response: tx,
            },
            rx,
        )
    }

    /// Helper to create a ModuleNames command
    pub fn module_names() -> (Self, oneshot::Receiver<Vec<String>>) {
        let (tx, rx) = oneshot::channel();
        (Self::ModuleNames { response: tx }, rx)
    }

    /// Helper to create a Shutdown command
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}
