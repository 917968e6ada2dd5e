//! # STORM HAL Core Library
//!
//! A headless message hub for microscope-control modules. Modules exchange
//! typed messages through a central hub; the settings module coordinates
//! parameter changes across all of them with a broadcast, collect, then
//! commit-or-rollback protocol.
//!
//! ## Crate Structure
//!
//! - **`parameters`**: `ParameterSet`, the ordered copy-on-write collection of
//!   typed values that modules share as a unit, plus TOML load/save.
//! - **`protocol`**: the closed `Payload` enum, message envelopes, responses,
//!   errors and the `DispatchReport` folded from one broadcast.
//! - **`modules`**: the `HalModule` trait, the per-dispatch `ModuleContext`,
//!   the `ModuleRegistry`, and the display, mosaic and stage modules.
//! - **`settings`**: the parameter library, the `SettingsCoordinator` state
//!   machine and the `Settings` module that wires it to the hub.
//! - **`hub`**: the dispatch engine and its tokio actor.
//! - **`messages`**: `HubCommand`, the actor's request/reply protocol.
//! - **`traits`**: seams to the user (`UserNotifier`) and to an editor view
//!   (`ParameterEditor`).
//! - **`config`**: figment-based configuration.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: the crate-wide `HalError` enum.

pub mod config;
pub mod error;
pub mod hub;
pub mod logging;
pub mod messages;
pub mod modules;
pub mod parameters;
pub mod protocol;
pub mod settings;
pub mod traits;
