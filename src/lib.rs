// bluescan Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! bluescan runs classic Bluetooth discovery sessions on top of a platform radio.
//!
//! The crate does not talk to any radio hardware itself. A platform backend implements
//! [`api::RadioProvider`] (begin/cancel discovery, deliver found/finished events) and
//! [`api::PermissionOracle`] (runtime permission checks), and bluescan takes care of the rest:
//!
//! - [`session::DiscoverySession`] owns the scan lifecycle and the per-session
//!   [`common::registry::DeviceRegistry`], which keeps the first sighting of every address in
//!   discovery order.
//! - [`presentation::reduce`] is a pure state transition function from UI state plus an intent or
//!   session event to a new UI state, at most one one-shot [`presentation::UiEffect`] and at most
//!   one [`session::SessionAction`].
//! - [`scanner::Scanner`] is the actor that serializes user intents and radio callbacks through one
//!   queue and publishes state and effects to the presentation surface.
//!
//! ```no_run
//! # async fn run<R, P>(radio: R, permissions: P)
//! # where
//! #     R: bluescan::api::RadioProvider + 'static,
//! #     P: bluescan::api::PermissionOracle + 'static,
//! # {
//! use bluescan::{config::ScannerConfig, presentation::Intent, scanner::Scanner};
//! use futures::stream::StreamExt;
//!
//! let scanner = Scanner::spawn(radio, permissions, ScannerConfig::default());
//! let mut states = scanner.states();
//! scanner.dispatch(Intent::StartScan);
//! while let Some(state) = states.next().await {
//!     println!("{:?}: {} devices", state.phase(), state.devices.len());
//! }
//! # }
//! ```

pub mod api;
pub mod common;
pub mod config;
pub mod presentation;
pub mod scanner;
pub mod session;

use crate::api::Permissions;
use std::result;

/// The main error type returned by most methods in bluescan.
///
/// The `Display` output of each variant is the message shown to the user.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum Error {
    #[error("Bluetooth is disabled")]
    RadioDisabled,

    #[error("Missing Bluetooth permission: {0}")]
    PermissionDenied(Permissions),

    #[error("Failed to start discovery: {0}")]
    StartFailed(String),

    #[error("Failed to stop discovery: {0}")]
    StopFailed(String),

    #[error("Discovery listener is already unregistered")]
    ReceiverAlreadyUnregistered,

    #[error("{0}")]
    Other(String),
}

/// Convenience type for a result using the bluescan [`Error`] type.
pub type Result<T> = result::Result<T, Error>;
