// bluescan Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The `api` module contains the traits a platform backend implements, and the types that flow
//! between the backend and the discovery session.
//!
//! A backend provides a [`RadioProvider`] wrapping the OS Bluetooth adapter and a
//! [`PermissionOracle`] answering runtime permission checks. While a scan is running the backend
//! forwards OS callbacks to the [`RadioListener`] it was handed in
//! [`RadioProvider::register_listener`]; the listener may be used from any thread.

pub mod address;

pub use self::address::{DeviceAddress, ParseAddressError};

use crate::Result;
use async_trait::async_trait;
use bitflags::bitflags;
use futures::channel::mpsc::UnboundedSender;
use log::trace;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;

bitflags! {
    /// Runtime permissions the platform may require for discovery.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u8 {
        /// Permission to run and cancel discovery (`BLUETOOTH_SCAN`, or fine location on older
        /// platforms).
        const SCAN = 0x01;
        /// Permission to read remote device details such as name and bond state
        /// (`BLUETOOTH_CONNECT`).
        const CONNECT = 0x02;
    }
}

impl Display for Permissions {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut first = true;
        for (flag, name) in [
            (Permissions::SCAN, "BLUETOOTH_SCAN"),
            (Permissions::CONNECT, "BLUETOOTH_CONNECT"),
        ] {
            if self.contains(flag) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Pairing relationship between the local adapter and a remote device.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", rename_all = "kebab-case")
)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum BondState {
    #[default]
    NotPaired,
    Pairing,
    Paired,
}

impl BondState {
    const BOND_NONE: i32 = 10;
    const BOND_BONDING: i32 = 11;
    const BOND_BONDED: i32 = 12;

    /// Maps the platform's integer bond constants. Anything unrecognised is treated as not paired.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            Self::BOND_BONDED => BondState::Paired,
            Self::BOND_BONDING => BondState::Pairing,
            Self::BOND_NONE => BondState::NotPaired,
            _ => {
                trace!("Unknown bond state {}, treating as not paired", raw);
                BondState::NotPaired
            }
        }
    }
}

/// Converts a platform RSSI reading. The platform reports `i16::MIN` when no reading was taken.
pub fn rssi_from_raw(raw: i16) -> Option<i16> {
    if raw == i16::MIN {
        None
    } else {
        Some(raw)
    }
}

/// A device as the radio reported it, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDevice {
    pub address: String,
    pub name: Option<String>,
    pub bond_state: BondState,
}

/// Events a radio delivers while discovery is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    DeviceFound { device: RawDevice, rssi: Option<i16> },
    DiscoveryFinished,
}

/// Identifies one started scan. Every call to `start_scan` that reaches the radio gets a new one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(pub(crate) u64);

impl SessionId {
    pub(crate) fn next(self) -> Self {
        SessionId(self.0.wrapping_add(1))
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle a radio backend uses to hand events back to the session that registered it.
///
/// Cheap to clone and safe to call from any thread. Events are tagged with the session they were
/// registered for, so a late callback from an earlier scan never leaks into a newer one.
#[derive(Debug, Clone)]
pub struct RadioListener {
    session: SessionId,
    sink: UnboundedSender<(SessionId, RadioEvent)>,
}

impl RadioListener {
    pub(crate) fn new(session: SessionId, sink: UnboundedSender<(SessionId, RadioEvent)>) -> Self {
        RadioListener { session, sink }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Queues an event. Returns `false` if the receiving side has gone away.
    pub fn deliver(&self, event: RadioEvent) -> bool {
        if let Err(lost) = self.sink.unbounded_send((self.session, event)) {
            trace!(
                "Lost radio event, session {} has no receiver: {:?}",
                self.session,
                lost.into_inner().1
            );
            return false;
        }
        true
    }

    pub fn device_found(&self, device: RawDevice, rssi: Option<i16>) -> bool {
        self.deliver(RadioEvent::DeviceFound { device, rssi })
    }

    pub fn discovery_finished(&self) -> bool {
        self.deliver(RadioEvent::DiscoveryFinished)
    }
}

/// The platform Bluetooth adapter, as seen by a discovery session.
#[async_trait]
pub trait RadioProvider: Send + Sync {
    /// Whether the radio is switched on.
    async fn is_enabled(&self) -> bool;

    /// Issues the platform's "begin discovery" command. `Ok(false)` means the platform refused.
    async fn begin_discovery(&self) -> Result<bool>;

    /// Issues the platform's "cancel discovery" command. `Ok(false)` means the platform refused.
    async fn cancel_discovery(&self) -> Result<bool>;

    /// Starts delivering found/finished events to `listener`, replacing any previous listener.
    fn register_listener(&self, listener: RadioListener) -> Result<()>;

    /// Stops delivering events. Returns [`crate::Error::ReceiverAlreadyUnregistered`] if no
    /// listener is registered.
    fn unregister_listener(&self) -> Result<()>;
}

#[async_trait]
impl<T: RadioProvider + ?Sized> RadioProvider for Arc<T> {
    async fn is_enabled(&self) -> bool {
        (**self).is_enabled().await
    }

    async fn begin_discovery(&self) -> Result<bool> {
        (**self).begin_discovery().await
    }

    async fn cancel_discovery(&self) -> Result<bool> {
        (**self).cancel_discovery().await
    }

    fn register_listener(&self, listener: RadioListener) -> Result<()> {
        (**self).register_listener(listener)
    }

    fn unregister_listener(&self) -> Result<()> {
        (**self).unregister_listener()
    }
}

/// Answers runtime permission checks.
pub trait PermissionOracle: Send + Sync {
    fn has_scan_permission(&self) -> bool;

    fn has_connect_permission(&self) -> bool;

    /// All permissions currently granted.
    fn granted(&self) -> Permissions {
        let mut granted = Permissions::empty();
        granted.set(Permissions::SCAN, self.has_scan_permission());
        granted.set(Permissions::CONNECT, self.has_connect_permission());
        granted
    }
}

impl<T: PermissionOracle + ?Sized> PermissionOracle for Arc<T> {
    fn has_scan_permission(&self) -> bool {
        (**self).has_scan_permission()
    }

    fn has_connect_permission(&self) -> bool {
        (**self).has_connect_permission()
    }
}

/// One device seen during the current scan. Never changes once recorded.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: DeviceAddress,
    pub rssi: Option<i16>,
    pub bond_state: BondState,
}

impl DiscoveredDevice {
    /// Builds a record from a raw report. Devices without a name get `unknown_name`.
    pub fn from_raw(raw: RawDevice, rssi: Option<i16>, unknown_name: &str) -> Self {
        let name = raw
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| unknown_name.to_owned());
        DiscoveredDevice {
            name,
            address: DeviceAddress::from(raw.address),
            rssi,
            bond_state: raw.bond_state,
        }
    }
}

/// Lifecycle of a discovery session.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", rename_all = "kebab-case")
)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DiscoveryStatus {
    #[default]
    Idle,
    AwaitingPermission,
    Scanning,
    Finished,
    Error(String),
}

impl DiscoveryStatus {
    pub fn is_scanning(&self) -> bool {
        matches!(self, DiscoveryStatus::Scanning)
    }
}
