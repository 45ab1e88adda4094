// bluescan Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Per-session store of discovered devices.

use crate::api::{DeviceAddress, DiscoveredDevice};
use std::collections::HashSet;

/// Devices seen during one scan, keyed by address and iterated in discovery order.
///
/// The first record for an address wins: later sightings are discarded, never merged.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<DiscoveredDevice>,
    seen: HashSet<DeviceAddress>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with an empty registry.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Appends `device` unless its address is already known. Returns whether it was added.
    pub fn insert_if_absent(&mut self, device: DiscoveredDevice) -> bool {
        if !self.seen.insert(device.address.clone()) {
            return false;
        }
        self.devices.push(device);
        true
    }

    pub fn contains(&self, address: &DeviceAddress) -> bool {
        self.seen.contains(address)
    }

    /// Ordered view for rendering.
    pub fn snapshot(&self) -> &[DiscoveredDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
