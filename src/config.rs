//! Platform dependent knobs for a discovery session.

use crate::api::Permissions;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;

/// First platform API level with separate runtime scan/connect permissions.
pub const RUNTIME_BLUETOOTH_PERMISSIONS_API_LEVEL: u32 = 31;

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", default)
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// API level of the platform the radio runs on.
    pub platform_api_level: u32,
    /// Name given to devices that do not report one.
    pub unknown_device_name: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            platform_api_level: RUNTIME_BLUETOOTH_PERMISSIONS_API_LEVEL,
            unknown_device_name: "Unknown".to_owned(),
        }
    }
}

impl ScannerConfig {
    /// Below API 31 reading device details needs no extra grant.
    pub fn requires_connect_permission(&self) -> bool {
        self.platform_api_level >= RUNTIME_BLUETOOTH_PERMISSIONS_API_LEVEL
    }

    /// Whether cancelling discovery needs the scan permission to be held.
    pub fn cancel_requires_scan_permission(&self) -> bool {
        self.platform_api_level >= RUNTIME_BLUETOOTH_PERMISSIONS_API_LEVEL
    }

    /// Permissions that must be granted before a scan may start.
    pub fn required_permissions(&self) -> Permissions {
        if self.requires_connect_permission() {
            Permissions::SCAN | Permissions::CONNECT
        } else {
            Permissions::SCAN
        }
    }
}
