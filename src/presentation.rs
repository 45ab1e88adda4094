//! Presentation state and the reducer that drives it.
//!
//! [`reduce`] never performs I/O. It maps the current [`UiState`] and one [`Input`] to a
//! [`Transition`]: the next state, at most one [`UiEffect`] for the presentation surface, and at
//! most one [`SessionAction`] for the discovery session to carry out.

use crate::api::{DeviceAddress, DiscoveredDevice, DiscoveryStatus};
use crate::session::{SessionAction, SessionEvent};

/// What the presentation surface renders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UiState {
    pub is_bluetooth_enabled: bool,
    pub status: DiscoveryStatus,
    pub devices: Vec<DiscoveredDevice>,
    pub error_message: Option<String>,
}

/// Screen to show, derived from [`UiState`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScreenPhase {
    Idle,
    AwaitingPermission,
    Scanning,
    FinishedWithResults,
    FinishedEmpty,
    Error,
}

impl UiState {
    pub fn is_scanning(&self) -> bool {
        self.status.is_scanning()
    }

    pub fn phase(&self) -> ScreenPhase {
        if self.error_message.is_some() {
            return ScreenPhase::Error;
        }
        match self.status {
            DiscoveryStatus::Idle if self.devices.is_empty() => ScreenPhase::Idle,
            DiscoveryStatus::Idle | DiscoveryStatus::Finished => {
                if self.devices.is_empty() {
                    ScreenPhase::FinishedEmpty
                } else {
                    ScreenPhase::FinishedWithResults
                }
            }
            DiscoveryStatus::AwaitingPermission => ScreenPhase::AwaitingPermission,
            DiscoveryStatus::Scanning => ScreenPhase::Scanning,
            DiscoveryStatus::Error(_) => ScreenPhase::Error,
        }
    }
}

/// Things the user asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    CheckBluetoothState,
    RequestPermissions,
    StartScan,
    PermissionsResult { granted: bool },
    StopScan,
    DeviceClicked(DeviceAddress),
    ClearError,
}

/// One-shot instructions for the presentation surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    ShowError(String),
    RequestPermissions,
    RequestBluetoothEnable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Intent(Intent),
    Session(SessionEvent),
}

impl From<Intent> for Input {
    fn from(intent: Intent) -> Self {
        Input::Intent(intent)
    }
}

impl From<SessionEvent> for Input {
    fn from(event: SessionEvent) -> Self {
        Input::Session(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: UiState,
    pub effect: Option<UiEffect>,
    pub action: Option<SessionAction>,
}

impl Transition {
    fn to(state: UiState) -> Self {
        Transition {
            state,
            effect: None,
            action: None,
        }
    }

    fn effect(mut self, effect: UiEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    fn action(mut self, action: SessionAction) -> Self {
        self.action = Some(action);
        self
    }
}

pub const PERMISSIONS_DENIED_MESSAGE: &str = "Bluetooth permissions were denied";

pub fn reduce(state: &UiState, input: Input) -> Transition {
    match input {
        Input::Intent(intent) => reduce_intent(state, intent),
        Input::Session(event) => reduce_event(state, event),
    }
}

fn reduce_intent(state: &UiState, intent: Intent) -> Transition {
    let mut next = state.clone();
    match intent {
        Intent::CheckBluetoothState => Transition::to(next).action(SessionAction::CheckRadio),
        Intent::RequestPermissions => Transition::to(next).effect(UiEffect::RequestPermissions),
        Intent::StartScan => match state.status {
            DiscoveryStatus::Scanning | DiscoveryStatus::AwaitingPermission => {
                Transition::to(next)
            }
            _ => {
                next.error_message = None;
                next.status = DiscoveryStatus::AwaitingPermission;
                next.devices.clear();
                Transition::to(next)
                    .effect(UiEffect::RequestPermissions)
                    .action(SessionAction::AwaitPermission)
            }
        },
        Intent::PermissionsResult { granted } => {
            if state.status != DiscoveryStatus::AwaitingPermission {
                return Transition::to(next);
            }
            if granted {
                Transition::to(next).action(SessionAction::StartScan)
            } else {
                next.status = DiscoveryStatus::Idle;
                Transition::to(next)
                    .effect(UiEffect::ShowError(PERMISSIONS_DENIED_MESSAGE.to_owned()))
                    .action(SessionAction::PermissionDenied)
            }
        }
        Intent::StopScan => match state.status {
            DiscoveryStatus::Scanning => Transition::to(next).action(SessionAction::StopScan),
            DiscoveryStatus::AwaitingPermission => {
                next.status = DiscoveryStatus::Idle;
                Transition::to(next).action(SessionAction::PermissionDenied)
            }
            _ => Transition::to(next),
        },
        Intent::DeviceClicked(address) => {
            Transition::to(next).effect(UiEffect::ShowError(format!("Clicked device: {}", address)))
        }
        Intent::ClearError => {
            next.error_message = None;
            Transition::to(next)
        }
    }
}

fn reduce_event(state: &UiState, event: SessionEvent) -> Transition {
    let mut next = state.clone();
    match event {
        SessionEvent::StatusChanged(status) => {
            next.status = status;
            Transition::to(next)
        }
        SessionEvent::DevicesChanged(devices) => {
            next.devices = devices;
            Transition::to(next)
        }
        SessionEvent::Error(message) => {
            next.error_message = Some(message.clone());
            Transition::to(next).effect(UiEffect::ShowError(message))
        }
        SessionEvent::RadioStateChanged { enabled } => {
            next.is_bluetooth_enabled = enabled;
            let transition = Transition::to(next);
            if enabled {
                transition
            } else {
                transition.effect(UiEffect::RequestBluetoothEnable)
            }
        }
    }
}
