// bluescan Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Discovery session controller.
//!
//! [`DiscoverySession`] owns the scan lifecycle: it checks preconditions, resets the device
//! registry, registers a [`RadioListener`] and drives the radio's begin/cancel commands. Radio
//! callbacks come back through the channel handed to [`DiscoverySession::new`] and are applied with
//! [`DiscoverySession::handle_radio_event`]. Every observable change is queued as a
//! [`SessionEvent`] and collected with [`DiscoverySession::take_events`].

mod subscription;

use self::subscription::Subscription;
use crate::api::{
    DiscoveredDevice, DiscoveryStatus, PermissionOracle, Permissions, RadioEvent, RadioListener,
    RadioProvider, RawDevice, SessionId,
};
use crate::common::registry::DeviceRegistry;
use crate::config::ScannerConfig;
use crate::{Error, Result};
use futures::channel::mpsc::UnboundedSender;
use log::{debug, trace, warn};
use std::mem;

/// Changes a session reports to whoever renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StatusChanged(DiscoveryStatus),
    DevicesChanged(Vec<DiscoveredDevice>),
    /// A non-fatal problem the user should be told about.
    Error(String),
    RadioStateChanged { enabled: bool },
}

/// Commands the presentation layer asks a session to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    AwaitPermission,
    PermissionDenied,
    StartScan,
    StopScan,
    CheckRadio,
}

pub struct DiscoverySession<R, P> {
    radio: R,
    permissions: P,
    config: ScannerConfig,
    registry: DeviceRegistry,
    status: DiscoveryStatus,
    subscription: Subscription,
    session: SessionId,
    radio_sink: UnboundedSender<(SessionId, RadioEvent)>,
    pending: Vec<SessionEvent>,
}

impl<R, P> DiscoverySession<R, P>
where
    R: RadioProvider,
    P: PermissionOracle,
{
    /// Creates an idle session. Listeners registered with the radio feed `radio_sink`.
    pub fn new(
        radio: R,
        permissions: P,
        config: ScannerConfig,
        radio_sink: UnboundedSender<(SessionId, RadioEvent)>,
    ) -> Self {
        DiscoverySession {
            radio,
            permissions,
            config,
            registry: DeviceRegistry::new(),
            status: DiscoveryStatus::Idle,
            subscription: Subscription::default(),
            session: SessionId::default(),
            radio_sink,
            pending: Vec::new(),
        }
    }

    pub fn status(&self) -> &DiscoveryStatus {
        &self.status
    }

    pub fn is_scanning(&self) -> bool {
        self.status.is_scanning()
    }

    pub fn devices(&self) -> &[DiscoveredDevice] {
        self.registry.snapshot()
    }

    /// Id of the most recently started scan.
    pub fn current_session(&self) -> SessionId {
        self.session
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_active()
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Drains the events queued since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        mem::take(&mut self.pending)
    }

    pub async fn perform(&mut self, action: SessionAction) -> Result<()> {
        match action {
            SessionAction::AwaitPermission => self.await_permission(),
            SessionAction::PermissionDenied => self.permission_denied(),
            SessionAction::StartScan => return self.start_scan().await,
            SessionAction::StopScan => self.stop_scan().await,
            SessionAction::CheckRadio => {
                self.check_radio().await;
            }
        }
        Ok(())
    }

    /// Reports whether the radio is on.
    pub async fn check_radio(&mut self) -> bool {
        let enabled = self.radio.is_enabled().await;
        self.pending
            .push(SessionEvent::RadioStateChanged { enabled });
        enabled
    }

    /// Marks that a scan was requested and the platform is asking the user for permissions.
    /// Results of the previous scan are dropped.
    pub fn await_permission(&mut self) {
        if self.is_scanning() {
            debug!("Scan already running, not waiting for permissions");
            return;
        }
        if !self.registry.is_empty() {
            self.registry.reset();
            self.publish_devices();
        }
        self.set_status(DiscoveryStatus::AwaitingPermission);
    }

    pub fn permission_denied(&mut self) {
        if self.status == DiscoveryStatus::AwaitingPermission {
            self.set_status(DiscoveryStatus::Idle);
        }
    }

    /// Starts a new scan.
    ///
    /// A no-op while a scan is running. If the radio is off or a permission is missing the error is
    /// returned and the registry is left untouched.
    pub async fn start_scan(&mut self) -> Result<()> {
        if self.is_scanning() {
            debug!("Scan {} already running, ignoring start", self.session);
            return Ok(());
        }
        if let Err(e) = self.check_preconditions().await {
            debug!("Not starting scan: {}", e);
            self.permission_denied();
            return Err(e);
        }

        self.registry.reset();
        self.publish_devices();
        self.session = self.session.next();
        self.set_status(DiscoveryStatus::Scanning);

        let listener = RadioListener::new(self.session, self.radio_sink.clone());
        if let Err(e) = self.subscription.register(&self.radio, listener) {
            return Err(self.fail_start(e.to_string()));
        }
        match self.radio.begin_discovery().await {
            Ok(true) => {
                debug!("Discovery session {} started", self.session);
                Ok(())
            }
            Ok(false) => Err(self.fail_start("platform refused to begin discovery".to_owned())),
            Err(e) => Err(self.fail_start(e.to_string())),
        }
    }

    /// Stops the current scan.
    ///
    /// Cancelling is best effort: a failure is reported as a [`SessionEvent::Error`] but the
    /// session stops regardless. The listener is always released.
    pub async fn stop_scan(&mut self) {
        if self.is_scanning() {
            if let Err(e) = self.cancel_discovery().await {
                warn!("Stopping session {} without cancel: {}", self.session, e);
                self.report(e);
            }
        } else {
            trace!("Stop requested while {:?}, skipping cancel", self.status);
        }
        self.subscription.unregister(&self.radio);

        let next = match &self.status {
            DiscoveryStatus::Scanning if self.registry.is_empty() => DiscoveryStatus::Idle,
            DiscoveryStatus::Scanning => DiscoveryStatus::Finished,
            DiscoveryStatus::AwaitingPermission => DiscoveryStatus::Idle,
            other => other.clone(),
        };
        self.set_status(next);
    }

    /// Applies an event delivered by the radio for `session`.
    ///
    /// Events for any session other than the running one are stale and dropped, which covers a
    /// finished signal that arrives after the scan was stopped.
    pub fn handle_radio_event(&mut self, session: SessionId, event: RadioEvent) {
        if session != self.session || !self.is_scanning() {
            trace!(
                "Ignoring {:?} for session {} (current {}, {:?})",
                event,
                session,
                self.session,
                self.status
            );
            return;
        }
        match event {
            RadioEvent::DeviceFound { device, rssi } => self.on_device_found(device, rssi),
            RadioEvent::DiscoveryFinished => self.on_discovery_finished(),
        }
    }

    fn on_device_found(&mut self, device: RawDevice, rssi: Option<i16>) {
        if self.config.requires_connect_permission() && !self.permissions.has_connect_permission()
        {
            self.report(Error::PermissionDenied(Permissions::CONNECT));
            return;
        }
        let device = DiscoveredDevice::from_raw(device, rssi, &self.config.unknown_device_name);
        let address = device.address.clone();
        if self.registry.insert_if_absent(device) {
            debug!("Session {} found {}", self.session, address);
            self.publish_devices();
        } else {
            trace!("Session {} already knows {}", self.session, address);
        }
    }

    fn on_discovery_finished(&mut self) {
        debug!(
            "Discovery session {} finished with {} devices",
            self.session,
            self.registry.len()
        );
        self.subscription.unregister(&self.radio);
        self.set_status(DiscoveryStatus::Finished);
    }

    async fn check_preconditions(&self) -> Result<()> {
        if !self.radio.is_enabled().await {
            return Err(Error::RadioDisabled);
        }
        let missing = self
            .config
            .required_permissions()
            .difference(self.permissions.granted());
        if !missing.is_empty() {
            return Err(Error::PermissionDenied(missing));
        }
        Ok(())
    }

    async fn cancel_discovery(&self) -> Result<()> {
        if self.config.cancel_requires_scan_permission() && !self.permissions.has_scan_permission()
        {
            return Err(Error::PermissionDenied(Permissions::SCAN));
        }
        match self.radio.cancel_discovery().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::StopFailed(
                "platform refused to cancel discovery".to_owned(),
            )),
            Err(e) => Err(Error::StopFailed(e.to_string())),
        }
    }

    fn fail_start(&mut self, reason: String) -> Error {
        self.subscription.unregister(&self.radio);
        let error = Error::StartFailed(reason);
        warn!("Discovery session {} failed: {}", self.session, error);
        self.set_status(DiscoveryStatus::Error(error.to_string()));
        error
    }

    fn set_status(&mut self, status: DiscoveryStatus) {
        if self.status != status {
            self.status = status.clone();
            self.pending.push(SessionEvent::StatusChanged(status));
        }
    }

    fn publish_devices(&mut self) {
        self.pending
            .push(SessionEvent::DevicesChanged(self.registry.snapshot().to_vec()));
    }

    fn report(&mut self, error: Error) {
        self.pending.push(SessionEvent::Error(error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BondState, DeviceAddress};
    use crate::common::fake::{init_logging, FakePermissions, FakeRadio};
    use futures::channel::mpsc::{self, UnboundedReceiver};
    use std::sync::Arc;

    type TestSession = DiscoverySession<Arc<FakeRadio>, Arc<FakePermissions>>;

    struct Harness {
        radio: Arc<FakeRadio>,
        permissions: Arc<FakePermissions>,
        session: TestSession,
        events: UnboundedReceiver<(SessionId, RadioEvent)>,
    }

    impl Harness {
        fn new(config: ScannerConfig) -> Self {
            init_logging();
            let radio = FakeRadio::new();
            let permissions = FakePermissions::granted();
            let (sink, events) = mpsc::unbounded();
            let session = DiscoverySession::new(radio.clone(), permissions.clone(), config, sink);
            Harness {
                radio,
                permissions,
                session,
                events,
            }
        }

        /// Hands every queued radio callback to the session, as the scanner loop would.
        fn pump(&mut self) {
            while let Ok((id, event)) = self.events.try_recv() {
                self.session.handle_radio_event(id, event);
            }
        }
    }

    fn addr(s: &str) -> DeviceAddress {
        DeviceAddress::from(s)
    }

    #[tokio::test]
    async fn duplicate_sightings_keep_first_record() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        assert!(h.session.is_scanning());
        assert_eq!(h.radio.begin_calls(), 1);

        assert!(h.radio.found("AA:BB:CC:DD:EE:01", Some("Phone"), Some(-40)));
        assert!(h.radio.found("aa:bb:cc:dd:ee:01", Some("Phone2"), Some(-30)));
        assert!(h.radio.finish());
        h.pump();

        assert_eq!(
            h.session.devices(),
            [DiscoveredDevice {
                name: "Phone".to_owned(),
                address: addr("AA:BB:CC:DD:EE:01"),
                rssi: Some(-40),
                bond_state: BondState::Paired,
            }]
        );
        assert!(!h.session.is_scanning());
        assert_eq!(h.session.status(), &DiscoveryStatus::Finished);
        assert!(!h.radio.is_listening());
        assert!(!h.session.is_listening());
    }

    #[tokio::test]
    async fn start_while_scanning_is_noop() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        h.radio.found("AA:BB:CC:DD:EE:01", Some("Phone"), None);
        h.pump();
        let before_session = h.session.current_session();
        h.session.take_events();

        h.session.start_scan().await.unwrap();

        assert_eq!(h.session.current_session(), before_session);
        assert_eq!(h.session.devices().len(), 1);
        assert!(h.session.is_scanning());
        assert_eq!(h.radio.begin_calls(), 1);
        assert!(h.session.take_events().is_empty());
    }

    #[tokio::test]
    async fn radio_disabled_leaves_state_untouched() {
        let mut h = Harness::new(ScannerConfig::default());
        h.radio.set_enabled(false);

        assert_eq!(h.session.start_scan().await, Err(Error::RadioDisabled));
        assert!(!h.session.is_scanning());
        assert!(h.session.devices().is_empty());
        assert_eq!(h.radio.begin_calls(), 0);
        assert!(!h.radio.is_listening());
        assert!(h.session.take_events().is_empty());
    }

    #[tokio::test]
    async fn missing_permissions_are_named() {
        let mut h = Harness::new(ScannerConfig::default());
        h.permissions.set_connect(false);
        let result = h.session.start_scan().await;
        assert_eq!(result, Err(Error::PermissionDenied(Permissions::CONNECT)));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Missing Bluetooth permission: BLUETOOTH_CONNECT"
        );

        h.permissions.set_scan(false);
        assert_eq!(
            h.session.start_scan().await,
            Err(Error::PermissionDenied(Permissions::all()))
        );
        assert_eq!(h.radio.begin_calls(), 0);
    }

    #[tokio::test]
    async fn legacy_platform_ignores_connect_permission() {
        let mut h = Harness::new(ScannerConfig {
            platform_api_level: 30,
            ..Default::default()
        });
        h.permissions.set_connect(false);
        h.session.start_scan().await.unwrap();
        h.radio.found("AA:BB:CC:DD:EE:01", None, None);
        h.pump();
        assert_eq!(h.session.devices()[0].name, "Unknown");
    }

    #[tokio::test]
    async fn stop_before_any_device() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        h.session.stop_scan().await;

        assert!(!h.session.is_scanning());
        assert_eq!(h.session.status(), &DiscoveryStatus::Idle);
        assert!(h.session.devices().is_empty());
        assert_eq!(h.radio.cancel_calls(), 1);
        assert!(!h
            .session
            .take_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::Error(_))));
    }

    #[tokio::test]
    async fn stop_keeps_results_as_finished() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        h.radio.found("AA:BB:CC:DD:EE:01", Some("Phone"), Some(-40));
        h.pump();
        h.session.stop_scan().await;
        assert_eq!(h.session.status(), &DiscoveryStatus::Finished);
        assert_eq!(h.session.devices().len(), 1);
    }

    #[tokio::test]
    async fn failed_cancel_still_stops() {
        let mut h = Harness::new(ScannerConfig::default());
        h.radio
            .set_cancel_result(Err(Error::Other("adapter busy".to_owned())));
        h.session.start_scan().await.unwrap();
        h.session.take_events();

        h.session.stop_scan().await;

        assert!(!h.session.is_scanning());
        assert!(!h.radio.is_listening());
        assert_eq!(
            h.session.take_events(),
            [
                SessionEvent::Error("Failed to stop discovery: adapter busy".to_owned()),
                SessionEvent::StatusChanged(DiscoveryStatus::Idle),
            ]
        );
    }

    #[tokio::test]
    async fn refused_cancel_is_reported() {
        let mut h = Harness::new(ScannerConfig::default());
        h.radio.set_cancel_result(Ok(false));
        h.session.start_scan().await.unwrap();
        h.session.stop_scan().await;
        assert!(!h.session.is_scanning());
        assert!(h
            .session
            .take_events()
            .contains(&SessionEvent::Error(
                "Failed to stop discovery: platform refused to cancel discovery".to_owned()
            )));
    }

    #[tokio::test]
    async fn cancel_skipped_without_scan_permission() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        h.permissions.set_scan(false);
        h.session.take_events();

        h.session.stop_scan().await;

        assert_eq!(h.radio.cancel_calls(), 0);
        assert!(!h.session.is_scanning());
        assert_eq!(
            h.session.take_events()[0],
            SessionEvent::Error("Missing Bluetooth permission: BLUETOOTH_SCAN".to_owned())
        );
    }

    #[tokio::test]
    async fn finished_after_stop_does_not_resurrect() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        let listener = h.radio.listener().unwrap();
        h.session.stop_scan().await;
        h.session.take_events();

        // The platform was already delivering this when the stop went through.
        assert!(listener.discovery_finished());
        h.pump();

        assert!(!h.session.is_scanning());
        assert_eq!(h.session.status(), &DiscoveryStatus::Idle);
        assert!(h.session.take_events().is_empty());
        assert_eq!(h.radio.unregister_calls(), 1);
    }

    #[tokio::test]
    async fn stop_after_finish_unregisters_once() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        h.radio.finish();
        h.pump();
        h.session.stop_scan().await;
        h.session.stop_scan().await;

        assert_eq!(h.radio.unregister_calls(), 1);
        assert_eq!(h.radio.cancel_calls(), 0);
        assert_eq!(h.session.status(), &DiscoveryStatus::Finished);
    }

    #[tokio::test]
    async fn stale_events_from_previous_scan_are_dropped() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        let old = h.radio.listener().unwrap();
        h.session.stop_scan().await;
        h.session.start_scan().await.unwrap();

        old.device_found(
            RawDevice {
                address: "AA:BB:CC:DD:EE:09".to_owned(),
                name: Some("Ghost".to_owned()),
                bond_state: BondState::NotPaired,
            },
            Some(-90),
        );
        old.discovery_finished();
        h.pump();

        assert!(h.session.is_scanning());
        assert!(h.session.devices().is_empty());
    }

    #[tokio::test]
    async fn new_scan_resets_registry() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        h.radio.found("AA:BB:CC:DD:EE:01", Some("Phone"), None);
        h.radio.finish();
        h.pump();
        assert_eq!(h.session.devices().len(), 1);

        h.session.start_scan().await.unwrap();
        assert!(h.session.devices().is_empty());
        assert!(h.session.is_scanning());
    }

    #[tokio::test]
    async fn found_without_connect_permission_is_dropped() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        h.permissions.set_connect(false);
        h.session.take_events();

        h.radio.found("AA:BB:CC:DD:EE:01", Some("Phone"), None);
        h.pump();

        assert!(h.session.devices().is_empty());
        assert!(h.session.is_scanning());
        assert_eq!(
            h.session.take_events(),
            [SessionEvent::Error(
                "Missing Bluetooth permission: BLUETOOTH_CONNECT".to_owned()
            )]
        );
    }

    #[tokio::test]
    async fn short_address_is_kept_as_reported() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();

        assert!(h.radio.found("AA:BB", Some("Phone"), Some(-40)));
        assert!(h.radio.found("AA:BB", Some("Phone2"), Some(-30)));
        assert!(h.radio.finish());
        h.pump();

        assert_eq!(
            h.session.devices(),
            [DiscoveredDevice {
                name: "Phone".to_owned(),
                address: addr("AA:BB"),
                rssi: Some(-40),
                bond_state: BondState::Paired,
            }]
        );
        assert!(!h.session.is_scanning());
        assert_eq!(h.session.status(), &DiscoveryStatus::Finished);
    }

    #[tokio::test]
    async fn odd_identifiers_are_never_dropped() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.start_scan().await.unwrap();
        h.radio.found("not-an-address", Some("Phone"), None);
        h.radio.found("", None, None);
        h.pump();

        let addresses: Vec<_> = h
            .session
            .devices()
            .iter()
            .map(|d| d.address.as_str())
            .collect();
        assert_eq!(addresses, ["not-an-address", ""]);
        assert_eq!(h.session.devices()[1].name, "Unknown");
    }

    #[tokio::test]
    async fn refused_begin_enters_error() {
        let mut h = Harness::new(ScannerConfig::default());
        h.radio.set_begin_result(Ok(false));

        let result = h.session.start_scan().await;

        assert!(matches!(result, Err(Error::StartFailed(_))));
        assert!(!h.session.is_scanning());
        assert!(!h.radio.is_listening());
        assert_eq!(
            h.session.status(),
            &DiscoveryStatus::Error(
                "Failed to start discovery: platform refused to begin discovery".to_owned()
            )
        );

        h.radio.set_begin_result(Ok(true));
        h.session.start_scan().await.unwrap();
        assert!(h.session.is_scanning());
    }

    #[tokio::test]
    async fn permission_flow() {
        let mut h = Harness::new(ScannerConfig::default());
        h.session.perform(SessionAction::AwaitPermission).await.unwrap();
        assert_eq!(h.session.status(), &DiscoveryStatus::AwaitingPermission);
        h.session.perform(SessionAction::PermissionDenied).await.unwrap();
        assert_eq!(h.session.status(), &DiscoveryStatus::Idle);

        h.session.perform(SessionAction::AwaitPermission).await.unwrap();
        h.radio.set_enabled(false);
        assert_eq!(
            h.session.perform(SessionAction::StartScan).await,
            Err(Error::RadioDisabled)
        );
        assert_eq!(h.session.status(), &DiscoveryStatus::Idle);
    }

    #[tokio::test]
    async fn check_radio_reports_state() {
        let mut h = Harness::new(ScannerConfig::default());
        h.radio.set_enabled(false);
        assert!(!h.session.check_radio().await);
        assert_eq!(
            h.session.take_events(),
            [SessionEvent::RadioStateChanged { enabled: false }]
        );
    }
}
