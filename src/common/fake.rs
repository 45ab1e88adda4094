//! In-memory radio and permission doubles for tests.

use crate::api::{BondState, PermissionOracle, RadioListener, RadioProvider, RawDevice};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

#[derive(Debug)]
struct RadioState {
    enabled: bool,
    begin_result: Result<bool>,
    cancel_result: Result<bool>,
    listener: Option<RadioListener>,
    begin_calls: usize,
    cancel_calls: usize,
    unregister_calls: usize,
}

/// Radio whose command results are scripted and whose events are pushed by the test.
#[derive(Debug)]
pub(crate) struct FakeRadio {
    state: Mutex<RadioState>,
}

impl FakeRadio {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(FakeRadio {
            state: Mutex::new(RadioState {
                enabled: true,
                begin_result: Ok(true),
                cancel_result: Ok(true),
                listener: None,
                begin_calls: 0,
                cancel_calls: 0,
                unregister_calls: 0,
            }),
        })
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.state.lock().unwrap().enabled = enabled;
    }

    pub(crate) fn set_begin_result(&self, result: Result<bool>) {
        self.state.lock().unwrap().begin_result = result;
    }

    pub(crate) fn set_cancel_result(&self, result: Result<bool>) {
        self.state.lock().unwrap().cancel_result = result;
    }

    pub(crate) fn listener(&self) -> Option<RadioListener> {
        self.state.lock().unwrap().listener.clone()
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.state.lock().unwrap().listener.is_some()
    }

    pub(crate) fn begin_calls(&self) -> usize {
        self.state.lock().unwrap().begin_calls
    }

    pub(crate) fn cancel_calls(&self) -> usize {
        self.state.lock().unwrap().cancel_calls
    }

    pub(crate) fn unregister_calls(&self) -> usize {
        self.state.lock().unwrap().unregister_calls
    }

    /// Reports a device to the registered listener, like the OS would.
    pub(crate) fn found(&self, address: &str, name: Option<&str>, rssi: Option<i16>) -> bool {
        self.listener().is_some_and(|listener| {
            listener.device_found(
                RawDevice {
                    address: address.to_owned(),
                    name: name.map(str::to_owned),
                    bond_state: BondState::Paired,
                },
                rssi,
            )
        })
    }

    pub(crate) fn finish(&self) -> bool {
        self.listener()
            .is_some_and(|listener| listener.discovery_finished())
    }
}

#[async_trait]
impl RadioProvider for FakeRadio {
    async fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    async fn begin_discovery(&self) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.begin_calls += 1;
        state.begin_result.clone()
    }

    async fn cancel_discovery(&self) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.cancel_calls += 1;
        state.cancel_result.clone()
    }

    fn register_listener(&self, listener: RadioListener) -> Result<()> {
        self.state.lock().unwrap().listener = Some(listener);
        Ok(())
    }

    fn unregister_listener(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.unregister_calls += 1;
        state
            .listener
            .take()
            .map(|_| ())
            .ok_or(Error::ReceiverAlreadyUnregistered)
    }
}

#[derive(Debug)]
pub(crate) struct FakePermissions {
    scan: AtomicBool,
    connect: AtomicBool,
}

impl FakePermissions {
    pub(crate) fn granted() -> Arc<Self> {
        Arc::new(FakePermissions {
            scan: AtomicBool::new(true),
            connect: AtomicBool::new(true),
        })
    }

    pub(crate) fn set_scan(&self, granted: bool) {
        self.scan.store(granted, Ordering::SeqCst);
    }

    pub(crate) fn set_connect(&self, granted: bool) {
        self.connect.store(granted, Ordering::SeqCst);
    }
}

impl PermissionOracle for FakePermissions {
    fn has_scan_permission(&self) -> bool {
        self.scan.load(Ordering::SeqCst)
    }

    fn has_connect_permission(&self) -> bool {
        self.connect.load(Ordering::SeqCst)
    }
}
