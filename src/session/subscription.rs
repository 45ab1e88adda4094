// bluescan Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use crate::api::{RadioListener, RadioProvider, SessionId};
use crate::{Error, Result};
use log::{debug, trace, warn};

/// Tracks whether the session currently has a listener registered with the radio.
///
/// Unregistering is idempotent: it only reaches the radio when a listener is known to be
/// registered, and a radio that reports the listener as already gone is not treated as a failure.
#[derive(Debug, Default)]
pub(crate) struct Subscription {
    active: Option<SessionId>,
}

impl Subscription {
    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn register<R>(&mut self, radio: &R, listener: RadioListener) -> Result<()>
    where
        R: RadioProvider + ?Sized,
    {
        if self.active.is_some() {
            self.unregister(radio);
        }
        let session = listener.session();
        radio.register_listener(listener)?;
        trace!("Registered radio listener for session {}", session);
        self.active = Some(session);
        Ok(())
    }

    pub(crate) fn unregister<R>(&mut self, radio: &R)
    where
        R: RadioProvider + ?Sized,
    {
        let Some(session) = self.active.take() else {
            trace!("Radio listener already unregistered");
            return;
        };
        match radio.unregister_listener() {
            Ok(()) => trace!("Unregistered radio listener for session {}", session),
            Err(Error::ReceiverAlreadyUnregistered) => {
                debug!("Radio dropped listener for session {} on its own", session)
            }
            Err(e) => warn!(
                "Failed to unregister radio listener for session {}: {}",
                session, e
            ),
        }
    }
}
