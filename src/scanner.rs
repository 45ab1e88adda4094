// bluescan Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The scanner actor.
//!
//! A [`Scanner`] runs one tokio task that owns a [`DiscoverySession`]. User intents and radio
//! callbacks are merged into a single queue and handled one at a time, so the device registry and
//! session status are never written concurrently. After every step the resulting [`UiState`] is
//! published on a watch channel and any [`UiEffect`] is fanned out to effect subscribers.

use crate::api::{PermissionOracle, RadioEvent, RadioProvider, SessionId};
use crate::common::util::{send_notification, Subscribers};
use crate::config::ScannerConfig;
use crate::presentation::{reduce, Input, Intent, Transition, UiEffect, UiState};
use crate::session::{DiscoverySession, SessionAction, SessionEvent};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use log::{debug, trace, warn};
use static_assertions::assert_impl_all;
use std::fmt::Debug;
use std::pin::Pin;
use std::sync::{Arc, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

assert_impl_all!(Scanner: Debug, Send, Sync);
assert_impl_all!(UiState: Clone, Debug, Send, Sync);
assert_impl_all!(UiEffect: Clone, Debug, Send, Sync);

#[derive(Debug)]
enum Message {
    Intent(Intent),
    Radio(SessionId, RadioEvent),
    Shutdown,
}

/// Handle to a running scanner task.
///
/// Dropping the handle (or calling [`Scanner::shutdown`]) stops any running scan and ends the task.
#[derive(Debug)]
pub struct Scanner {
    intents: UnboundedSender<Intent>,
    state: watch::Receiver<UiState>,
    effects: Subscribers<UiEffect>,
    task: JoinHandle<()>,
}

impl Scanner {
    /// Spawns the scanner task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn<R, P>(radio: R, permissions: P, config: ScannerConfig) -> Self
    where
        R: RadioProvider + 'static,
        P: PermissionOracle + 'static,
    {
        let (intents, intent_receiver) = mpsc::unbounded();
        let (radio_sink, radio_receiver) = mpsc::unbounded();
        let (state_sender, state) = watch::channel(UiState::default());
        let effects: Subscribers<UiEffect> = Arc::default();

        let inbox = stream::select(
            intent_receiver
                .map(Message::Intent)
                .chain(stream::once(future::ready(Message::Shutdown))),
            radio_receiver.map(|(session, event)| Message::Radio(session, event)),
        );
        let worker = Worker {
            session: DiscoverySession::new(radio, permissions, config, radio_sink),
            state: state_sender,
            effects: effects.clone(),
        };
        let task = tokio::spawn(worker.run(inbox));

        Scanner {
            intents,
            state,
            effects,
            task,
        }
    }

    /// Queues an intent. Returns `false` if the scanner task is gone.
    pub fn dispatch(&self, intent: Intent) -> bool {
        if let Err(e) = self.intents.unbounded_send(intent) {
            warn!("Scanner task is gone, dropping {:?}", e.into_inner());
            return false;
        }
        true
    }

    /// The latest published state.
    pub fn state(&self) -> UiState {
        self.state.borrow().clone()
    }

    /// Stream of states, starting with the current one. Intermediate states may be skipped if the
    /// consumer falls behind, but the latest state is always delivered.
    pub fn states(&self) -> Pin<Box<dyn Stream<Item = UiState> + Send>> {
        Box::pin(WatchStream::new(self.state.clone()))
    }

    /// Stream of effects emitted after this call. Effects are not replayed.
    pub fn effects(&self) -> Pin<Box<dyn Stream<Item = UiEffect> + Send>> {
        let (sender, receiver) = mpsc::unbounded();
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        Box::pin(receiver)
    }

    /// Stops any running scan and waits for the task to finish.
    pub async fn shutdown(self) {
        let Scanner { intents, task, .. } = self;
        drop(intents);
        if let Err(e) = task.await {
            warn!("Scanner task ended abnormally: {}", e);
        }
    }
}

struct Worker<R, P> {
    session: DiscoverySession<R, P>,
    state: watch::Sender<UiState>,
    effects: Subscribers<UiEffect>,
}

impl<R, P> Worker<R, P>
where
    R: RadioProvider,
    P: PermissionOracle,
{
    async fn run(mut self, mut inbox: impl Stream<Item = Message> + Unpin) {
        while let Some(message) = inbox.next().await {
            match message {
                Message::Intent(intent) => {
                    debug!("Handling {:?}", intent);
                    self.handle(Input::Intent(intent)).await;
                }
                Message::Radio(session, event) => {
                    self.session.handle_radio_event(session, event);
                    self.flush();
                }
                Message::Shutdown => {
                    debug!("Scanner handle dropped, shutting down");
                    if self.session.is_scanning() {
                        self.session.stop_scan().await;
                        self.flush();
                    }
                    break;
                }
            }
        }
        trace!("Scanner task finished");
    }

    async fn handle(&mut self, input: Input) {
        let Some(action) = self.step(input) else {
            return;
        };
        let result = self.session.perform(action).await;
        self.flush();
        if let Err(e) = result {
            debug!("{:?} failed: {}", action, e);
            self.step(SessionEvent::Error(e.to_string()).into());
        }
    }

    /// Runs the reducer once and publishes its outcome.
    fn step(&mut self, input: Input) -> Option<SessionAction> {
        let Transition {
            state,
            effect,
            action,
        } = reduce(&self.state.borrow(), input);
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if let Some(effect) = effect {
            if send_notification(&self.effects, &effect) == 0 {
                trace!("No effect subscribers for {:?}", effect);
            }
        }
        action
    }

    fn flush(&mut self) {
        for event in self.session.take_events() {
            if let Some(action) = self.step(event.into()) {
                warn!("Session event produced unexpected action {:?}", action);
            }
        }
    }
}
