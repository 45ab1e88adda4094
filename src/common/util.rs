// bluescan Source Code File
//
// Copyright 2020 Nonpolynomial. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use futures::channel::mpsc::UnboundedSender;
use std::sync::{Arc, Mutex, PoisonError};

/// A list of subscribers that each get a copy of every published item.
pub type Subscribers<T> = Arc<Mutex<Vec<UnboundedSender<T>>>>;

/// Sends `item` to every subscriber, returning how many received it.
pub fn send_notification<T: Clone>(subscribers: &Subscribers<T>, item: &T) -> usize {
    let mut senders = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
    // Remove sender from the list if the other end of the channel has been dropped.
    senders.retain(|sender| sender.unbounded_send(item.clone()).is_ok());
    senders.len()
}
