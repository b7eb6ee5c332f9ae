//! Cross-thread bridge onto the owning execution context.
//!
//! The scheduler tick loop, output pumps, and timer tasks never touch the
//! process registry or the notification sink directly. They post actions
//! here; the warden drains the queue on its single context, so everything
//! that mutates shared state runs serialized and in enqueue order.

use crate::warden::Warden;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// A deferred action executed on the owning context.
pub type Action = Box<dyn FnOnce(&mut Warden) + Send + 'static>;

/// Posting half of the action queue.
///
/// Cheap to clone; every background task holds one.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Action>,
}

impl Dispatcher {
    /// Creates the queue, returning the posting half and the receiver the
    /// warden drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Action>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueues an action. Order is preserved per sender and across all
    /// senders sharing this queue.
    ///
    /// A closed queue (warden shut down) is not an error; the action is
    /// dropped with a debug log, since there is no context left to run it.
    pub fn post(&self, action: impl FnOnce(&mut Warden) + Send + 'static) {
        if self.tx.send(Box::new(action)).is_err() {
            debug!("action queue closed, dropping posted action");
        }
    }

    /// Posts an action after `delay`, without blocking the caller.
    ///
    /// This is how grace-window checks and restart delays are expressed:
    /// the wait happens on a timer task, and the action still runs on the
    /// owning context. Must be called from within a tokio runtime.
    pub fn post_after(&self, delay: Duration, action: impl FnOnce(&mut Warden) + Send + 'static) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.post(action);
        });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
