//! Event publishing/subscription abstraction (mechanics only).
//!
//! Two streams run over this abstraction:
//!
//! ```text
//! catalog service ──CatalogChange──▶ bus ──▶ change worker ──▶ ReadinessService
//! ReadinessService ──InspectionEvent──▶ bus ──▶ readiness feedback, eligibility, UIs
//! ```
//!
//! Delivery is at-least-once and unordered across publishers. Every consumer in
//! this workspace is idempotent: re-running a reconciliation for unchanged data
//! commits nothing and emits nothing.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription receives its own copy of every message published after it
/// was created. Meant to be drained by a single thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Transport-agnostic pub/sub bus with broadcast semantics.
///
/// `publish` may fail (closed transport, poisoned lock); callers surface the
/// failure rather than dropping it.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;

    /// Publish several messages in order, stopping at the first failure.
    fn publish_all(&self, messages: impl IntoIterator<Item = M>) -> Result<(), Self::Error>
    where
        Self: Sized,
    {
        for message in messages {
            self.publish(message)?;
        }
        Ok(())
    }
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
