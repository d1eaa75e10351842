//! The network-facing collaborator interface
//!
//! The fetch engine never talks to a socket directly; it is driven entirely
//! through this trait, supplied by an external collaborator (a real
//! forwarder connection, or — in tests and the bundled demo binary — an
//! in-memory fake). This mirrors `spec.md` §6's `Face` contract:
//! `express` asynchronously sends an Interest and delivers exactly one of
//! Data, Nack, or timeout.
//!
//! Idiomatic translation note: the original contract models cancellation as
//! an explicit `cancel(pendingHandle)` call that the network layer must
//! honor by suppressing further callbacks. In async Rust, dropping a
//! [`PendingInterest`] without awaiting it achieves the same thing for free
//! — the `Face` implementation observes the channel's receiver has gone
//! away and stops delivering to it. There is deliberately no separate
//! `cancel` method.

use tokio::sync::oneshot;

use crate::packet::{Data, Interest, Nack};

/// The single event a [`PendingInterest`] eventually resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceEvent {
    /// Matching Data arrived
    Data(Data),
    /// The Interest was rejected
    Nack(Nack),
    /// The Interest's lifetime elapsed with no reply
    Timeout,
}

/// A handle to one outstanding Interest expression.
///
/// Awaiting [`PendingInterest::wait`] yields exactly one [`FaceEvent`].
/// Dropping the handle instead cancels interest in the outcome; per
/// `spec.md` §5, no event is ever delivered after that point.
pub struct PendingInterest {
    rx: oneshot::Receiver<FaceEvent>,
}

impl PendingInterest {
    /// Wrap a raw event channel, typically produced by a [`Face`]
    /// implementation's `express`.
    pub fn new(rx: oneshot::Receiver<FaceEvent>) -> Self {
        PendingInterest { rx }
    }

    /// Wait for the single event this Interest resolves to.
    ///
    /// Returns `None` only if the `Face` implementation dropped its sender
    /// without producing an event, which a conformant `Face` never does
    /// while the handle is alive.
    pub async fn wait(self) -> Option<FaceEvent> {
        self.rx.await.ok()
    }
}

/// The network layer consumed by the fetch engine.
///
/// Implementations must deliver exactly one of `Data`, `Nack`, or `Timeout`
/// per call to `express`, unless the returned [`PendingInterest`] is
/// dropped first.
pub trait Face: Send + Sync {
    /// Asynchronously send `interest`, returning a handle for its eventual
    /// outcome.
    fn express(&self, interest: Interest) -> PendingInterest;
}
