//! Round handler contract

use super::{Peer, Peers, ProtocolMessage};
use crate::Result;
use std::any::Any;

/// Upcast to [`Any`] so a terminal handler can be matched by its concrete type
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Outcome of finalizing a round
pub enum Advance<M: ProtocolMessage> {
    /// Continue with the handler of the next round
    Next(Box<dyn Handler<M>>),
    /// The chain is exhausted; the handler holds the result state
    Done(Box<dyn Handler<M>>),
}

/// Protocol logic for exactly one round
///
/// `handle` runs once per inbound message and must be order independent;
/// `finalize` runs exactly once, after `required_count` peers delivered the
/// round's message type, and computes whatever needs the full peer set.
pub trait Handler<M: ProtocolMessage>: AsAny + Send {
    /// The single message type this round consumes
    fn message_type(&self) -> M::Kind;

    /// Number of distinct peers that must deliver before finalize
    fn required_count(&self) -> usize;

    /// Whether `peer` already delivered this round's message
    fn is_handled(&self, peer: &Peer<M>) -> bool {
        peer.has_message(self.message_type())
    }

    /// Validate and apply one message
    ///
    /// May send at most one message, to one peer or broadcast. Any error is
    /// fatal to the protocol instance.
    fn handle(&mut self, peers: &Peers<M>, message: &M) -> Result<()>;

    /// Aggregate the round and produce the next handler
    fn finalize(self: Box<Self>, peers: &Peers<M>) -> Result<Advance<M>>;

    /// Message broadcast when the protocol starts (initial handler only)
    fn first_message(&self) -> Option<M> {
        None
    }
}
