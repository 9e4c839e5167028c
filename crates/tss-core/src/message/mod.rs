//! Generic round-based protocol engine
//!
//! A protocol is a chain of [`Handler`]s, one per round. [`MsgMain`] owns the
//! active handler and the fixed [`Peers`] set, routes inbound messages to the
//! handler and advances the chain once every required peer has delivered the
//! round's message type.

mod handler;
mod listener;
mod msg_main;
mod peer;

pub use handler::{Advance, AsAny, Handler};
pub use listener::{NoopListener, StateChangedListener, StateWatcher};
pub use msg_main::MsgMain;
pub use peer::{Peer, Peers};

use crate::{PeerId, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::hash::Hash;

/// A protocol message envelope: a type tag, a sender and a body
///
/// The engine only ever inspects the tag and the sender.
pub trait ProtocolMessage: Clone + Debug + Send + Sync + 'static {
    /// Message type tag
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Type tag of this message
    fn message_type(&self) -> Self::Kind;

    /// Identity of the sending peer
    fn sender(&self) -> &PeerId;
}

/// Lifecycle state of a protocol instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    /// Constructed, not started
    Init,
    /// Started, accepting messages
    Running,
    /// Handler chain exhausted, result available
    Done,
    /// A handler failed; terminal
    Failed,
}

impl State {
    /// Whether no further message will be accepted
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Done | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Init => "init",
            State::Running => "running",
            State::Done => "done",
            State::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Anything that accepts inbound protocol messages
///
/// Implemented by the engine and by every protocol façade, so a transport
/// can deliver into either.
pub trait MessageMain<M>: Send + Sync {
    /// Deliver one inbound message
    fn handle_message(&self, message: M) -> Result<()>;

    /// Current lifecycle state
    fn state(&self) -> State;
}
