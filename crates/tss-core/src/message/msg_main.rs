//! The protocol state machine

use super::{
    Advance, Handler, MessageMain, Peers, ProtocolMessage, State, StateChangedListener,
};
use crate::mpc::PeerManager;
use crate::{Error, PeerId, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Drives a chain of round handlers for one protocol instance
///
/// State, peer table, active handler and buffered messages live behind a
/// single lock, so recording a message, checking completion and finalizing a
/// round happen atomically: two concurrent arrivals for the last two required
/// peers finalize the round exactly once.
pub struct MsgMain<M: ProtocolMessage> {
    self_id: PeerId,
    /// Every message type of the chain, in round order
    msg_types: Vec<M::Kind>,
    peer_manager: Arc<dyn PeerManager<M>>,
    listener: Arc<dyn StateChangedListener>,
    inner: Mutex<Inner<M>>,
}

struct Inner<M: ProtocolMessage> {
    state: State,
    handler: Option<Box<dyn Handler<M>>>,
    peers: Peers<M>,
    /// Messages of later rounds, in arrival order
    pending: Vec<M>,
}

/// A state change to report once the lock is released
struct Transition {
    old: State,
    new: State,
    error: Option<Error>,
}

impl<M: ProtocolMessage> MsgMain<M> {
    /// Create an engine in the `Init` state
    ///
    /// `msg_types` lists every message type of the chain in round order; it
    /// decides whether an early message is buffered or rejected.
    pub fn new(
        peer_manager: Arc<dyn PeerManager<M>>,
        peers: Peers<M>,
        listener: Arc<dyn StateChangedListener>,
        handler: Box<dyn Handler<M>>,
        msg_types: Vec<M::Kind>,
    ) -> Result<Self> {
        if peers.len() != peer_manager.num_peers() {
            return Err(Error::InvalidConfig(format!(
                "peer set has {} peers, peer manager has {}",
                peers.len(),
                peer_manager.num_peers()
            )));
        }
        if let Some(missing) = peer_manager
            .peer_ids()
            .into_iter()
            .find(|id| !peers.contains(id))
        {
            return Err(Error::InvalidConfig(format!(
                "peer {} missing from peer set",
                missing
            )));
        }
        if msg_types.is_empty() {
            return Err(Error::InvalidConfig("no message types registered".into()));
        }
        if msg_types
            .iter()
            .enumerate()
            .any(|(i, kind)| msg_types[..i].contains(kind))
        {
            return Err(Error::InvalidConfig("duplicate message type".into()));
        }
        if !msg_types.contains(&handler.message_type()) {
            return Err(Error::InvalidConfig(format!(
                "initial message type {:?} not registered",
                handler.message_type()
            )));
        }

        Ok(Self {
            self_id: peer_manager.self_id().clone(),
            msg_types,
            peer_manager,
            listener,
            inner: Mutex::new(Inner {
                state: State::Init,
                handler: Some(handler),
                peers,
                pending: Vec::new(),
            }),
        })
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    /// Move to `Running` and broadcast the initial handler's first message
    pub fn start(&self) -> Result<()> {
        let mut transitions = Vec::new();
        let started = self.lock().and_then(|mut inner| {
            if inner.state != State::Init {
                return Err(Error::AlreadyStarted);
            }
            inner.transition(State::Running, None, &mut transitions);
            let first = inner.handler.as_ref().and_then(|h| h.first_message());
            inner.advance(&mut transitions)?;
            Ok(first)
        });
        self.notify(transitions);

        let first = started?;
        info!(peer = %self.self_id, "Protocol started");
        if let Some(message) = first {
            self.peer_manager.broadcast(&message);
        }
        Ok(())
    }

    /// Route one inbound message to the active round
    pub fn handle_message(&self, message: M) -> Result<()> {
        let mut transitions = Vec::new();
        let result = self
            .lock()
            .and_then(|mut inner| inner.process(&self.msg_types, message, &mut transitions));
        self.notify(transitions);
        result
    }

    /// Current lifecycle state
    pub fn state(&self) -> State {
        self.lock().map(|inner| inner.state).unwrap_or(State::Failed)
    }

    /// Message type of the active round, if any
    pub fn active_message_type(&self) -> Option<M::Kind> {
        self.lock()
            .ok()
            .and_then(|inner| inner.handler.as_ref().map(|h| h.message_type()))
    }

    /// Run `f` on the terminal handler
    ///
    /// Fails with `NotReady` unless the protocol is done and the terminal
    /// handler is an `H`.
    pub fn with_final_handler<H: 'static, R>(&self, f: impl FnOnce(&H) -> R) -> Result<R> {
        let inner = self.lock()?;
        if inner.state != State::Done {
            return Err(Error::NotReady);
        }
        let handler: &dyn Handler<M> = inner.handler.as_deref().ok_or(Error::NotReady)?;
        match handler.as_any().downcast_ref::<H>() {
            Some(typed) => Ok(f(typed)),
            None => {
                warn!(peer = %self.self_id, "Terminal handler has unexpected type");
                Err(Error::NotReady)
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<M>>> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("engine lock poisoned".into()))
    }

    fn notify(&self, transitions: Vec<Transition>) {
        for transition in transitions {
            if let Some(error) = &transition.error {
                self.listener.on_error(error);
            }
            if transition.new == State::Done {
                info!(peer = %self.self_id, "Protocol done");
            }
            self.listener
                .on_state_changed(transition.old, transition.new);
        }
    }
}

impl<M: ProtocolMessage> MessageMain<M> for MsgMain<M> {
    fn handle_message(&self, message: M) -> Result<()> {
        MsgMain::handle_message(self, message)
    }

    fn state(&self) -> State {
        MsgMain::state(self)
    }
}

impl<M: ProtocolMessage> Inner<M> {
    fn process(
        &mut self,
        msg_types: &[M::Kind],
        message: M,
        transitions: &mut Vec<Transition>,
    ) -> Result<()> {
        match self.state {
            State::Init => return Err(Error::NotReady),
            State::Done | State::Failed => return Err(Error::AlreadyTerminated),
            State::Running => {}
        }

        let sender = message.sender();
        if !self.peers.contains(sender) {
            return Err(Error::UnknownPeer(sender.clone()));
        }

        let active = self
            .handler
            .as_ref()
            .map(|h| h.message_type())
            .ok_or_else(|| Error::Internal("no active handler".into()))?;
        let kind = message.message_type();
        if kind != active {
            let position = |k: M::Kind| msg_types.iter().position(|t| *t == k);
            return match (position(kind), position(active)) {
                (Some(got), Some(current)) if got > current => self.buffer(message),
                _ => Err(Error::WrongMessageType {
                    expected: format!("{:?}", active),
                    got: format!("{:?}", kind),
                }),
            };
        }

        self.deliver(message, transitions)?;
        self.advance(transitions)
    }

    /// Hold a message of a later round until that round is active
    fn buffer(&mut self, message: M) -> Result<()> {
        let kind = message.message_type();
        let sender = message.sender();
        if self
            .pending
            .iter()
            .any(|m| m.message_type() == kind && m.sender() == sender)
        {
            return Err(Error::DuplicateMessage {
                peer: sender.clone(),
                message_type: format!("{:?}", kind),
            });
        }
        debug!(from = %sender, message_type = ?kind, "Buffering message of a later round");
        self.pending.push(message);
        Ok(())
    }

    /// Hand a message of the active type to the handler and record it
    fn deliver(&mut self, message: M, transitions: &mut Vec<Transition>) -> Result<()> {
        let kind = message.message_type();
        let sender = message.sender().clone();
        let peer = self
            .peers
            .get(&sender)
            .ok_or_else(|| Error::UnknownPeer(sender.clone()))?;
        if peer.has_message(kind) {
            return Err(Error::DuplicateMessage {
                peer: sender,
                message_type: format!("{:?}", kind),
            });
        }

        let handler = self
            .handler
            .as_mut()
            .ok_or_else(|| Error::Internal("no active handler".into()))?;
        if let Err(err) = handler.handle(&self.peers, &message) {
            debug!(from = %sender, message_type = ?kind, error = %err, "Handler rejected message");
            return Err(self.fail(err, transitions));
        }

        match self.peers.get_mut(&sender) {
            Some(peer) => peer.add_message(message),
            None => Err(Error::UnknownPeer(sender)),
        }
    }

    fn round_complete(&self) -> bool {
        match &self.handler {
            Some(handler) => {
                let satisfied = self.peers.iter().filter(|p| handler.is_handled(p)).count();
                satisfied >= handler.required_count()
            }
            None => false,
        }
    }

    /// Finalize rounds while their completion condition holds
    fn advance(&mut self, transitions: &mut Vec<Transition>) -> Result<()> {
        while self.state == State::Running && self.round_complete() {
            let handler = self
                .handler
                .take()
                .ok_or_else(|| Error::Internal("no active handler".into()))?;
            let finished = handler.message_type();
            debug!(message_type = ?finished, "Round complete");

            match handler.finalize(&self.peers) {
                Err(err) => return Err(self.fail(err, transitions)),
                Ok(Advance::Done(handler)) => {
                    self.handler = Some(handler);
                    self.pending.clear();
                    self.transition(State::Done, None, transitions);
                }
                Ok(Advance::Next(next)) => {
                    let kind = next.message_type();
                    if kind == finished {
                        let err = Error::Internal(format!("round {:?} advanced to itself", kind));
                        return Err(self.fail(err, transitions));
                    }
                    self.peers.reset_all();
                    self.handler = Some(next);
                    debug!(message_type = ?kind, "Advanced to next round");

                    let (ready, rest): (Vec<M>, Vec<M>) = std::mem::take(&mut self.pending)
                        .into_iter()
                        .partition(|m| m.message_type() == kind);
                    self.pending = rest;
                    for message in ready {
                        if self.round_complete() {
                            warn!(from = %message.sender(), "Dropping surplus buffered message");
                            continue;
                        }
                        self.deliver(message, transitions)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn fail(&mut self, err: Error, transitions: &mut Vec<Transition>) -> Error {
        warn!(error = %err, "Protocol failed");
        self.pending.clear();
        self.transition(State::Failed, Some(err.clone()), transitions);
        err
    }

    fn transition(&mut self, new: State, error: Option<Error>, transitions: &mut Vec<Transition>) {
        let old = self.state;
        self.state = new;
        transitions.push(Transition { old, new, error });
    }
}
