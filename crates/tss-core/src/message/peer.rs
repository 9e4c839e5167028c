//! Per-peer round bookkeeping

use super::ProtocolMessage;
use crate::{Error, PeerId, Result};
use k256::Scalar;
use std::collections::{BTreeMap, HashMap};

/// One remote party as seen by a protocol instance
#[derive(Debug, Clone)]
pub struct Peer<M: ProtocolMessage> {
    id: PeerId,
    /// Messages received in the current round, by type
    messages: HashMap<M::Kind, M>,
    /// Interpolation coefficient derived from the full parameter set
    coefficient: Option<Scalar>,
}

impl<M: ProtocolMessage> Peer<M> {
    /// Create a peer with no messages and no coefficient
    pub fn new(id: impl Into<PeerId>) -> Self {
        Self {
            id: id.into(),
            messages: HashMap::new(),
            coefficient: None,
        }
    }

    /// Attach a derived interpolation coefficient
    pub fn with_coefficient(mut self, coefficient: Scalar) -> Self {
        self.coefficient = Some(coefficient);
        self
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn coefficient(&self) -> Option<Scalar> {
        self.coefficient
    }

    /// Record a message for the current round
    ///
    /// A second message of the same type is rejected, never overwritten.
    pub fn add_message(&mut self, message: M) -> Result<()> {
        let kind = message.message_type();
        if self.messages.contains_key(&kind) {
            return Err(Error::DuplicateMessage {
                peer: self.id.clone(),
                message_type: format!("{:?}", kind),
            });
        }
        self.messages.insert(kind, message);
        Ok(())
    }

    pub fn has_message(&self, kind: M::Kind) -> bool {
        self.messages.contains_key(&kind)
    }

    pub fn get_message(&self, kind: M::Kind) -> Option<&M> {
        self.messages.get(&kind)
    }

    /// Forget every message of the finished round
    pub fn reset(&mut self) {
        self.messages.clear();
    }
}

/// The fixed set of remote peers of a protocol instance
#[derive(Debug, Clone)]
pub struct Peers<M: ProtocolMessage> {
    peers: BTreeMap<PeerId, Peer<M>>,
}

impl<M: ProtocolMessage> Peers<M> {
    /// Build a peer set from identifiers
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PeerId>,
    {
        let peers = ids
            .into_iter()
            .map(|id| {
                let peer = Peer::new(id);
                (peer.id.clone(), peer)
            })
            .collect();
        Self { peers }
    }

    /// Build a peer set carrying interpolation coefficients
    pub fn with_coefficients<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (PeerId, Scalar)>,
    {
        let peers = entries
            .into_iter()
            .map(|(id, coefficient)| (id.clone(), Peer::new(id).with_coefficient(coefficient)))
            .collect();
        Self { peers }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Peer<M>> {
        self.peers.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Peer<M>> {
        self.peers.get_mut(id)
    }

    /// Peers in identifier order
    pub fn iter(&self) -> impl Iterator<Item = &Peer<M>> {
        self.peers.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }

    /// Reset the receipt mapping of every peer
    pub fn reset_all(&mut self) {
        self.peers.values_mut().for_each(Peer::reset);
    }
}
