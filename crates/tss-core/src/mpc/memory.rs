//! In-memory transport implementation for testing

use super::PeerManager;
use crate::{Error, PeerId, Result};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};

type Link = mpsc::UnboundedSender<Vec<u8>>;

/// A fully connected set of in-memory peers
///
/// Frames are JSON encoded, so every message crosses the same codec a real
/// transport would use.
pub struct MemoryNetwork {
    /// Peer identities, in creation order
    ids: Vec<PeerId>,
    /// Sending half of every peer's inbox
    links: Arc<DashMap<PeerId, Link>>,
    /// Receiving halves not yet claimed
    inboxes: DashMap<PeerId, mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryNetwork {
    /// Create a network with one inbox per identity
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PeerId>,
    {
        let ids: Vec<PeerId> = ids.into_iter().map(Into::into).collect();
        let links = Arc::new(DashMap::new());
        let inboxes = DashMap::new();
        for id in &ids {
            let (tx, rx) = mpsc::unbounded_channel();
            links.insert(id.clone(), tx);
            inboxes.insert(id.clone(), rx);
        }
        Self {
            ids,
            links,
            inboxes,
        }
    }

    pub fn ids(&self) -> &[PeerId] {
        &self.ids
    }

    /// Outbound handle for `id`; every other peer is remote
    pub fn peer_manager<M>(&self, id: &str) -> Result<Arc<MemoryPeerManager<M>>>
    where
        M: Serialize + 'static,
    {
        if !self.ids.iter().any(|p| p == id) {
            return Err(Error::UnknownPeer(id.to_string()));
        }
        Ok(Arc::new(MemoryPeerManager {
            self_id: id.to_string(),
            peers: self.ids.iter().filter(|p| *p != id).cloned().collect(),
            links: self.links.clone(),
            _message: PhantomData,
        }))
    }

    /// Claim the inbound side of `id`; succeeds once
    pub fn take_inbox(&self, id: &str) -> Option<Inbox> {
        self.inboxes.remove(id).map(|(id, rx)| Inbox { id, rx })
    }
}

/// Outbound handle of one peer on a [`MemoryNetwork`]
pub struct MemoryPeerManager<M> {
    self_id: PeerId,
    peers: Vec<PeerId>,
    links: Arc<DashMap<PeerId, Link>>,
    _message: PhantomData<fn(&M)>,
}

impl<M: Serialize> PeerManager<M> for MemoryPeerManager<M> {
    fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    fn num_peers(&self) -> usize {
        self.peers.len()
    }

    fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.clone()
    }

    fn must_send(&self, to: &PeerId, message: &M) {
        let bytes = match serialize(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(from = %self.self_id, to = %to, error = %e, "Failed to encode message");
                return;
            }
        };
        match self.links.get(to) {
            Some(link) => {
                trace!(from = %self.self_id, to = %to, len = bytes.len(), "Sending frame");
                if link.send(bytes).is_err() {
                    warn!(from = %self.self_id, to = %to, "Peer inbox closed");
                }
            }
            None => warn!(from = %self.self_id, to = %to, "No link to peer"),
        }
    }
}

/// Inbound frames of one peer
pub struct Inbox {
    id: PeerId,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Inbox {
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Next decoded message, or `None` once every sender is gone
    pub async fn recv<M: DeserializeOwned>(&mut self) -> Option<Result<M>> {
        let bytes = self.rx.recv().await?;
        Some(deserialize(&bytes))
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestMessage {
        value: u32,
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_other_peer() {
        let network = MemoryNetwork::new(["a", "b", "c"]);
        let pm = network.peer_manager::<TestMessage>("a").unwrap();
        assert_eq!(pm.num_peers(), 2);
        assert_eq!(pm.peer_ids(), vec!["b".to_string(), "c".to_string()]);

        pm.broadcast(&TestMessage { value: 42 });

        for id in ["b", "c"] {
            let mut inbox = network.take_inbox(id).unwrap();
            let message: TestMessage = inbox.recv().await.unwrap().unwrap();
            assert_eq!(message.value, 42);
        }
    }

    #[tokio::test]
    async fn test_direct_send_preserves_order() {
        let network = MemoryNetwork::new(["a", "b"]);
        let pm = network.peer_manager::<TestMessage>("a").unwrap();
        let mut inbox = network.take_inbox("b").unwrap();

        pm.must_send(&"b".to_string(), &TestMessage { value: 1 });
        pm.must_send(&"b".to_string(), &TestMessage { value: 2 });

        let first: TestMessage = inbox.recv().await.unwrap().unwrap();
        let second: TestMessage = inbox.recv().await.unwrap().unwrap();
        assert_eq!((first.value, second.value), (1, 2));
    }

    #[test]
    fn test_unknown_peer_and_single_inbox_claim() {
        let network = MemoryNetwork::new(["a"]);
        assert!(matches!(
            network.peer_manager::<TestMessage>("z"),
            Err(Error::UnknownPeer(_))
        ));
        assert!(network.take_inbox("a").is_some());
        assert!(network.take_inbox("a").is_none());
    }
}
