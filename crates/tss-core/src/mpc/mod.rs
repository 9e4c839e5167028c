//! MPC coordination utilities

use crate::message::MessageMain;
use crate::PeerId;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outbound side of the transport, as seen by one protocol instance
///
/// Sending is fire-and-forget: the engine never waits on delivery, and
/// transport failures are logged by the implementation.
pub trait PeerManager<M>: Send + Sync {
    /// Identity of the local peer
    fn self_id(&self) -> &PeerId;

    /// Number of remote peers
    fn num_peers(&self) -> usize;

    /// Identities of the remote peers
    fn peer_ids(&self) -> Vec<PeerId>;

    /// Send one message to one remote peer
    fn must_send(&self, to: &PeerId, message: &M);

    /// Send one message to every remote peer
    fn broadcast(&self, message: &M) {
        for id in self.peer_ids() {
            self.must_send(&id, message);
        }
    }
}

/// In-memory transport for tests and local simulation
pub mod memory;

pub use memory::{Inbox, MemoryNetwork, MemoryPeerManager};

/// Pump frames from `inbox` into `target` until it reaches a terminal state
///
/// Must be started only after every protocol instance of the network has been
/// started; frames queue in the inbox until then.
pub fn spawn_delivery<M>(mut inbox: Inbox, target: Arc<dyn MessageMain<M>>) -> JoinHandle<()>
where
    M: DeserializeOwned + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(frame) = inbox.recv::<M>().await {
            match frame {
                Ok(message) => {
                    if let Err(e) = target.handle_message(message) {
                        warn!(peer = %inbox.id(), error = %e, "Message rejected");
                    }
                }
                Err(e) => warn!(peer = %inbox.id(), error = %e, "Dropping undecodable frame"),
            }

            if target.state().is_terminal() {
                debug!(peer = %inbox.id(), state = %target.state(), "Delivery stopped");
                break;
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{spawn_delivery, MemoryNetwork};
    use crate::message::{MessageMain, State, StateWatcher};
    use crate::PeerId;
    use futures_util::future::join_all;
    use serde::de::DeserializeOwned;
    use std::sync::Arc;
    use std::time::Duration;

    /// A started protocol instance and the watcher it reports to
    pub(crate) type Party<M> = (PeerId, Arc<dyn MessageMain<M>>, Arc<StateWatcher>);

    /// Pump every inbox until each party reaches a terminal state
    ///
    /// Every party must already be started.
    pub(crate) async fn drive<M>(network: &MemoryNetwork, parties: Vec<Party<M>>) -> Vec<State>
    where
        M: DeserializeOwned + Send + 'static,
    {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let pumps: Vec<_> = parties
            .iter()
            .map(|(id, target, _)| {
                let inbox = network.take_inbox(id).expect("inbox already taken");
                spawn_delivery(inbox, target.clone())
            })
            .collect();

        let waits = parties.iter().map(|(_, _, watcher)| watcher.wait_terminal());
        let states = tokio::time::timeout(Duration::from_secs(120), join_all(waits))
            .await
            .expect("protocol did not terminate");
        for pump in pumps {
            pump.abort();
        }
        states
    }
}
