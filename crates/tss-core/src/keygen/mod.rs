//! LISS threshold key generation
//!
//! Every peer contributes a random secret, splits it with a replicated
//! secret sharing per user group and commits to `g^x` and the per-share
//! commitments. After all openings verify, each peer holds an additive share
//! of every user's replicated shares; the joint secret never exists in one
//! place.

mod bq_commit;
mod bq_decommit;
mod config;
mod messages;
mod sharing;

pub use config::{GroupConfig, GroupConfigs, MAX_SHARES_PER_GROUP};
pub use messages::*;

use crate::group::GroupElement;
use crate::message::{MessageMain, MsgMain, Peers, State, StateChangedListener};
use crate::mpc::PeerManager;
use crate::Result;
use bq_commit::BqCommitmentHandler;
use bq_decommit::BqDecommitmentHandler;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// One replicated share as seen by this peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserShare {
    /// `g^r_T` of the joint share
    pub bq: GroupElement,
    /// This peer's additive part of `r_T`
    pub share: BigUint,
}

/// Outcome of a LISS key generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LissResult {
    /// `g^x` of the joint secret
    pub public_key: GroupElement,
    /// Per group, per user: unqualified set key -> share
    pub users: Vec<Vec<BTreeMap<String, UserShare>>>,
}

/// LISS key generation for one peer
pub struct Liss {
    engine: MsgMain<LissMessage>,
}

impl Liss {
    /// Create the protocol instance; nothing is sent before [`start`](Self::start)
    #[instrument(skip(peer_manager, listener), fields(peer = %peer_manager.self_id()))]
    pub fn new(
        peer_manager: Arc<dyn PeerManager<LissMessage>>,
        configs: GroupConfigs,
        listener: Arc<dyn StateChangedListener>,
    ) -> Result<Self> {
        let handler = BqCommitmentHandler::new(peer_manager.clone(), configs)?;
        let peers = Peers::from_ids(peer_manager.peer_ids());
        let engine = MsgMain::new(
            peer_manager,
            peers,
            listener,
            Box::new(handler),
            LISS_MESSAGE_TYPES.to_vec(),
        )?;
        info!("LISS instance created");
        Ok(Self { engine })
    }

    /// Broadcast the bq commitment and begin accepting messages
    pub fn start(&self) -> Result<()> {
        self.engine.start()
    }

    pub fn state(&self) -> State {
        self.engine.state()
    }

    pub fn handle_message(&self, message: LissMessage) -> Result<()> {
        self.engine.handle_message(message)
    }

    /// Deep copy of the key generation result; `NotReady` until done
    pub fn result(&self) -> Result<LissResult> {
        self.engine
            .with_final_handler(|handler: &BqDecommitmentHandler| {
                handler.public_key.clone().map(|public_key| LissResult {
                    public_key,
                    users: handler.users.clone(),
                })
            })?
            .ok_or(crate::Error::NotReady)
    }
}

impl MessageMain<LissMessage> for Liss {
    fn handle_message(&self, message: LissMessage) -> Result<()> {
        self.engine.handle_message(message)
    }

    fn state(&self) -> State {
        self.engine.state()
    }
}
