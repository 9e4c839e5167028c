//! Round 1: commit to the public contribution

use super::bq_decommit::BqDecommitmentHandler;
use super::config::GroupConfigs;
use super::messages::{LissBody, LissMessage, LissMessageType};
use super::sharing::Contribution;
use crate::commitment::{self, Commitment, Decommitment};
use crate::group::ModularGroup;
use crate::message::{Advance, Handler, Peers};
use crate::mpc::PeerManager;
use crate::{Error, Result};
use rand::rngs::OsRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub(crate) struct BqCommitmentHandler {
    peer_manager: Arc<dyn PeerManager<LissMessage>>,
    group: ModularGroup,
    configs: GroupConfigs,
    contribution: Contribution,
    commitment: Commitment,
    opening: Decommitment,
}

impl BqCommitmentHandler {
    pub fn new(
        peer_manager: Arc<dyn PeerManager<LissMessage>>,
        configs: GroupConfigs,
    ) -> Result<Self> {
        configs.validate()?;
        if peer_manager.num_peers() == 0 {
            return Err(Error::InvalidConfig("LISS needs at least one other peer".into()));
        }

        let group = ModularGroup::rfc3526()?;
        let contribution = Contribution::new(&mut OsRng, &group, &configs);
        let public = serde_json::to_vec(&contribution.public(&group))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let (commitment, opening) = commitment::commit(&mut OsRng, &public);
        debug!(%commitment, "Committed to public contribution");

        Ok(Self {
            peer_manager,
            group,
            configs,
            contribution,
            commitment,
            opening,
        })
    }
}

impl Handler<LissMessage> for BqCommitmentHandler {
    fn message_type(&self) -> LissMessageType {
        LissMessageType::BqCommitment
    }

    fn required_count(&self) -> usize {
        self.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<LissMessage>, message: &LissMessage) -> Result<()> {
        // The commitment is only opened next round; recording it is enough
        match message.body {
            LissBody::BqCommitment(_) => Ok(()),
            LissBody::BqDecommitment(_) => Err(Error::Internal(
                "decommitment routed to commitment round".into(),
            )),
        }
    }

    fn finalize(self: Box<Self>, peers: &Peers<LissMessage>) -> Result<Advance<LissMessage>> {
        let mut commitments = BTreeMap::new();
        for peer in peers.iter() {
            match peer.get_message(LissMessageType::BqCommitment).map(|m| &m.body) {
                Some(LissBody::BqCommitment(commitment)) => {
                    commitments.insert(peer.id().clone(), *commitment);
                }
                _ => {
                    return Err(Error::Inconsistent(format!(
                        "missing commitment from {}",
                        peer.id()
                    )))
                }
            }
        }
        debug!(peers = commitments.len(), "Collected bq commitments");

        let this = *self;
        this.peer_manager.broadcast(&LissMessage {
            id: this.peer_manager.self_id().clone(),
            body: LissBody::BqDecommitment(this.opening),
        });

        Ok(Advance::Next(Box::new(BqDecommitmentHandler::new(
            this.peer_manager,
            this.group,
            this.configs,
            this.contribution,
            commitments,
        ))))
    }

    fn first_message(&self) -> Option<LissMessage> {
        Some(LissMessage {
            id: self.peer_manager.self_id().clone(),
            body: LissBody::BqCommitment(self.commitment),
        })
    }
}
