//! Round 2: open the commitments and combine the contributions

use super::config::GroupConfigs;
use super::messages::{LissBody, LissMessage, LissMessageType};
use super::sharing::{unqualified_sets, set_key, user_keys, Contribution, PublicContribution};
use super::UserShare;
use crate::commitment::Commitment;
use crate::group::{GroupElement, ModularGroup};
use crate::message::{Advance, Handler, Peers};
use crate::mpc::PeerManager;
use crate::{Error, PeerId, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) struct BqDecommitmentHandler {
    peer_manager: Arc<dyn PeerManager<LissMessage>>,
    group: ModularGroup,
    configs: GroupConfigs,
    contribution: Contribution,
    commitments: BTreeMap<PeerId, Commitment>,
    /// Verified openings by sender
    received: BTreeMap<PeerId, PublicContribution>,

    pub(super) public_key: Option<GroupElement>,
    /// Per group, per user: set key -> share
    pub(super) users: Vec<Vec<BTreeMap<String, UserShare>>>,
}

impl BqDecommitmentHandler {
    pub fn new(
        peer_manager: Arc<dyn PeerManager<LissMessage>>,
        group: ModularGroup,
        configs: GroupConfigs,
        contribution: Contribution,
        commitments: BTreeMap<PeerId, Commitment>,
    ) -> Self {
        Self {
            peer_manager,
            group,
            configs,
            contribution,
            commitments,
            received: BTreeMap::new(),
            public_key: None,
            users: Vec::new(),
        }
    }

    /// Check shape against the configs and membership of every element
    fn check_contribution(&self, public: &PublicContribution) -> Result<()> {
        if public.bqs.len() != self.configs.len() {
            return Err(Error::VerificationFailed(format!(
                "expected {} groups, got {}",
                self.configs.len(),
                public.bqs.len()
            )));
        }
        self.group.validate(&public.public_key)?;

        for (config, bqs) in self.configs.iter().zip(&public.bqs) {
            let expected: Vec<String> = unqualified_sets(config)
                .iter()
                .map(|set| set_key(set))
                .collect();
            if !bqs.keys().eq(expected.iter()) {
                return Err(Error::VerificationFailed("unexpected share layout".into()));
            }
            for bq in bqs.values() {
                self.group.validate(bq)?;
            }
            if self.group.product(bqs.values()) != public.public_key {
                return Err(Error::VerificationFailed(
                    "share commitments do not multiply to the public key".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Handler<LissMessage> for BqDecommitmentHandler {
    fn message_type(&self) -> LissMessageType {
        LissMessageType::BqDecommitment
    }

    fn required_count(&self) -> usize {
        self.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<LissMessage>, message: &LissMessage) -> Result<()> {
        let opening = match &message.body {
            LissBody::BqDecommitment(opening) => opening,
            LissBody::BqCommitment(_) => {
                return Err(Error::Internal(
                    "commitment routed to decommitment round".into(),
                ))
            }
        };
        let commitment = self
            .commitments
            .get(&message.id)
            .ok_or_else(|| Error::UnknownPeer(message.id.clone()))?;
        commitment.verify(opening)?;

        let public: PublicContribution = serde_json::from_slice(&opening.message)
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        self.check_contribution(&public)?;

        debug!(from = %message.id, "Verified bq decommitment");
        self.received.insert(message.id.clone(), public);
        Ok(())
    }

    fn finalize(self: Box<Self>, _peers: &Peers<LissMessage>) -> Result<Advance<LissMessage>> {
        let mut this = *self;
        let own = this.contribution.public(&this.group);
        let contributions: Vec<&PublicContribution> =
            std::iter::once(&own).chain(this.received.values()).collect();

        let public_key = this
            .group
            .product(contributions.iter().map(|c| &c.public_key));

        let mut users = Vec::with_capacity(this.configs.len());
        for (index, config) in this.configs.iter().enumerate() {
            let mut bqs = BTreeMap::new();
            for key in this.contribution.shares[index].keys() {
                let factors: Vec<&GroupElement> = contributions
                    .iter()
                    .filter_map(|c| c.bqs[index].get(key))
                    .collect();
                bqs.insert(key.clone(), this.group.product(factors));
            }
            if this.group.product(bqs.values()) != public_key {
                return Err(Error::InconsistentPublicKey);
            }

            let group_users = (0..config.users)
                .map(|user| {
                    user_keys(config, user)
                        .into_iter()
                        .filter_map(|key| {
                            let bq = bqs.get(&key)?.clone();
                            let share = this.contribution.shares[index].get(&key)?.clone();
                            Some((key, UserShare { bq, share }))
                        })
                        .collect()
                })
                .collect();
            users.push(group_users);
        }

        info!(groups = users.len(), "LISS key generation complete");
        this.public_key = Some(public_key);
        this.users = users;
        Ok(Advance::Done(Box::new(this)))
    }
}
