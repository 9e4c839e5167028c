//! LISS message types

use crate::commitment::{Commitment, Decommitment};
use crate::message::ProtocolMessage;
use crate::PeerId;
use serde::{Deserialize, Serialize};

/// Type tag of a LISS message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LissMessageType {
    BqCommitment,
    BqDecommitment,
}

/// Chain order of the LISS rounds
pub const LISS_MESSAGE_TYPES: [LissMessageType; 2] =
    [LissMessageType::BqCommitment, LissMessageType::BqDecommitment];

/// LISS message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LissMessage {
    /// Sender peer ID
    pub id: PeerId,
    pub body: LissBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LissBody {
    /// Round 1: commitment to the public contribution
    BqCommitment(Commitment),
    /// Round 2: opening of the round 1 commitment
    BqDecommitment(Decommitment),
}

impl ProtocolMessage for LissMessage {
    type Kind = LissMessageType;

    fn message_type(&self) -> LissMessageType {
        match self.body {
            LissBody::BqCommitment(_) => LissMessageType::BqCommitment,
            LissBody::BqDecommitment(_) => LissMessageType::BqDecommitment,
        }
    }

    fn sender(&self) -> &PeerId {
        &self.id
    }
}
