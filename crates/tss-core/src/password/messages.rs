//! Password verification message types

use crate::message::ProtocolMessage;
use crate::oblivious::{OprfRequest, OprfResponse};
use crate::zkproof::{SchnorrProver1, SchnorrProver2, SchnorrVerifier1};
use crate::PeerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PasswordMessageType {
    User0,
    Server0,
    User1,
    Server1,
    User2,
}

/// Rounds the user side consumes
pub const USER_MESSAGE_TYPES: [PasswordMessageType; 2] =
    [PasswordMessageType::Server0, PasswordMessageType::Server1];

/// Rounds the server side consumes
pub const SERVER_MESSAGE_TYPES: [PasswordMessageType; 3] = [
    PasswordMessageType::User0,
    PasswordMessageType::User1,
    PasswordMessageType::User2,
];

/// Password verification message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordMessage {
    /// Sender peer ID
    pub id: PeerId,
    pub body: PasswordBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PasswordBody {
    /// Blinded password
    User0 { password_request: OprfRequest },
    /// OPRF evaluation and the server's Schnorr commitment
    Server0 {
        password_response: OprfResponse,
        server_g_prover1: SchnorrProver1,
    },
    /// The user's Schnorr commitment and a challenge for the server
    User1 {
        share_g_prover1: SchnorrProver1,
        server_g_verifier1: SchnorrVerifier1,
    },
    /// A challenge for the user and the server's Schnorr response
    Server1 {
        share_g_verifier1: SchnorrVerifier1,
        server_g_prover2: SchnorrProver2,
    },
    /// The user's Schnorr response
    User2 { share_g_prover2: SchnorrProver2 },
}

impl ProtocolMessage for PasswordMessage {
    type Kind = PasswordMessageType;

    fn message_type(&self) -> PasswordMessageType {
        match self.body {
            PasswordBody::User0 { .. } => PasswordMessageType::User0,
            PasswordBody::Server0 { .. } => PasswordMessageType::Server0,
            PasswordBody::User1 { .. } => PasswordMessageType::User1,
            PasswordBody::Server1 { .. } => PasswordMessageType::Server1,
            PasswordBody::User2 { .. } => PasswordMessageType::User2,
        }
    }

    fn sender(&self) -> &PeerId {
        &self.id
    }
}
