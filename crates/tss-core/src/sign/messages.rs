//! Signer message types

use crate::commitment::{Commitment, Decommitment};
use crate::homo::Ciphertext;
use crate::message::ProtocolMessage;
use crate::types::scalar_serde;
use crate::zkproof::{RepresentationProof, SchnorrProof};
use crate::PeerId;
use k256::Scalar;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignMessageType {
    Pubkey,
    EncK,
    Mta,
    Delta,
    ProofAi,
    CommitViAi,
    DecommitViAi,
    CommitUiTi,
    DecommitUiTi,
    Si,
}

/// Every round of the signer, in order
pub const SIGN_MESSAGE_TYPES: [SignMessageType; 10] = [
    SignMessageType::Pubkey,
    SignMessageType::EncK,
    SignMessageType::Mta,
    SignMessageType::Delta,
    SignMessageType::ProofAi,
    SignMessageType::CommitViAi,
    SignMessageType::DecommitViAi,
    SignMessageType::CommitUiTi,
    SignMessageType::DecommitUiTi,
    SignMessageType::Si,
];

/// Signer message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignMessage {
    /// Sender peer ID
    pub id: PeerId,
    pub body: SignBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignBody {
    /// Additive key share point `W_i` and a proof of knowledge of `w_i`
    Pubkey { point: Vec<u8>, proof: SchnorrProof },
    /// Homomorphic public key, `Enc(k_i)` and a commitment to `Γ_i`
    EncK {
        homo_public_key: Vec<u8>,
        enc_k: Ciphertext,
        gamma_commitment: Commitment,
    },
    /// Peer-to-peer MtA answers: `Enc(k_j·γ_i + β')`, `Enc(k_j·w_i + ν')`
    /// and `ν'·G`
    Mta {
        enc_k_gamma: Ciphertext,
        enc_k_w: Ciphertext,
        nu_point: Vec<u8>,
    },
    /// Share of `δ = k·γ`
    Delta {
        #[serde(with = "scalar_serde")]
        delta: Scalar,
    },
    /// Opening of `Γ_i` and a proof of knowledge of `γ_i`
    ProofAi {
        opening: Decommitment,
        proof: SchnorrProof,
    },
    /// Commitment to `V_i = s_i·R + l_i·G` and `A_i = ρ_i·G`
    CommitViAi { commitment: Commitment },
    /// Opening of `V_i`, `A_i` with proofs of `(s_i, l_i)` and `ρ_i`
    DecommitViAi {
        opening: Decommitment,
        v_proof: RepresentationProof,
        a_proof: SchnorrProof,
    },
    /// Commitment to `U_i = ρ_i·V` and `T_i = l_i·A`
    CommitUiTi { commitment: Commitment },
    DecommitUiTi { opening: Decommitment },
    /// Signature share
    Si {
        #[serde(with = "scalar_serde")]
        s: Scalar,
    },
}

impl ProtocolMessage for SignMessage {
    type Kind = SignMessageType;

    fn message_type(&self) -> SignMessageType {
        match self.body {
            SignBody::Pubkey { .. } => SignMessageType::Pubkey,
            SignBody::EncK { .. } => SignMessageType::EncK,
            SignBody::Mta { .. } => SignMessageType::Mta,
            SignBody::Delta { .. } => SignMessageType::Delta,
            SignBody::ProofAi { .. } => SignMessageType::ProofAi,
            SignBody::CommitViAi { .. } => SignMessageType::CommitViAi,
            SignBody::DecommitViAi { .. } => SignMessageType::DecommitViAi,
            SignBody::CommitUiTi { .. } => SignMessageType::CommitUiTi,
            SignBody::DecommitUiTi { .. } => SignMessageType::DecommitUiTi,
            SignBody::Si { .. } => SignMessageType::Si,
        }
    }

    fn sender(&self) -> &PeerId {
        &self.id
    }
}
