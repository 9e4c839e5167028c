//! Rounds 4, 5 and 10: reveal `δ`, open `Γ` and combine the signature shares

use super::check::{CommitViAiHandler, ShareCheck};
use super::messages::{SignBody, SignMessage, SignMessageType};
use super::nonce::Nonces;
use super::{unexpected, SignContext};
use crate::birkhoff::is_identity;
use crate::commitment::Commitment;
use crate::message::{Advance, Handler, Peers};
use crate::types::{decode_point, reduce_to_scalar};
use crate::zkproof::SchnorrProof;
use crate::{Error, PeerId, Result, Signature};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use k256::elliptic_curve::point::AffineCoordinates;
use k256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Round 4: sum the `δ_j` and reveal `Γ_i`
pub(crate) struct DeltaHandler {
    context: SignContext,
    nonces: Nonces,
    gamma_commitments: BTreeMap<PeerId, Commitment>,
    sigma: Scalar,
    delta: Scalar,
    deltas: BTreeMap<PeerId, Scalar>,
}

impl DeltaHandler {
    pub fn new(
        context: SignContext,
        nonces: Nonces,
        gamma_commitments: BTreeMap<PeerId, Commitment>,
        sigma: Scalar,
        delta: Scalar,
    ) -> Self {
        Self {
            context,
            nonces,
            gamma_commitments,
            sigma,
            delta,
            deltas: BTreeMap::new(),
        }
    }
}

impl Handler<SignMessage> for DeltaHandler {
    fn message_type(&self) -> SignMessageType {
        SignMessageType::Delta
    }

    fn required_count(&self) -> usize {
        self.context.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<SignMessage>, message: &SignMessage) -> Result<()> {
        let SignBody::Delta { delta } = &message.body else {
            return Err(unexpected("delta"));
        };
        self.deltas.insert(message.id.clone(), *delta);
        Ok(())
    }

    fn finalize(self: Box<Self>, _peers: &Peers<SignMessage>) -> Result<Advance<SignMessage>> {
        let delta = self
            .deltas
            .values()
            .fold(self.delta, |acc, d| acc + d);
        let delta_inverse = Option::<Scalar>::from(delta.invert())
            .ok_or_else(|| Error::Inconsistent("δ is zero".into()))?;

        let proof = SchnorrProof::prove(
            &mut OsRng,
            &self.nonces.gamma,
            &self.nonces.gamma_point,
            &self.context.proof_context("gamma", self.context.self_id()),
        );
        self.context.broadcast(SignBody::ProofAi {
            opening: self.nonces.gamma_opening.clone(),
            proof,
        });

        let this = *self;
        Ok(Advance::Next(Box::new(ProofAiHandler {
            context: this.context,
            nonces: this.nonces,
            gamma_commitments: this.gamma_commitments,
            sigma: this.sigma,
            delta_inverse,
            gammas: BTreeMap::new(),
        })))
    }
}

/// Round 5: verify the `Γ_j` openings and derive `R`
pub(crate) struct ProofAiHandler {
    context: SignContext,
    nonces: Nonces,
    gamma_commitments: BTreeMap<PeerId, Commitment>,
    sigma: Scalar,
    delta_inverse: Scalar,
    gammas: BTreeMap<PeerId, ProjectivePoint>,
}

impl Handler<SignMessage> for ProofAiHandler {
    fn message_type(&self) -> SignMessageType {
        SignMessageType::ProofAi
    }

    fn required_count(&self) -> usize {
        self.context.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<SignMessage>, message: &SignMessage) -> Result<()> {
        let SignBody::ProofAi { opening, proof } = &message.body else {
            return Err(unexpected("proof-ai"));
        };
        let commitment = self
            .gamma_commitments
            .get(&message.id)
            .ok_or_else(|| Error::UnknownPeer(message.id.clone()))?;
        commitment.verify(opening)?;

        let gamma_point = decode_point(&opening.message)?;
        proof.verify(&gamma_point, &self.context.proof_context("gamma", &message.id))?;
        self.gammas.insert(message.id.clone(), gamma_point);
        Ok(())
    }

    fn finalize(self: Box<Self>, _peers: &Peers<SignMessage>) -> Result<Advance<SignMessage>> {
        let gamma = self
            .gammas
            .values()
            .fold(self.nonces.gamma_point, |acc, g| acc + g);
        let r_point = gamma * self.delta_inverse;
        if is_identity(&r_point) {
            return Err(Error::Inconsistent("R is the identity".into()));
        }
        let x: [u8; 32] = r_point.to_affine().x().into();
        let r = reduce_to_scalar(&x);
        if bool::from(r.is_zero()) {
            return Err(Error::Inconsistent("r is zero".into()));
        }

        let s = self.context.m() * self.nonces.k + r * self.sigma;
        #[cfg(test)]
        let s = s + self.context.share_offset;

        // s_i stays private until every share is checked
        let (check, commitment) = ShareCheck::new(s, r_point);
        self.context.broadcast(SignBody::CommitViAi { commitment });
        debug!("R derived, share check committed");

        let this = *self;
        Ok(Advance::Next(Box::new(CommitViAiHandler::new(
            this.context,
            r,
            check,
        ))))
    }
}

/// Round 10: add the `s_j`, normalize and verify
pub(crate) struct SiHandler {
    context: SignContext,
    r: Scalar,
    s: Scalar,
    shares: BTreeMap<PeerId, Scalar>,
    signature: Option<Signature>,
}

impl SiHandler {
    pub(super) fn new(context: SignContext, r: Scalar, s: Scalar) -> Self {
        Self {
            context,
            r,
            s,
            shares: BTreeMap::new(),
            signature: None,
        }
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    fn assemble(&self, s: Scalar) -> Result<Signature> {
        let signature = EcdsaSignature::from_scalars(self.r.to_bytes(), s.to_bytes())
            .map_err(|_| Error::InvalidSignature)?;
        let signature = signature.normalize_s().unwrap_or(signature);

        let key = VerifyingKey::from_affine(self.context.expected_public_key.to_affine())
            .map_err(|e| Error::Crypto(e.to_string()))?;
        key.verify_prehash(&self.context.digest, &signature)
            .map_err(|_| Error::InvalidSignature)?;
        let recovery_id =
            RecoveryId::trial_recovery_from_prehash(&key, &self.context.digest, &signature)
                .map_err(|_| Error::InvalidSignature)?;

        let (r, s) = signature.split_bytes();
        Ok(Signature::new(r.into(), s.into(), recovery_id.to_byte()))
    }
}

impl Handler<SignMessage> for SiHandler {
    fn message_type(&self) -> SignMessageType {
        SignMessageType::Si
    }

    fn required_count(&self) -> usize {
        self.context.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<SignMessage>, message: &SignMessage) -> Result<()> {
        let SignBody::Si { s } = &message.body else {
            return Err(unexpected("si"));
        };
        self.shares.insert(message.id.clone(), *s);
        Ok(())
    }

    fn finalize(mut self: Box<Self>, _peers: &Peers<SignMessage>) -> Result<Advance<SignMessage>> {
        let s = self.shares.values().fold(self.s, |acc, share| acc + share);
        let signature = self.assemble(s)?;
        info!(recovery_id = signature.recovery_id, "Signature verified");
        self.signature = Some(signature);
        Ok(Advance::Done(self))
    }
}
