//! Rounds 1-3: public shares, encrypted nonces and MtA

use super::messages::{SignBody, SignMessage, SignMessageType};
use super::reveal::DeltaHandler;
use super::{has_mta_capacity, mta_blind_bound, unexpected, SignContext};
use crate::commitment::{self, Commitment, Decommitment};
use crate::homo::{Ciphertext, HomoPublicKey};
use crate::message::{Advance, Handler, Peers};
use crate::types::{biguint_to_scalar, decode_point, encode_point, scalar_to_biguint};
use crate::zkproof::SchnorrProof;
use crate::{Error, PeerId, Result};
use k256::{NonZeroScalar, ProjectivePoint, Scalar};
use num_bigint::RandBigInt;
use rand::rngs::OsRng;
use std::collections::BTreeMap;
use tracing::debug;
use zeroize::Zeroize;

/// Nonce shares `k_i`, `γ_i` and the commitment material for `Γ_i`
pub(super) struct Nonces {
    pub k: Scalar,
    pub gamma: Scalar,
    pub gamma_point: ProjectivePoint,
    pub gamma_opening: Decommitment,
}

impl Nonces {
    fn random() -> (Self, Commitment) {
        let k = *NonZeroScalar::random(&mut OsRng);
        let gamma = *NonZeroScalar::random(&mut OsRng);
        let gamma_point = ProjectivePoint::GENERATOR * gamma;
        let (commitment, gamma_opening) =
            commitment::commit(&mut OsRng, &encode_point(&gamma_point));
        let nonces = Self {
            k,
            gamma,
            gamma_point,
            gamma_opening,
        };
        (nonces, commitment)
    }
}

impl Drop for Nonces {
    fn drop(&mut self) {
        self.k.zeroize();
        self.gamma.zeroize();
    }
}

/// Round 1: collect `W_j` and check they add up to the expected key
pub(crate) struct PubkeyHandler {
    context: SignContext,
    public_shares: BTreeMap<PeerId, ProjectivePoint>,
}

impl PubkeyHandler {
    pub fn new(context: SignContext) -> Self {
        Self {
            context,
            public_shares: BTreeMap::new(),
        }
    }

    fn own_point(&self) -> ProjectivePoint {
        ProjectivePoint::GENERATOR * self.context.w
    }
}

impl Handler<SignMessage> for PubkeyHandler {
    fn message_type(&self) -> SignMessageType {
        SignMessageType::Pubkey
    }

    fn required_count(&self) -> usize {
        self.context.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<SignMessage>, message: &SignMessage) -> Result<()> {
        let SignBody::Pubkey { point, proof } = &message.body else {
            return Err(unexpected("pubkey"));
        };
        let point = decode_point(point)?;
        proof.verify(&point, &self.context.proof_context("pubkey", &message.id))?;
        self.public_shares.insert(message.id.clone(), point);
        Ok(())
    }

    fn finalize(self: Box<Self>, _peers: &Peers<SignMessage>) -> Result<Advance<SignMessage>> {
        let total = self
            .public_shares
            .values()
            .fold(self.own_point(), |acc, point| acc + point);
        if total != self.context.expected_public_key {
            return Err(Error::InconsistentPublicKey);
        }

        let (nonces, gamma_commitment) = Nonces::random();
        let enc_k = self
            .context
            .homo
            .public_key()
            .encrypt(&scalar_to_biguint(&nonces.k))?;
        self.context.broadcast(SignBody::EncK {
            homo_public_key: self.context.homo.public_key().to_bytes(),
            enc_k,
            gamma_commitment,
        });
        debug!("Public shares consistent, nonces committed");

        let this = *self;
        Ok(Advance::Next(Box::new(EncKHandler {
            context: this.context,
            public_shares: this.public_shares,
            nonces,
            gamma_commitments: BTreeMap::new(),
            betas: BTreeMap::new(),
            nus: BTreeMap::new(),
        })))
    }

    fn first_message(&self) -> Option<SignMessage> {
        let point = self.own_point();
        let proof = SchnorrProof::prove(
            &mut OsRng,
            &self.context.w,
            &point,
            &self.context.proof_context("pubkey", self.context.self_id()),
        );
        Some(self.context.message(SignBody::Pubkey {
            point: encode_point(&point),
            proof,
        }))
    }
}

/// `Enc(k_j·x + b)` for a blinding `b < q⁵`, and `b mod q`
fn mta_respond(
    key: &dyn HomoPublicKey,
    enc_k: &Ciphertext,
    x: &Scalar,
) -> Result<(Ciphertext, Scalar)> {
    let blind = OsRng.gen_biguint_below(&mta_blind_bound());
    let product = key.mul_const(enc_k, &scalar_to_biguint(x))?;
    let ciphertext = key.add(&product, &key.encrypt(&blind)?)?;
    Ok((ciphertext, biguint_to_scalar(&blind)))
}

/// Round 2: answer every peer's encrypted nonce with MtA ciphertexts
pub(crate) struct EncKHandler {
    context: SignContext,
    public_shares: BTreeMap<PeerId, ProjectivePoint>,
    nonces: Nonces,
    gamma_commitments: BTreeMap<PeerId, Commitment>,
    /// `-β'` per peer, our additive part of `k_j·γ_i`
    betas: BTreeMap<PeerId, Scalar>,
    /// `-ν'` per peer, our additive part of `k_j·w_i`
    nus: BTreeMap<PeerId, Scalar>,
}

impl Handler<SignMessage> for EncKHandler {
    fn message_type(&self) -> SignMessageType {
        SignMessageType::EncK
    }

    fn required_count(&self) -> usize {
        self.context.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<SignMessage>, message: &SignMessage) -> Result<()> {
        let SignBody::EncK {
            homo_public_key,
            enc_k,
            gamma_commitment,
        } = &message.body
        else {
            return Err(unexpected("enc-k"));
        };

        let key = self.context.homo.parse_public_key(homo_public_key)?;
        if !has_mta_capacity(key.as_ref()) {
            return Err(Error::VerificationFailed(format!(
                "homomorphic key of {} too small for MtA",
                message.id
            )));
        }

        let (enc_k_gamma, beta) = mta_respond(key.as_ref(), enc_k, &self.nonces.gamma)?;
        let (enc_k_w, nu) = mta_respond(key.as_ref(), enc_k, &self.context.w)?;
        self.context.send(
            &message.id,
            SignBody::Mta {
                enc_k_gamma,
                enc_k_w,
                nu_point: encode_point(&(ProjectivePoint::GENERATOR * nu)),
            },
        );

        self.betas.insert(message.id.clone(), -beta);
        self.nus.insert(message.id.clone(), -nu);
        self.gamma_commitments
            .insert(message.id.clone(), *gamma_commitment);
        Ok(())
    }

    fn finalize(self: Box<Self>, _peers: &Peers<SignMessage>) -> Result<Advance<SignMessage>> {
        let this = *self;
        Ok(Advance::Next(Box::new(MtaHandler {
            context: this.context,
            public_shares: this.public_shares,
            nonces: this.nonces,
            gamma_commitments: this.gamma_commitments,
            betas: this.betas,
            nus: this.nus,
            alphas: BTreeMap::new(),
            mus: BTreeMap::new(),
        })))
    }
}

/// Round 3: decrypt the peers' MtA answers and form `δ_i` and `σ_i`
pub(crate) struct MtaHandler {
    context: SignContext,
    public_shares: BTreeMap<PeerId, ProjectivePoint>,
    nonces: Nonces,
    gamma_commitments: BTreeMap<PeerId, Commitment>,
    betas: BTreeMap<PeerId, Scalar>,
    nus: BTreeMap<PeerId, Scalar>,
    alphas: BTreeMap<PeerId, Scalar>,
    mus: BTreeMap<PeerId, Scalar>,
}

impl Handler<SignMessage> for MtaHandler {
    fn message_type(&self) -> SignMessageType {
        SignMessageType::Mta
    }

    fn required_count(&self) -> usize {
        self.context.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<SignMessage>, message: &SignMessage) -> Result<()> {
        let SignBody::Mta {
            enc_k_gamma,
            enc_k_w,
            nu_point,
        } = &message.body
        else {
            return Err(unexpected("mta"));
        };

        let public_share = self
            .public_shares
            .get(&message.id)
            .ok_or_else(|| Error::UnknownPeer(message.id.clone()))?;
        let alpha = biguint_to_scalar(&self.context.homo.decrypt(enc_k_gamma)?);
        let mu = biguint_to_scalar(&self.context.homo.decrypt(enc_k_w)?);
        let nu_point = decode_point(nu_point)?;

        // μ = k_i·w_j + ν' must match the public share of the sender
        if ProjectivePoint::GENERATOR * mu != *public_share * self.nonces.k + nu_point {
            return Err(Error::VerificationFailed(format!(
                "MtA answer of {} inconsistent with its public share",
                message.id
            )));
        }

        self.alphas.insert(message.id.clone(), alpha);
        self.mus.insert(message.id.clone(), mu);
        Ok(())
    }

    fn finalize(self: Box<Self>, _peers: &Peers<SignMessage>) -> Result<Advance<SignMessage>> {
        let this = *self;
        let nonces = &this.nonces;
        let delta = this
            .alphas
            .values()
            .chain(this.betas.values())
            .fold(nonces.k * nonces.gamma, |acc, v| acc + v);
        let sigma = this
            .mus
            .values()
            .chain(this.nus.values())
            .fold(nonces.k * this.context.w, |acc, v| acc + v);

        this.context.broadcast(SignBody::Delta { delta });
        Ok(Advance::Next(Box::new(DeltaHandler::new(
            this.context,
            this.nonces,
            this.gamma_commitments,
            sigma,
            delta,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homo::paillier::test_keys;
    use crate::homo::HomoCrypto;
    use k256::elliptic_curve::Field;

    #[test]
    fn test_mta_yields_additive_shares() {
        let alice = test_keys::paillier(0);
        let k = Scalar::random(&mut OsRng);
        let x = Scalar::random(&mut OsRng);
        let enc_k = alice
            .public_key()
            .encrypt(&scalar_to_biguint(&k))
            .unwrap();

        let (answer, blind) = mta_respond(alice.public_key(), &enc_k, &x).unwrap();
        let alpha = biguint_to_scalar(&alice.decrypt(&answer).unwrap());
        assert_eq!(alpha - blind, k * x);
    }

    #[test]
    fn test_blinds_fit_the_plaintext_space() {
        let key = test_keys::paillier(1);
        assert!(has_mta_capacity(key.public_key()));
        assert!(key.public_key().message_range().bits() > mta_blind_bound().bits());
    }
}
