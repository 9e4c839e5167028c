//! Rounds 6-9: check the signature shares before any is revealed
//!
//! Each signer commits to `V_i = s_i·R + l_i·G` and `A_i = ρ_i·G`. With
//! `V = ΣV_j - m·G - r·Y` and `A = ΣA_j`, correct shares leave `V = l·G`, so
//! `U = Σρ_j·V` equals `T = Σl_j·A`. A bad `s_j` breaks the equality and the
//! session fails while every `s_i` is still private.

use super::messages::{SignBody, SignMessage, SignMessageType};
use super::reveal::SiHandler;
use super::{unexpected, SignContext};
use crate::commitment::{self, Commitment, Decommitment};
use crate::message::{Advance, Handler, Peers};
use crate::types::{decode_point, encode_point};
use crate::zkproof::{RepresentationProof, SchnorrProof};
use crate::{Error, PeerId, Result};
use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use zeroize::Zeroize;

/// Length-prefixed SEC1 points, the payload of a share-check commitment
fn encode_points(points: &[ProjectivePoint]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(points.len() * 34);
    for point in points {
        let encoded = encode_point(point);
        bytes.push(encoded.len() as u8);
        bytes.extend_from_slice(&encoded);
    }
    bytes
}

fn decode_points<const N: usize>(mut bytes: &[u8]) -> Result<[ProjectivePoint; N]> {
    let mut points = [ProjectivePoint::IDENTITY; N];
    for point in points.iter_mut() {
        let (&len, rest) = bytes
            .split_first()
            .ok_or_else(|| Error::Deserialization("truncated point list".into()))?;
        if rest.len() < len as usize {
            return Err(Error::Deserialization("truncated point list".into()));
        }
        let (encoded, rest) = rest.split_at(len as usize);
        *point = decode_point(encoded)?;
        bytes = rest;
    }
    if !bytes.is_empty() {
        return Err(Error::Deserialization("trailing bytes after point list".into()));
    }
    Ok(points)
}

fn opened<const N: usize>(
    commitments: &BTreeMap<PeerId, Commitment>,
    from: &PeerId,
    opening: &Decommitment,
) -> Result<[ProjectivePoint; N]> {
    commitments
        .get(from)
        .ok_or_else(|| Error::UnknownPeer(from.clone()))?
        .verify(opening)?;
    decode_points(&opening.message)
}

/// This signer's share `s_i` and the blinding material `l_i`, `ρ_i`
pub(super) struct ShareCheck {
    s: Scalar,
    l: Scalar,
    rho: Scalar,
    r_point: ProjectivePoint,
    v_point: ProjectivePoint,
    a_point: ProjectivePoint,
    opening: Decommitment,
}

impl ShareCheck {
    pub fn new(s: Scalar, r_point: ProjectivePoint) -> (Self, Commitment) {
        let l = Scalar::random(&mut OsRng);
        let rho = Scalar::random(&mut OsRng);
        let v_point = r_point * s + ProjectivePoint::GENERATOR * l;
        let a_point = ProjectivePoint::GENERATOR * rho;
        let (commitment, opening) =
            commitment::commit(&mut OsRng, &encode_points(&[v_point, a_point]));
        let check = Self {
            s,
            l,
            rho,
            r_point,
            v_point,
            a_point,
            opening,
        };
        (check, commitment)
    }
}

impl Drop for ShareCheck {
    fn drop(&mut self) {
        self.s.zeroize();
        self.l.zeroize();
        self.rho.zeroize();
    }
}

/// Round 6: collect the `(V_j, A_j)` commitments
pub(crate) struct CommitViAiHandler {
    context: SignContext,
    r: Scalar,
    check: ShareCheck,
    commitments: BTreeMap<PeerId, Commitment>,
}

impl CommitViAiHandler {
    pub(super) fn new(context: SignContext, r: Scalar, check: ShareCheck) -> Self {
        Self {
            context,
            r,
            check,
            commitments: BTreeMap::new(),
        }
    }
}

impl Handler<SignMessage> for CommitViAiHandler {
    fn message_type(&self) -> SignMessageType {
        SignMessageType::CommitViAi
    }

    fn required_count(&self) -> usize {
        self.context.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<SignMessage>, message: &SignMessage) -> Result<()> {
        let SignBody::CommitViAi { commitment } = &message.body else {
            return Err(unexpected("commit-vi-ai"));
        };
        self.commitments.insert(message.id.clone(), *commitment);
        Ok(())
    }

    fn finalize(self: Box<Self>, _peers: &Peers<SignMessage>) -> Result<Advance<SignMessage>> {
        let self_id = self.context.self_id();
        let check = &self.check;
        let v_proof = RepresentationProof::prove(
            &mut OsRng,
            (&check.s, &check.l),
            &check.r_point,
            &check.v_point,
            &self.context.proof_context("vi", self_id),
        );
        let a_proof = SchnorrProof::prove(
            &mut OsRng,
            &check.rho,
            &check.a_point,
            &self.context.proof_context("ai", self_id),
        );
        self.context.broadcast(SignBody::DecommitViAi {
            opening: check.opening.clone(),
            v_proof,
            a_proof,
        });

        let this = *self;
        Ok(Advance::Next(Box::new(DecommitViAiHandler {
            context: this.context,
            r: this.r,
            check: this.check,
            commitments: this.commitments,
            v_sum: ProjectivePoint::IDENTITY,
            a_sum: ProjectivePoint::IDENTITY,
        })))
    }
}

/// Round 7: verify the `(V_j, A_j)` openings and commit to `(U_i, T_i)`
pub(crate) struct DecommitViAiHandler {
    context: SignContext,
    r: Scalar,
    check: ShareCheck,
    commitments: BTreeMap<PeerId, Commitment>,
    v_sum: ProjectivePoint,
    a_sum: ProjectivePoint,
}

impl Handler<SignMessage> for DecommitViAiHandler {
    fn message_type(&self) -> SignMessageType {
        SignMessageType::DecommitViAi
    }

    fn required_count(&self) -> usize {
        self.context.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<SignMessage>, message: &SignMessage) -> Result<()> {
        let SignBody::DecommitViAi {
            opening,
            v_proof,
            a_proof,
        } = &message.body
        else {
            return Err(unexpected("decommit-vi-ai"));
        };
        let [v_point, a_point] = opened(&self.commitments, &message.id, opening)?;
        v_proof.verify(
            &self.check.r_point,
            &v_point,
            &self.context.proof_context("vi", &message.id),
        )?;
        a_proof.verify(&a_point, &self.context.proof_context("ai", &message.id))?;

        self.v_sum += v_point;
        self.a_sum += a_point;
        Ok(())
    }

    fn finalize(self: Box<Self>, _peers: &Peers<SignMessage>) -> Result<Advance<SignMessage>> {
        let check = &self.check;
        let v = self.v_sum + check.v_point
            - ProjectivePoint::GENERATOR * self.context.m()
            - self.context.expected_public_key * self.r;
        let a = self.a_sum + check.a_point;
        let u_point = v * check.rho;
        let t_point = a * check.l;

        let (commitment, opening) =
            commitment::commit(&mut OsRng, &encode_points(&[u_point, t_point]));
        self.context.broadcast(SignBody::CommitUiTi { commitment });

        let this = *self;
        Ok(Advance::Next(Box::new(CommitUiTiHandler {
            context: this.context,
            r: this.r,
            check: this.check,
            opening,
            u_point,
            t_point,
            commitments: BTreeMap::new(),
        })))
    }
}

/// Round 8: collect the `(U_j, T_j)` commitments
pub(crate) struct CommitUiTiHandler {
    context: SignContext,
    r: Scalar,
    check: ShareCheck,
    opening: Decommitment,
    u_point: ProjectivePoint,
    t_point: ProjectivePoint,
    commitments: BTreeMap<PeerId, Commitment>,
}

impl Handler<SignMessage> for CommitUiTiHandler {
    fn message_type(&self) -> SignMessageType {
        SignMessageType::CommitUiTi
    }

    fn required_count(&self) -> usize {
        self.context.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<SignMessage>, message: &SignMessage) -> Result<()> {
        let SignBody::CommitUiTi { commitment } = &message.body else {
            return Err(unexpected("commit-ui-ti"));
        };
        self.commitments.insert(message.id.clone(), *commitment);
        Ok(())
    }

    fn finalize(self: Box<Self>, _peers: &Peers<SignMessage>) -> Result<Advance<SignMessage>> {
        self.context.broadcast(SignBody::DecommitUiTi {
            opening: self.opening.clone(),
        });

        let this = *self;
        Ok(Advance::Next(Box::new(DecommitUiTiHandler {
            context: this.context,
            r: this.r,
            check: this.check,
            commitments: this.commitments,
            u_sum: this.u_point,
            t_sum: this.t_point,
        })))
    }
}

/// Round 9: require `ΣU_j == ΣT_j`, then release `s_i`
pub(crate) struct DecommitUiTiHandler {
    context: SignContext,
    r: Scalar,
    check: ShareCheck,
    commitments: BTreeMap<PeerId, Commitment>,
    u_sum: ProjectivePoint,
    t_sum: ProjectivePoint,
}

impl Handler<SignMessage> for DecommitUiTiHandler {
    fn message_type(&self) -> SignMessageType {
        SignMessageType::DecommitUiTi
    }

    fn required_count(&self) -> usize {
        self.context.peer_manager.num_peers()
    }

    fn handle(&mut self, _peers: &Peers<SignMessage>, message: &SignMessage) -> Result<()> {
        let SignBody::DecommitUiTi { opening } = &message.body else {
            return Err(unexpected("decommit-ui-ti"));
        };
        let [u_point, t_point] = opened(&self.commitments, &message.id, opening)?;
        self.u_sum += u_point;
        self.t_sum += t_point;
        Ok(())
    }

    fn finalize(self: Box<Self>, _peers: &Peers<SignMessage>) -> Result<Advance<SignMessage>> {
        if self.u_sum != self.t_sum {
            warn!(peer = %self.context.self_id(), "Signature shares do not add up");
            return Err(Error::Inconsistent("signature share check failed".into()));
        }

        let s = self.check.s;
        self.context.broadcast(SignBody::Si { s });
        debug!("Signature share sent");

        let this = *self;
        Ok(Advance::Next(Box::new(SiHandler::new(this.context, this.r, s))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_list_codec() {
        let p = ProjectivePoint::GENERATOR * Scalar::from(3u64);
        let bytes = encode_points(&[p, ProjectivePoint::IDENTITY]);
        let [a, b] = decode_points::<2>(&bytes).unwrap();
        assert_eq!((a, b), (p, ProjectivePoint::IDENTITY));

        assert!(decode_points::<3>(&bytes).is_err());
        assert!(decode_points::<1>(&bytes).is_err());
        assert!(decode_points::<2>(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_honest_shares_balance() {
        // Two signers whose shares sum to a valid signature for m = 5, r = 7
        let x = Scalar::from(11u64);
        let k = Scalar::from(13u64);
        let (m, r) = (Scalar::from(5u64), Scalar::from(7u64));
        let public_key = ProjectivePoint::GENERATOR * x;
        let r_point = ProjectivePoint::GENERATOR * k.invert().unwrap();
        let s = k * (m + r * x);
        let split = Scalar::from(1000u64);

        let checks = [
            ShareCheck::new(split, r_point).0,
            ShareCheck::new(s - split, r_point).0,
        ];
        let balance = |checks: &[ShareCheck]| {
            let v = checks.iter().fold(ProjectivePoint::IDENTITY, |acc, c| acc + c.v_point)
                - ProjectivePoint::GENERATOR * m
                - public_key * r;
            let a = checks.iter().fold(ProjectivePoint::IDENTITY, |acc, c| acc + c.a_point);
            let u = checks.iter().fold(ProjectivePoint::IDENTITY, |acc, c| acc + v * c.rho);
            let t = checks.iter().fold(ProjectivePoint::IDENTITY, |acc, c| acc + a * c.l);
            u == t
        };
        assert!(balance(&checks));

        let skewed = [
            ShareCheck::new(split + Scalar::ONE, r_point).0,
            ShareCheck::new(s - split, r_point).0,
        ];
        assert!(!balance(&skewed));
    }
}
