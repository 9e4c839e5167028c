//! Schnorr proofs of knowledge of a discrete logarithm
//!
//! The non-interactive variant derives its challenge from a merlin transcript
//! bound to a caller-supplied context. The interactive variant is used where
//! the verifier must pick the challenge itself (password verification).
//! [`RepresentationProof`] extends the non-interactive proof to a point over
//! two bases.

use crate::types::{decode_point, encode_point, reduce_to_scalar, scalar_serde};
use crate::{Error, Result};
use k256::elliptic_curve::{Field, Group};
use k256::{ProjectivePoint, Scalar};
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Non-interactive proof of knowledge of `x` with `X = x·G`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrProof {
    /// Commitment `A = r·G`, SEC1 compressed
    pub a: Vec<u8>,
    /// Response `z = r + c·x`
    #[serde(with = "scalar_serde")]
    pub z: Scalar,
}

fn challenge(context: &[u8], public: &ProjectivePoint, a: &[u8]) -> Scalar {
    let mut transcript = Transcript::new(b"tss-rounds schnorr");
    transcript.append_message(b"context", context);
    transcript.append_message(b"public", &encode_point(public));
    transcript.append_message(b"commitment", a);
    let mut bytes = [0u8; 32];
    transcript.challenge_bytes(b"challenge", &mut bytes);
    reduce_to_scalar(&bytes)
}

impl SchnorrProof {
    /// Prove knowledge of `secret` for `public = secret·G`
    pub fn prove<R: RngCore + CryptoRng>(
        rng: &mut R,
        secret: &Scalar,
        public: &ProjectivePoint,
        context: &[u8],
    ) -> Self {
        let mut r = Scalar::random(&mut *rng);
        let a = encode_point(&(ProjectivePoint::GENERATOR * r));
        let c = challenge(context, public, &a);
        let z = r + c * secret;
        r.zeroize();
        Self { a, z }
    }

    /// Check the proof against `public` under the same context
    pub fn verify(&self, public: &ProjectivePoint, context: &[u8]) -> Result<()> {
        let a = decode_point(&self.a)?;
        let c = challenge(context, public, &self.a);
        if ProjectivePoint::GENERATOR * self.z == a + *public * c {
            Ok(())
        } else {
            Err(Error::VerificationFailed("invalid Schnorr proof".into()))
        }
    }
}

/// Non-interactive proof of knowledge of `(a, b)` with `V = a·H + b·G`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentationProof {
    /// Commitment `A = r_a·H + r_b·G`, SEC1 compressed
    pub a: Vec<u8>,
    #[serde(with = "scalar_serde")]
    pub z_a: Scalar,
    #[serde(with = "scalar_serde")]
    pub z_b: Scalar,
}

fn representation_challenge(
    context: &[u8],
    base: &ProjectivePoint,
    public: &ProjectivePoint,
    a: &[u8],
) -> Scalar {
    let mut transcript = Transcript::new(b"tss-rounds representation");
    transcript.append_message(b"context", context);
    transcript.append_message(b"base", &encode_point(base));
    transcript.append_message(b"public", &encode_point(public));
    transcript.append_message(b"commitment", a);
    let mut bytes = [0u8; 32];
    transcript.challenge_bytes(b"challenge", &mut bytes);
    reduce_to_scalar(&bytes)
}

impl RepresentationProof {
    /// Prove knowledge of `(a, b)` for `public = a·base + b·G`
    pub fn prove<R: RngCore + CryptoRng>(
        rng: &mut R,
        (a, b): (&Scalar, &Scalar),
        base: &ProjectivePoint,
        public: &ProjectivePoint,
        context: &[u8],
    ) -> Self {
        let mut r_a = Scalar::random(&mut *rng);
        let mut r_b = Scalar::random(&mut *rng);
        let commitment = encode_point(&(*base * r_a + ProjectivePoint::GENERATOR * r_b));
        let c = representation_challenge(context, base, public, &commitment);
        let proof = Self {
            z_a: r_a + c * a,
            z_b: r_b + c * b,
            a: commitment,
        };
        r_a.zeroize();
        r_b.zeroize();
        proof
    }

    pub fn verify(
        &self,
        base: &ProjectivePoint,
        public: &ProjectivePoint,
        context: &[u8],
    ) -> Result<()> {
        let a = decode_point(&self.a)?;
        let c = representation_challenge(context, base, public, &self.a);
        if *base * self.z_a + ProjectivePoint::GENERATOR * self.z_b == a + *public * c {
            Ok(())
        } else {
            Err(Error::VerificationFailed("invalid representation proof".into()))
        }
    }
}

/// Prover's opening message: the public point and the commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrProver1 {
    pub v: Vec<u8>,
    pub a: Vec<u8>,
}

/// Verifier's challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrVerifier1 {
    #[serde(with = "scalar_serde")]
    pub c: Scalar,
}

/// Prover's response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrProver2 {
    #[serde(with = "scalar_serde")]
    pub z: Scalar,
}

/// Prover side of the three-move protocol
pub struct InteractiveProver {
    secret: Scalar,
    r: Scalar,
    public: ProjectivePoint,
}

impl InteractiveProver {
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R, secret: Scalar) -> Self {
        Self {
            secret,
            r: Scalar::random(&mut *rng),
            public: ProjectivePoint::GENERATOR * secret,
        }
    }

    pub fn public_point(&self) -> ProjectivePoint {
        self.public
    }

    pub fn first_message(&self) -> SchnorrProver1 {
        SchnorrProver1 {
            v: encode_point(&self.public),
            a: encode_point(&(ProjectivePoint::GENERATOR * self.r)),
        }
    }

    pub fn respond(&self, challenge: &SchnorrVerifier1) -> SchnorrProver2 {
        SchnorrProver2 {
            z: self.r + challenge.c * self.secret,
        }
    }
}

impl Drop for InteractiveProver {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.r.zeroize();
    }
}

/// Verifier side of the three-move protocol
pub struct InteractiveVerifier {
    public: ProjectivePoint,
    a: ProjectivePoint,
    c: Scalar,
}

impl InteractiveVerifier {
    /// Accept the prover's opening and draw a challenge
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R, opening: &SchnorrProver1) -> Result<Self> {
        let public = decode_point(&opening.v)?;
        if bool::from(public.is_identity()) {
            return Err(Error::IdentityPublicKey);
        }
        Ok(Self {
            public,
            a: decode_point(&opening.a)?,
            c: Scalar::random(&mut *rng),
        })
    }

    pub fn public_point(&self) -> ProjectivePoint {
        self.public
    }

    pub fn challenge_message(&self) -> SchnorrVerifier1 {
        SchnorrVerifier1 { c: self.c }
    }

    pub fn verify(&self, response: &SchnorrProver2) -> Result<()> {
        if ProjectivePoint::GENERATOR * response.z == self.a + self.public * self.c {
            Ok(())
        } else {
            Err(Error::VerificationFailed(
                "invalid interactive Schnorr response".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_proof_is_bound_to_context() {
        let x = Scalar::random(&mut OsRng);
        let public = ProjectivePoint::GENERATOR * x;
        let proof = SchnorrProof::prove(&mut OsRng, &x, &public, b"peer-a");

        proof.verify(&public, b"peer-a").unwrap();
        assert!(proof.verify(&public, b"peer-b").is_err());
        assert!(proof
            .verify(&(public + ProjectivePoint::GENERATOR), b"peer-a")
            .is_err());
    }

    #[test]
    fn test_representation_proof() {
        let base = ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng);
        let a = Scalar::random(&mut OsRng);
        let b = Scalar::random(&mut OsRng);
        let public = base * a + ProjectivePoint::GENERATOR * b;
        let proof = RepresentationProof::prove(&mut OsRng, (&a, &b), &base, &public, b"v");

        proof.verify(&base, &public, b"v").unwrap();
        assert!(proof.verify(&base, &public, b"w").is_err());
        assert!(proof.verify(&ProjectivePoint::GENERATOR, &public, b"v").is_err());

        // Right point, wrong witness
        let wrong = RepresentationProof::prove(&mut OsRng, (&b, &a), &base, &public, b"v");
        assert!(wrong.verify(&base, &public, b"v").is_err());
    }

    #[test]
    fn test_interactive_round_trip() {
        let prover = InteractiveProver::new(&mut OsRng, Scalar::random(&mut OsRng));
        let verifier = InteractiveVerifier::new(&mut OsRng, &prover.first_message()).unwrap();
        assert_eq!(verifier.public_point(), prover.public_point());

        let response = prover.respond(&verifier.challenge_message());
        verifier.verify(&response).unwrap();

        let forged = SchnorrProver2 {
            z: response.z + Scalar::ONE,
        };
        assert!(verifier.verify(&forged).is_err());
    }

    #[test]
    fn test_interactive_rejects_identity() {
        let opening = SchnorrProver1 {
            v: vec![0x00],
            a: encode_point(&ProjectivePoint::GENERATOR),
        };
        assert!(InteractiveVerifier::new(&mut OsRng, &opening).is_err());
    }
}
