//! Salted hash commitments
//!
//! `C = BLAKE3-derive_key(ctx, salt || len(m) || m)`. The salt makes the
//! commitment hiding; the length prefix keeps distinct messages from sharing
//! an encoding.

use crate::{Error, Result};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

const COMMITMENT_CONTEXT: &str = "tss-rounds v1 hash-commitment";

/// Binding digest sent in a commit round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

/// Opening of a [`Commitment`], sent in the matching decommit round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decommitment {
    pub salt: [u8; 32],
    pub message: Vec<u8>,
}

/// Commit to `message` with a fresh salt
pub fn commit<R: RngCore + CryptoRng>(rng: &mut R, message: &[u8]) -> (Commitment, Decommitment) {
    let mut salt = [0u8; 32];
    rng.fill_bytes(&mut salt);
    let commitment = digest(&salt, message);
    (
        commitment,
        Decommitment {
            salt,
            message: message.to_vec(),
        },
    )
}

fn digest(salt: &[u8; 32], message: &[u8]) -> Commitment {
    let mut hasher = blake3::Hasher::new_derive_key(COMMITMENT_CONTEXT);
    hasher.update(salt);
    hasher.update(&(message.len() as u64).to_be_bytes());
    hasher.update(message);
    Commitment(*hasher.finalize().as_bytes())
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Commitment {
    /// Check that `decommitment` opens this commitment
    pub fn verify(&self, decommitment: &Decommitment) -> Result<()> {
        let expected = digest(&decommitment.salt, &decommitment.message);
        if bool::from(self.0.ct_eq(&expected.0)) {
            Ok(())
        } else {
            Err(Error::VerificationFailed(
                "decommitment does not match commitment".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_open_and_tamper() {
        let (commitment, mut opening) = commit(&mut OsRng, b"bq values");
        commitment.verify(&opening).unwrap();

        opening.message[0] ^= 1;
        assert!(commitment.verify(&opening).is_err());
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        use rand::SeedableRng;
        use rand_chacha::ChaCha20Rng;

        let (a, _) = commit(&mut ChaCha20Rng::seed_from_u64(7), b"bq values");
        let (b, _) = commit(&mut ChaCha20Rng::seed_from_u64(7), b"bq values");
        assert_eq!(a, b);
        assert_eq!(a.to_string().len(), 64);
    }

    #[test]
    fn test_commitment_is_salted() {
        let (a, _) = commit(&mut OsRng, b"same");
        let (b, _) = commit(&mut OsRng, b"same");
        assert_ne!(a, b);
    }
}
