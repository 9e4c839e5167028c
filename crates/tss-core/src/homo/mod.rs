//! Additively homomorphic encryption
//!
//! The signer only needs encryption under a peer's public key, ciphertext
//! addition and multiplication by a plaintext constant, and decryption under
//! its own key. Both sides sit behind trait objects so the signer is agnostic
//! of the scheme.

use crate::Result;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub mod paillier;

pub use paillier::{Paillier, PaillierPublicKey};

/// Opaque ciphertext of some homomorphic scheme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(pub BigUint);

/// Public half: encryption and homomorphic evaluation
pub trait HomoPublicKey: Debug + Send + Sync {
    /// Encrypt `message`, which must be below [`message_range`](Self::message_range)
    fn encrypt(&self, message: &BigUint) -> Result<Ciphertext>;

    /// `Enc(a + b)`
    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext>;

    /// `Enc(k · a)`
    fn mul_const(&self, a: &Ciphertext, k: &BigUint) -> Result<Ciphertext>;

    /// Exclusive upper bound of the plaintext space
    fn message_range(&self) -> &BigUint;

    /// Wire encoding
    fn to_bytes(&self) -> Vec<u8>;
}

/// Key pair: decryption plus parsing of peers' public keys
pub trait HomoCrypto: Send + Sync {
    fn public_key(&self) -> &dyn HomoPublicKey;

    fn decrypt(&self, ciphertext: &Ciphertext) -> Result<BigUint>;

    /// Decode a peer's public key produced by [`HomoPublicKey::to_bytes`]
    fn parse_public_key(&self, bytes: &[u8]) -> Result<Box<dyn HomoPublicKey>>;
}
