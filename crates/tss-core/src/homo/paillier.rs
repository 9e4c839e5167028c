//! Paillier encryption over `num-bigint`
//!
//! `g = n + 1`, so `Enc(m; r) = (1 + m·n) · r^n mod n²` and decryption uses
//! `λ = lcm(p-1, q-1)`, `μ = λ⁻¹ mod n`.

use super::{Ciphertext, HomoCrypto, HomoPublicKey};
use crate::{Error, Result};
use crypto_bigint::{Encoding, U1024};
use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Smallest modulus accepted from a peer
pub const MIN_MODULUS_BITS: u64 = 1024;

/// Largest modulus this crate generates or accepts as its own key
pub const MAX_MODULUS_BITS: u64 = 2 * U1024::BITS as u64;

/// Random prime with exactly `bits` bits, `bits <= 1024`
fn generate_prime<R: RngCore + CryptoRng>(rng: &mut R, bits: u64) -> Result<BigUint> {
    let bit_length = bits
        .try_into()
        .map_err(|_| Error::InvalidConfig(format!("prime size {} out of range", bits)))?;
    let prime: U1024 = crypto_primes::generate_prime_with_rng(rng, Some(bit_length));
    Ok(BigUint::from_bytes_be(&prime.to_be_bytes()))
}

fn is_prime<R: RngCore + CryptoRng>(rng: &mut R, candidate: &BigUint) -> bool {
    let bytes = candidate.to_bytes_be();
    let width = U1024::BYTES;
    if bytes.len() > width {
        return false;
    }
    let mut padded = vec![0u8; width];
    padded[width - bytes.len()..].copy_from_slice(&bytes);
    crypto_primes::is_prime_with_rng(rng, &U1024::from_be_slice(&padded))
}

/// Paillier public key `n`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierPublicKey {
    n: BigUint,
    n_square: BigUint,
}

impl PaillierPublicKey {
    fn new(n: BigUint) -> Self {
        let n_square = &n * &n;
        Self { n, n_square }
    }

    /// Decode a peer's modulus
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let n = BigUint::from_bytes_be(bytes);
        if n.bits() < MIN_MODULUS_BITS || n.is_even() {
            return Err(Error::Deserialization(format!(
                "invalid Paillier modulus of {} bits",
                n.bits()
            )));
        }
        Ok(Self::new(n))
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    fn check(&self, ciphertext: &Ciphertext) -> Result<()> {
        let c = &ciphertext.0;
        if c.is_zero() || *c >= self.n_square || !c.gcd(&self.n).is_one() {
            return Err(Error::VerificationFailed("invalid Paillier ciphertext".into()));
        }
        Ok(())
    }
}

impl HomoPublicKey for PaillierPublicKey {
    fn encrypt(&self, message: &BigUint) -> Result<Ciphertext> {
        if *message >= self.n {
            return Err(Error::Crypto("plaintext exceeds Paillier modulus".into()));
        }
        let mut rng = OsRng;
        let r = loop {
            let r = rng.gen_biguint_below(&self.n);
            if !r.is_zero() && r.gcd(&self.n).is_one() {
                break r;
            }
        };
        let gm = (message * &self.n + 1u32) % &self.n_square;
        let rn = r.modpow(&self.n, &self.n_square);
        Ok(Ciphertext(gm * rn % &self.n_square))
    }

    fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check(a)?;
        self.check(b)?;
        Ok(Ciphertext(&a.0 * &b.0 % &self.n_square))
    }

    fn mul_const(&self, a: &Ciphertext, k: &BigUint) -> Result<Ciphertext> {
        self.check(a)?;
        Ok(Ciphertext(a.0.modpow(k, &self.n_square)))
    }

    fn message_range(&self) -> &BigUint {
        &self.n
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.n.to_bytes_be()
    }
}

/// Paillier key pair
pub struct Paillier {
    public: PaillierPublicKey,
    lambda: BigUint,
    mu: BigUint,
}

impl Paillier {
    /// Generate a key pair with a modulus of `bits` bits
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R, bits: u64) -> Result<Self> {
        if bits % 2 != 0 || !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&bits) {
            return Err(Error::InvalidConfig(format!(
                "Paillier modulus must have an even number of bits in {}..={}",
                MIN_MODULUS_BITS, MAX_MODULUS_BITS
            )));
        }
        loop {
            let p = generate_prime(rng, bits / 2)?;
            let q = generate_prime(rng, bits / 2)?;
            match Self::from_primes(p, q) {
                Ok(key) if key.public.n.bits() == bits => {
                    debug!(bits = key.public.n.bits(), "Generated Paillier key");
                    return Ok(key);
                }
                _ => continue,
            }
        }
    }

    /// Build a key pair from two distinct primes
    pub fn from_primes(p: BigUint, q: BigUint) -> Result<Self> {
        if p == q {
            return Err(Error::InvalidConfig("Paillier primes must differ".into()));
        }
        let mut rng = OsRng;
        if !is_prime(&mut rng, &p) || !is_prime(&mut rng, &q) {
            return Err(Error::InvalidConfig("Paillier factor is not prime".into()));
        }

        let n = &p * &q;
        let p_minus_one = &p - 1u32;
        let q_minus_one = &q - 1u32;
        if !n.gcd(&(&p_minus_one * &q_minus_one)).is_one() {
            return Err(Error::InvalidConfig("gcd(n, φ(n)) != 1".into()));
        }
        let lambda = p_minus_one.lcm(&q_minus_one);
        let mu = (&lambda % &n)
            .modinv(&n)
            .ok_or_else(|| Error::InvalidConfig("λ not invertible mod n".into()))?;

        Ok(Self {
            public: PaillierPublicKey::new(n),
            lambda,
            mu,
        })
    }

    pub fn paillier_public_key(&self) -> &PaillierPublicKey {
        &self.public
    }
}

impl HomoCrypto for Paillier {
    fn public_key(&self) -> &dyn HomoPublicKey {
        &self.public
    }

    fn decrypt(&self, ciphertext: &Ciphertext) -> Result<BigUint> {
        self.public.check(ciphertext)?;
        let n = &self.public.n;
        let x = ciphertext.0.modpow(&self.lambda, &self.public.n_square);
        let l = (x - 1u32) / n;
        Ok(l * &self.mu % n)
    }

    fn parse_public_key(&self, bytes: &[u8]) -> Result<Box<dyn HomoPublicKey>> {
        Ok(Box::new(PaillierPublicKey::from_bytes(bytes)?))
    }
}

#[cfg(test)]
pub(crate) mod test_keys {
    use super::*;

    /// 768-bit primes; each pair yields a 1536-bit modulus
    pub(super) const PRIMES: [&str; 6] = [
        "cb718ffedd3c211aac722117493bca318dccbafa8ec1eac1828d5be2c9ddca5f8eb7c86bf810c3ebb58ecc73a0c1bf2818462eb68d09d698529fcd6358c4ba618954d4e1469a29b9a18c63cb95ea0691a5a71f42687c05f7826469bc72038569",
        "ccbbabe531a4fb1964f34863538ddd587729f1801bd91935252c28f7a589dbbc007fde979470ee4c6cc84a1be78a0ff4879a93068b704565d05bc5407d76def21c8ba4145e679f3e6cc6a3a966c8d6ab1582dd506572ef2fe5266059ae279d4d",
        "e968dc4c27e01a6afc17b5b62c21583b07ce84f788378d898a38359093ebf3cc9c90a01287734bdb342851092de2f2a3147cfb3ade8e67a4f86698d86b0548d1abccd55146e20ae0f84f9df6249c8ec93315684d7b725690513b58a7744669e9",
        "ff023b2f8af2e847dbbc5090e9a7262b919c687ce408e690881c3a57660b2e6239feabda39b3b0f8958a6ed3fa6f66f3ec3d34e0675493f13f84a94edbed02c4739a5079ae04ae0479aa11f8ca13d8222149526e50591e6bfd9ded978d489125",
        "dd92f6ae144817e19f157163ca4f8c980bf471500ed50eaa301a78309bcd762a5775ec1888a358dcd86ee3094ab57cd1f36bcbaf01b6cb40349d03ec15228aafd151a48fa15c8a28ac99b0a1e426e316da9e3c5ae489462a7ce07f7599dbc831",
        "facdc6ce715e4c7831468a04331418ffcebab30a85000a0a0369a64fd688ccc141150ff63bf5e5ea938221de950334da5a95ab75a39233d52b73f46dc1a218c20d9653346f35bc810d06249ef47ca0febc303a4fb406932533241351bb96ec15",
    ];

    /// One of three fixed key pairs
    pub(crate) fn paillier(index: usize) -> Paillier {
        let prime = |i: usize| BigUint::parse_bytes(PRIMES[i].as_bytes(), 16).unwrap();
        Paillier::from_primes(prime(2 * index), prime(2 * index + 1)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn test_encrypt_decrypt_and_homomorphism() {
        let key = test_keys::paillier(0);
        let pk = key.public_key();
        let a = BigUint::from(123_456_789u64);
        let b = BigUint::from(987_654_321u64);

        let ca = pk.encrypt(&a).unwrap();
        let cb = pk.encrypt(&b).unwrap();
        assert_ne!(ca, pk.encrypt(&a).unwrap());
        assert_eq!(key.decrypt(&ca).unwrap(), a);

        let sum = pk.add(&ca, &cb).unwrap();
        assert_eq!(key.decrypt(&sum).unwrap(), &a + &b);

        let k = BigUint::from(1_000u32);
        let scaled = pk.mul_const(&ca, &k).unwrap();
        assert_eq!(key.decrypt(&scaled).unwrap(), &a * &k);
    }

    #[test]
    fn test_peer_key_round_trip() {
        let alice = test_keys::paillier(0);
        let bob = test_keys::paillier(1);

        let alice_pk = bob.parse_public_key(&alice.public_key().to_bytes()).unwrap();
        let m = BigUint::from(42u32);
        let c = alice_pk.encrypt(&m).unwrap();
        assert_eq!(alice.decrypt(&c).unwrap(), m);
        assert!(bob.parse_public_key(&[0x03, 0x05]).is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        let key = test_keys::paillier(2);
        let pk = key.paillier_public_key();
        assert!(pk.encrypt(pk.n()).is_err());
        assert!(key.decrypt(&Ciphertext(BigUint::zero())).is_err());
        assert!(key.decrypt(&Ciphertext(pk.n() * pk.n())).is_err());
        assert!(key.decrypt(&Ciphertext(pk.n().clone())).is_err());
    }

    #[test]
    fn test_key_from_primes() {
        let prime = |hex: &str| BigUint::parse_bytes(hex.as_bytes(), 16).unwrap();
        let p = prime(test_keys::PRIMES[0]);
        let q = prime(test_keys::PRIMES[1]);

        assert!(Paillier::from_primes(p.clone(), p.clone()).is_err());
        // 561 = 3 * 11 * 17
        assert!(Paillier::from_primes(p.clone(), BigUint::from(561u32)).is_err());
        assert!(Paillier::from_primes(&p * &q, q.clone()).is_err());

        let key = Paillier::from_primes(p.clone(), q.clone()).unwrap();
        assert_eq!(key.paillier_public_key().n(), &(&p * &q));
        let lambda_mod_n = &key.lambda % key.public.n();
        assert!((lambda_mod_n * &key.mu % key.public.n()).is_one());
    }

    #[test]
    fn test_generated_key() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        assert!(Paillier::new(&mut rng, 512).is_err());
        assert!(Paillier::new(&mut rng, 4096).is_err());
        assert!(Paillier::new(&mut rng, 1025).is_err());

        let key = Paillier::new(&mut rng, MIN_MODULUS_BITS).unwrap();
        assert_eq!(key.paillier_public_key().n().bits(), MIN_MODULUS_BITS);
        let m = BigUint::from(0xdead_beefu32);
        let c = key.public_key().encrypt(&m).unwrap();
        assert_eq!(key.decrypt(&c).unwrap(), m);
    }
}
