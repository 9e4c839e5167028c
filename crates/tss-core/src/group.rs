//! Prime-order subgroup of `Z_p^*` used to commit to LISS shares
//!
//! With a safe prime `p = 2q + 1` the quadratic residues form a subgroup of
//! prime order `q`. `g = 2` generates it for the RFC 3526 modulus, since
//! `p ≡ 7 (mod 8)` makes 2 a quadratic residue.

use crate::{Error, Result};
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// RFC 3526 group 14, 2048-bit MODP safe prime
const RFC3526_2048_P: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

/// Element of the subgroup, reduced mod `p`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupElement(pub BigUint);

/// The group `<g>` of prime order `q` inside `Z_p^*`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModularGroup {
    p: BigUint,
    q: BigUint,
    g: BigUint,
}

impl ModularGroup {
    /// Build the group from a safe prime `p` and a generator of the residues
    pub fn new(p: BigUint, g: BigUint) -> Result<Self> {
        let two = BigUint::from(2u32);
        if p <= two || (&p % &two).is_zero() {
            return Err(Error::InvalidConfig("modulus must be an odd prime".into()));
        }
        let q = (&p - 1u32) >> 1;
        if g <= BigUint::one() || g >= p || !g.modpow(&q, &p).is_one() {
            return Err(Error::InvalidConfig(
                "generator must lie in the prime-order subgroup".into(),
            ));
        }
        Ok(Self { p, q, g })
    }

    /// The 2048-bit RFC 3526 group with `g = 2`
    pub fn rfc3526() -> Result<Self> {
        let p = BigUint::parse_bytes(RFC3526_2048_P.as_bytes(), 16)
            .ok_or_else(|| Error::Internal("malformed RFC 3526 modulus".into()))?;
        Self::new(p, BigUint::from(2u32))
    }

    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    pub fn order(&self) -> &BigUint {
        &self.q
    }

    pub fn generator(&self) -> GroupElement {
        GroupElement(self.g.clone())
    }

    pub fn identity(&self) -> GroupElement {
        GroupElement(BigUint::one())
    }

    /// `g^e`
    pub fn exp_g(&self, e: &BigUint) -> GroupElement {
        GroupElement(self.g.modpow(&(e % &self.q), &self.p))
    }

    /// `base^e`
    pub fn exp(&self, base: &GroupElement, e: &BigUint) -> GroupElement {
        GroupElement(base.0.modpow(&(e % &self.q), &self.p))
    }

    pub fn mul(&self, a: &GroupElement, b: &GroupElement) -> GroupElement {
        GroupElement(&a.0 * &b.0 % &self.p)
    }

    /// Product of every element, identity for an empty iterator
    pub fn product<'a, I>(&self, elements: I) -> GroupElement
    where
        I: IntoIterator<Item = &'a GroupElement>,
    {
        elements
            .into_iter()
            .fold(self.identity(), |acc, e| self.mul(&acc, e))
    }

    /// Reject anything outside the order-`q` subgroup
    pub fn validate(&self, element: &GroupElement) -> Result<()> {
        let value = &element.0;
        if value.is_zero() || *value >= self.p || !value.modpow(&self.q, &self.p).is_one() {
            return Err(Error::VerificationFailed(
                "element outside the commitment group".into(),
            ));
        }
        Ok(())
    }

    /// Uniform exponent in `[0, q)`
    pub fn random_exponent<R: RngCore + CryptoRng>(&self, rng: &mut R) -> BigUint {
        rng.gen_biguint_below(&self.q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_rfc3526_parameters() {
        let group = ModularGroup::rfc3526().unwrap();
        assert_eq!(group.modulus().bits(), 2048);
        assert_eq!(group.order().bits(), 2047);
        group.validate(&group.generator()).unwrap();
    }

    #[test]
    fn test_exponent_arithmetic() {
        let group = ModularGroup::rfc3526().unwrap();
        let a = group.random_exponent(&mut OsRng);
        let b = group.random_exponent(&mut OsRng);

        let sum = group.exp_g(&((&a + &b) % group.order()));
        assert_eq!(sum, group.mul(&group.exp_g(&a), &group.exp_g(&b)));
        assert_eq!(group.exp_g(group.order()), group.identity());
        assert_eq!(
            group.product([&group.exp_g(&a), &group.exp_g(&b)]),
            sum
        );
    }

    #[test]
    fn test_validate_rejects_non_members() {
        let group = ModularGroup::rfc3526().unwrap();
        assert!(group.validate(&GroupElement(BigUint::zero())).is_err());
        assert!(group
            .validate(&GroupElement(group.modulus().clone()))
            .is_err());
        // p - 1 has order 2
        let minus_one = GroupElement(group.modulus() - 1u32);
        assert!(group.validate(&minus_one).is_err());
    }

    #[test]
    fn test_small_safe_prime() {
        // p = 23, q = 11; 2 is a residue mod 23, 5 is not
        let group = ModularGroup::new(BigUint::from(23u32), BigUint::from(2u32)).unwrap();
        assert_eq!(group.order(), &BigUint::from(11u32));
        assert!(ModularGroup::new(BigUint::from(23u32), BigUint::from(5u32)).is_err());
    }
}
