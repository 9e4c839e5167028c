//! Core types shared by the engine and the protocols

use crate::{Error, Result};
use elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{
    ecdsa,
    elliptic_curve::{bigint::U256, ops::Reduce, PrimeField},
    AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Unique identifier for a peer within one protocol instance
pub type PeerId = String;

/// Big-endian order of the secp256k1 group
const SECP256K1_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// ECDSA signature (r, s)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component
    pub r: [u8; 32],
    /// S component
    pub s: [u8; 32],
    /// Recovery ID (0 or 1)
    pub recovery_id: u8,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Convert to DER format
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let sig =
            ecdsa::Signature::from_scalars(FieldBytes::from(self.r), FieldBytes::from(self.s))
        .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(sig.to_der().as_bytes().to_vec())
    }

    /// Convert to bytes (r || s)
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }
}

/// Order of the secp256k1 group as a big integer
pub fn curve_order() -> BigUint {
    BigUint::from_bytes_be(&SECP256K1_ORDER)
}

/// Compressed SEC1 encoding of a point
pub fn encode_point(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

/// Parse a SEC1 encoded point
pub fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded =
        EncodedPoint::from_bytes(bytes).map_err(|e| Error::Deserialization(e.to_string()))?;
    let affine: AffinePoint = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| Error::Deserialization("Invalid curve point".into()))?;
    Ok(ProjectivePoint::from(affine))
}

/// Big-endian scalar bytes
pub fn encode_scalar(scalar: &Scalar) -> Vec<u8> {
    scalar.to_bytes().to_vec()
}

/// Parse a canonical big-endian scalar
pub fn decode_scalar(bytes: &[u8]) -> Result<Scalar> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Deserialization("Invalid scalar length".into()))?;
    Option::<Scalar>::from(Scalar::from_repr(array.into()))
        .ok_or_else(|| Error::Deserialization("Scalar out of range".into()))
}

/// Reduce 32 bytes modulo the group order
pub fn reduce_to_scalar(bytes: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&(*bytes).into())
}

/// Lift a scalar to a big integer in `[0, n)`
pub fn scalar_to_biguint(scalar: &Scalar) -> BigUint {
    BigUint::from_bytes_be(&scalar.to_bytes())
}

/// Reduce a big integer modulo the group order
pub fn biguint_to_scalar(value: &BigUint) -> Scalar {
    let reduced = (value % curve_order()).to_bytes_be();
    let mut bytes = [0u8; 32];
    bytes[32 - reduced.len()..].copy_from_slice(&reduced);
    reduce_to_scalar(&bytes)
}

/// Serde adapter that stores a scalar as 32 big-endian bytes
pub mod scalar_serde {
    use k256::{elliptic_curve::PrimeField, Scalar};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes = scalar.to_bytes();
        serializer.serialize_bytes(&bytes)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Scalar, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid scalar length"))?;
        Option::<Scalar>::from(Scalar::from_repr(array.into()))
            .ok_or_else(|| serde::de::Error::custom("Scalar out of range"))
    }
}
