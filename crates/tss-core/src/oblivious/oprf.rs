//! 2HashDH oblivious PRF over secp256k1
//!
//! `F_k(pw) = H2(pw, k·H1(pw))`. The requester blinds `H1(pw)` with a random
//! `r`, the responder multiplies by `k`, the requester strips `r`.

use crate::types::{decode_point, encode_point, reduce_to_scalar};
use crate::{Error, Result};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::hash2curve::{ExpandMsgXmd, GroupDigest};
use k256::elliptic_curve::{Field, Group};
use k256::{ProjectivePoint, Scalar, Secp256k1};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

const HASH_TO_CURVE_DST: &[u8] = b"tss-rounds-oprf-secp256k1_XMD:SHA-256_SSWU_RO_";
const OUTPUT_KEY: &[u8] = b"tss-rounds oprf output";

/// Blinded password point `r·H1(pw)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OprfRequest {
    pub alpha: Vec<u8>,
}

/// Evaluated point `k·r·H1(pw)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OprfResponse {
    pub beta: Vec<u8>,
}

/// `H1`: hash to curve with `expand_message_xmd` and the simplified SWU map
fn hash_to_curve(input: &[u8]) -> Result<ProjectivePoint> {
    Secp256k1::hash_from_bytes::<ExpandMsgXmd<Sha256>>(&[input], &[HASH_TO_CURVE_DST])
        .map_err(|e| Error::Crypto(format!("hash to curve: {}", e)))
}

fn output(password: &[u8], point: &ProjectivePoint) -> Result<Scalar> {
    let mut mac = Hmac::<Sha256>::new_from_slice(OUTPUT_KEY)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    mac.update(&(password.len() as u64).to_be_bytes());
    mac.update(password);
    mac.update(&encode_point(point));
    let bytes: [u8; 32] = mac.finalize().into_bytes().into();
    Ok(reduce_to_scalar(&bytes))
}

fn decode_non_identity(bytes: &[u8]) -> Result<ProjectivePoint> {
    let point = decode_point(bytes)?;
    if bool::from(point.is_identity()) {
        return Err(Error::VerificationFailed("identity OPRF element".into()));
    }
    Ok(point)
}

/// Password holder's side
pub struct Requester {
    password: Zeroizing<Vec<u8>>,
    blind: Scalar,
    alpha: ProjectivePoint,
}

impl Requester {
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R, password: &[u8]) -> Result<Self> {
        let blind = loop {
            let candidate = Scalar::random(&mut *rng);
            if !bool::from(candidate.is_zero()) {
                break candidate;
            }
        };
        let alpha = hash_to_curve(password)? * blind;
        Ok(Self {
            password: Zeroizing::new(password.to_vec()),
            blind,
            alpha,
        })
    }

    pub fn request(&self) -> OprfRequest {
        OprfRequest {
            alpha: encode_point(&self.alpha),
        }
    }

    /// Unblind the response into the PRF output
    pub fn compute(&self, response: &OprfResponse) -> Result<Scalar> {
        let beta = decode_non_identity(&response.beta)?;
        let inverse = Option::<Scalar>::from(self.blind.invert())
            .ok_or_else(|| Error::Internal("zero OPRF blind".into()))?;
        output(&self.password, &(beta * inverse))
    }
}

impl Drop for Requester {
    fn drop(&mut self) {
        self.blind.zeroize();
    }
}

/// Key holder's side
pub struct Responder {
    key: Scalar,
}

impl Responder {
    pub fn new(key: Scalar) -> Result<Self> {
        if bool::from(key.is_zero()) {
            return Err(Error::InvalidConfig("zero OPRF key".into()));
        }
        Ok(Self { key })
    }

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let key = Scalar::random(&mut *rng);
            if !bool::from(key.is_zero()) {
                return Self { key };
            }
        }
    }

    pub fn key(&self) -> &Scalar {
        &self.key
    }

    pub fn respond(&self, request: &OprfRequest) -> Result<OprfResponse> {
        let alpha = decode_non_identity(&request.alpha)?;
        debug!("Evaluating OPRF request");
        Ok(OprfResponse {
            beta: encode_point(&(alpha * self.key)),
        })
    }

    /// Evaluate the PRF directly on a known password
    pub fn evaluate(&self, password: &[u8]) -> Result<Scalar> {
        output(password, &(hash_to_curve(password)? * self.key))
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
