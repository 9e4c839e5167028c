//! Birkhoff interpolation over the secp256k1 scalar field
//!
//! A Birkhoff parameter `(x, rank)` names the share `f^(rank)(x)`, the
//! `rank`-th derivative of the sharing polynomial evaluated at `x`. Ordinary
//! Shamir shares are the special case `rank = 0`.

use crate::types::scalar_serde;
use crate::{Error, Result};
use k256::elliptic_curve::{Field, Group};
use k256::{ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// Position of one share on the sharing polynomial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BkParameter {
    #[serde(with = "scalar_serde")]
    pub x: Scalar,
    pub rank: u32,
}

impl BkParameter {
    pub fn new(x: Scalar, rank: u32) -> Self {
        Self { x, rank }
    }

    /// Row of the Birkhoff matrix: `d^rank/dx^rank [1, x, x^2, ...]`
    fn row(&self, width: usize) -> Vec<Scalar> {
        let rank = self.rank as u64;
        let mut row = vec![Scalar::ZERO; width];
        let mut x_power = Scalar::ONE;
        for (j, cell) in row.iter_mut().enumerate().skip(self.rank as usize) {
            // j! / (j - rank)!
            let falling = ((j as u64 - rank + 1)..=(j as u64))
                .fold(Scalar::ONE, |acc, k| acc * Scalar::from(k));
            *cell = falling * x_power;
            x_power *= self.x;
        }
        row
    }

    /// Evaluate the share this parameter names on `coefficients`
    fn evaluate(&self, coefficients: &[Scalar]) -> Scalar {
        self.row(coefficients.len())
            .iter()
            .zip(coefficients)
            .fold(Scalar::ZERO, |acc, (m, a)| acc + *m * a)
    }
}

/// Coefficients `c_i` with `Σ c_i · share_i = f(0)` for a qualified set
///
/// The number of parameters must equal `threshold`. Fails with
/// `InvalidConfig` when the parameters do not determine `f(0)` uniquely.
pub fn compute_bk_coefficients(bks: &[BkParameter], threshold: usize) -> Result<Vec<Scalar>> {
    if threshold == 0 || bks.len() != threshold {
        return Err(Error::InvalidConfig(format!(
            "need exactly {} Birkhoff parameters, got {}",
            threshold,
            bks.len()
        )));
    }

    // Solve M^T c = e_0 with an augmented matrix [M^T | e_0]
    let n = threshold;
    let rows: Vec<Vec<Scalar>> = bks.iter().map(|bk| bk.row(n)).collect();
    let mut aug: Vec<Vec<Scalar>> = (0..n)
        .map(|j| {
            let mut line: Vec<Scalar> = rows.iter().map(|row| row[j]).collect();
            line.push(if j == 0 { Scalar::ONE } else { Scalar::ZERO });
            line
        })
        .collect();

    for col in 0..n {
        let pivot = (col..n)
            .find(|&r| !bool::from(aug[r][col].is_zero()))
            .ok_or_else(|| Error::InvalidConfig("singular Birkhoff parameters".into()))?;
        aug.swap(col, pivot);

        let inverse = Option::<Scalar>::from(aug[col][col].invert())
            .ok_or_else(|| Error::InvalidConfig("singular Birkhoff parameters".into()))?;
        for cell in aug[col].iter_mut() {
            *cell *= inverse;
        }

        let pivot_row = aug[col].clone();
        for (r, line) in aug.iter_mut().enumerate() {
            if r == col || bool::from(line[col].is_zero()) {
                continue;
            }
            let factor = line[col];
            for (cell, p) in line.iter_mut().zip(&pivot_row) {
                *cell -= factor * p;
            }
        }
    }

    Ok(aug.into_iter().map(|line| line[n]).collect())
}

/// Check `Σ c_i · P_i == public_key`
pub fn validate_public_key(
    coefficients: &[Scalar],
    points: &[ProjectivePoint],
    public_key: &ProjectivePoint,
) -> Result<()> {
    if coefficients.len() != points.len() {
        return Err(Error::InconsistentPublicKey);
    }
    let combined = coefficients
        .iter()
        .zip(points)
        .fold(ProjectivePoint::IDENTITY, |acc, (c, p)| acc + *p * c);
    if combined == *public_key {
        Ok(())
    } else {
        Err(Error::InconsistentPublicKey)
    }
}

/// Deal shares of `secret` on a random polynomial of degree `threshold - 1`
pub fn deal_shares<R: RngCore + CryptoRng>(
    rng: &mut R,
    secret: &Scalar,
    bks: &[BkParameter],
    threshold: usize,
) -> Result<Vec<Scalar>> {
    if threshold == 0 || threshold > bks.len() {
        return Err(Error::InvalidConfig(format!(
            "threshold {} out of range for {} parameters",
            threshold,
            bks.len()
        )));
    }
    let mut coefficients = Vec::with_capacity(threshold);
    coefficients.push(*secret);
    coefficients.extend((1..threshold).map(|_| Scalar::random(&mut *rng)));
    Ok(bks.iter().map(|bk| bk.evaluate(&coefficients)).collect())
}

/// `x = 1..=n`, rank 0
pub fn shamir_parameters(n: usize) -> Vec<BkParameter> {
    (1..=n as u64)
        .map(|x| BkParameter::new(Scalar::from(x), 0))
        .collect()
}

/// Whether `point` is the group identity
pub(crate) fn is_identity(point: &ProjectivePoint) -> bool {
    bool::from(point.is_identity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_shamir_coefficients_recover_secret() {
        let secret = Scalar::random(&mut OsRng);
        let bks = shamir_parameters(3);
        let shares = deal_shares(&mut OsRng, &secret, &bks, 3).unwrap();

        let coefs = compute_bk_coefficients(&bks, 3).unwrap();
        let recovered = coefs
            .iter()
            .zip(&shares)
            .fold(Scalar::ZERO, |acc, (c, s)| acc + c * s);
        assert_eq!(recovered, secret);
    }

    #[test]
    fn test_any_qualified_subset_recovers() {
        let secret = Scalar::random(&mut OsRng);
        let bks = shamir_parameters(4);
        let shares = deal_shares(&mut OsRng, &secret, &bks, 2).unwrap();

        for (i, j) in [(0, 1), (1, 3), (3, 2)] {
            let coefs = compute_bk_coefficients(&[bks[i], bks[j]], 2).unwrap();
            assert_eq!(coefs[0] * shares[i] + coefs[1] * shares[j], secret);
        }
    }

    #[test]
    fn test_derivative_shares() {
        let secret = Scalar::random(&mut OsRng);
        let bks = vec![
            BkParameter::new(Scalar::from(1u64), 0),
            BkParameter::new(Scalar::from(2u64), 1),
        ];
        let shares = deal_shares(&mut OsRng, &secret, &bks, 2).unwrap();
        let coefs = compute_bk_coefficients(&bks, 2).unwrap();

        let public = ProjectivePoint::GENERATOR * secret;
        let points: Vec<_> = shares.iter().map(|s| ProjectivePoint::GENERATOR * s).collect();
        validate_public_key(&coefs, &points, &public).unwrap();
        assert_eq!(
            validate_public_key(&coefs, &points, &ProjectivePoint::GENERATOR),
            Err(Error::InconsistentPublicKey)
        );
    }

    #[test]
    fn test_singular_parameters_rejected() {
        let x = Scalar::from(5u64);
        let duplicate = vec![BkParameter::new(x, 0), BkParameter::new(x, 0)];
        assert!(matches!(
            compute_bk_coefficients(&duplicate, 2),
            Err(Error::InvalidConfig(_))
        ));

        // Both first derivatives: f(0) is not determined
        let ranks = vec![
            BkParameter::new(Scalar::from(1u64), 1),
            BkParameter::new(Scalar::from(2u64), 1),
        ];
        assert!(compute_bk_coefficients(&ranks, 2).is_err());
        assert!(compute_bk_coefficients(&shamir_parameters(3), 2).is_err());
    }
}
