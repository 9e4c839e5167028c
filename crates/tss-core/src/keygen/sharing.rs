//! Replicated (CNF) linear secret sharing
//!
//! For a `t`-of-`n` group every unqualified set `T` (size `t - 1`) gets an
//! additive share `r_T` with `Σ_T r_T = x`. User `u` holds every `r_T` with
//! `u ∉ T`, so any `t` users jointly know all of them and any `t - 1` users
//! miss the share of their own set.

use super::config::{GroupConfig, GroupConfigs};
use crate::group::{GroupElement, ModularGroup};
use num_bigint::BigUint;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "multi-thread")]
use rayon::prelude::*;

/// Unqualified sets of a group, lexicographically ordered
pub(crate) fn unqualified_sets(config: &GroupConfig) -> Vec<Vec<usize>> {
    let k = config.threshold.saturating_sub(1);
    let mut sets = Vec::new();
    let mut current = Vec::with_capacity(k);
    collect_subsets(config.users, k, 0, &mut current, &mut sets);
    sets
}

fn collect_subsets(
    n: usize,
    k: usize,
    start: usize,
    current: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if current.len() == k {
        out.push(current.clone());
        return;
    }
    for i in start..n {
        current.push(i);
        collect_subsets(n, k, i + 1, current, out);
        current.pop();
    }
}

/// Map key of an unqualified set, e.g. `"0,2"`
pub(crate) fn set_key(set: &[usize]) -> String {
    set.iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Keys of the sets whose shares `user` holds
pub(crate) fn user_keys(config: &GroupConfig, user: usize) -> Vec<String> {
    unqualified_sets(config)
        .into_iter()
        .filter(|set| !set.contains(&user))
        .map(|set| set_key(&set))
        .collect()
}

/// Random additive split of `secret` into `count` parts mod `q`
fn split<R: RngCore + CryptoRng>(
    rng: &mut R,
    group: &ModularGroup,
    secret: &BigUint,
    count: usize,
) -> Vec<BigUint> {
    let q = group.order();
    let mut parts: Vec<BigUint> = (1..count).map(|_| group.random_exponent(rng)).collect();
    let sum = parts.iter().fold(BigUint::default(), |acc, p| (acc + p) % q);
    parts.push((secret + q - sum) % q);
    parts
}

/// `g^s` for every share
fn exponentiate(group: &ModularGroup, shares: &[BigUint]) -> Vec<GroupElement> {
    #[cfg(feature = "multi-thread")]
    {
        shares.par_iter().map(|s| group.exp_g(s)).collect()
    }
    #[cfg(not(feature = "multi-thread"))]
    {
        shares.iter().map(|s| group.exp_g(s)).collect()
    }
}

/// One peer's secret and its split for every group
pub(crate) struct Contribution {
    pub secret: BigUint,
    /// Per group: set key -> share
    pub shares: Vec<BTreeMap<String, BigUint>>,
}

/// What a peer reveals about its contribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PublicContribution {
    /// `g^x`
    pub public_key: GroupElement,
    /// Per group: set key -> `g^r_T`
    pub bqs: Vec<BTreeMap<String, GroupElement>>,
}

impl Contribution {
    pub fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        group: &ModularGroup,
        configs: &GroupConfigs,
    ) -> Self {
        let secret = group.random_exponent(rng);
        let shares = configs
            .iter()
            .map(|config| {
                let sets = unqualified_sets(config);
                let parts = split(rng, group, &secret, sets.len());
                sets.iter().map(|set| set_key(set)).zip(parts).collect()
            })
            .collect();
        Self { secret, shares }
    }

    pub fn public(&self, group: &ModularGroup) -> PublicContribution {
        let bqs = self
            .shares
            .iter()
            .map(|shares| {
                let values: Vec<BigUint> = shares.values().cloned().collect();
                shares
                    .keys()
                    .cloned()
                    .zip(exponentiate(group, &values))
                    .collect()
            })
            .collect();
        PublicContribution {
            public_key: group.exp_g(&self.secret),
            bqs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_unqualified_sets() {
        let sets = unqualified_sets(&GroupConfig::new(4, 3));
        assert_eq!(sets.len(), 6);
        assert_eq!(sets[0], vec![0, 1]);
        assert_eq!(set_key(&sets[5]), "2,3");

        assert_eq!(unqualified_sets(&GroupConfig::new(3, 1)), vec![Vec::<usize>::new()]);
        assert_eq!(user_keys(&GroupConfig::new(3, 2), 1), vec!["0", "2"]);
    }

    #[test]
    fn test_any_threshold_users_cover_every_share() {
        let config = GroupConfig::new(5, 3);
        let all = unqualified_sets(&config).len();
        for pair in [[0, 1, 2], [1, 3, 4], [0, 2, 4]] {
            let mut held: Vec<String> = pair.iter().flat_map(|u| user_keys(&config, *u)).collect();
            held.sort();
            held.dedup();
            assert_eq!(held.len(), all);
        }
        let mut two: Vec<String> = [0, 1].iter().flat_map(|u| user_keys(&config, *u)).collect();
        two.sort();
        two.dedup();
        assert_eq!(two.len(), all - 1);
    }

    #[test]
    fn test_contribution_is_consistent() {
        let group = ModularGroup::rfc3526().unwrap();
        let configs = GroupConfigs::new(vec![GroupConfig::new(3, 2)]);
        let contribution = Contribution::new(&mut OsRng, &group, &configs);

        let sum = contribution.shares[0]
            .values()
            .fold(BigUint::default(), |acc, s| (acc + s) % group.order());
        assert_eq!(sum, contribution.secret);

        let public = contribution.public(&group);
        assert_eq!(group.product(public.bqs[0].values()), public.public_key);
    }
}
