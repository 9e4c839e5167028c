//! Group configuration for LISS key generation

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on `C(users, threshold - 1)`, the shares one group deals
pub const MAX_SHARES_PER_GROUP: usize = 1024;

/// One user group sharing the key with a `threshold`-of-`users` policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub users: usize,
    pub threshold: usize,
}

impl GroupConfig {
    pub fn new(users: usize, threshold: usize) -> Self {
        Self { users, threshold }
    }

    /// Number of unqualified sets, i.e. distinct shares of this group
    pub fn share_count(&self) -> Option<usize> {
        binomial(self.users, self.threshold.checked_sub(1)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 || self.threshold > self.users {
            return Err(Error::InvalidConfig(format!(
                "threshold {} out of range for {} users",
                self.threshold, self.users
            )));
        }
        match self.share_count() {
            Some(count) if count <= MAX_SHARES_PER_GROUP => Ok(()),
            _ => Err(Error::InvalidConfig(format!(
                "{}-of-{} group needs more than {} shares",
                self.threshold, self.users, MAX_SHARES_PER_GROUP
            ))),
        }
    }
}

/// Every group of one key generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupConfigs(pub Vec<GroupConfig>);

impl GroupConfigs {
    pub fn new(groups: Vec<GroupConfig>) -> Self {
        Self(groups)
    }

    /// Parse a JSON array such as `[{"users": 3, "threshold": 2}]`
    pub fn from_json(json: &str) -> Result<Self> {
        let configs: Self = serde_json::from_str(json)?;
        configs.validate()?;
        Ok(configs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::InvalidConfig("no user groups configured".into()));
        }
        self.0.iter().try_for_each(GroupConfig::validate)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupConfig> {
        self.0.iter()
    }
}

fn binomial(n: usize, k: usize) -> Option<usize> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    (0..k).try_fold(1usize, |acc, i| {
        acc.checked_mul(n - i).map(|v| v / (i + 1))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        GroupConfigs::new(vec![GroupConfig::new(3, 2)]).validate().unwrap();
        assert!(GroupConfigs::new(vec![]).validate().is_err());
        assert!(GroupConfig::new(3, 0).validate().is_err());
        assert!(GroupConfig::new(3, 4).validate().is_err());
        assert!(GroupConfig::new(40, 20).validate().is_err());
    }

    #[test]
    fn test_share_count() {
        assert_eq!(GroupConfig::new(3, 2).share_count(), Some(3));
        assert_eq!(GroupConfig::new(5, 3).share_count(), Some(10));
        assert_eq!(GroupConfig::new(4, 1).share_count(), Some(1));
        assert_eq!(GroupConfig::new(4, 0).share_count(), None);
    }

    #[test]
    fn test_from_json() {
        let configs =
            GroupConfigs::from_json(r#"[{"users": 3, "threshold": 2}, {"users": 5, "threshold": 3}]"#)
                .unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs.0[1], GroupConfig::new(5, 3));
        assert!(GroupConfigs::from_json(r#"[{"users": 2, "threshold": 3}]"#).is_err());
    }
}
