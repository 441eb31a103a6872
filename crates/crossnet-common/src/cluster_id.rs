//! Cluster identity
//!
//! A cluster ID is used both as a map key and as a label value on mesh
//! resources, so it must be a valid DNS-1123 subdomain: lowercase
//! alphanumerics, `.` and `-`, starting and ending with an alphanumeric.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Maximum length of a DNS-1123 subdomain
const MAX_LEN: usize = 253;

/// Validated identifier of a cluster participating in the mesh
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterId(String);

impl ClusterId {
    /// Validate and wrap a cluster ID
    pub fn new(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        validate(&value).map_err(|reason| Error::invalid_cluster_id(&value, reason))?;
        Ok(Self(value))
    }

    /// Borrow the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(s: &str) -> Result<(), &'static str> {
    if s.is_empty() {
        return Err("cluster ID cannot be empty");
    }
    if s.len() > MAX_LEN {
        return Err("cluster ID must be at most 253 characters");
    }

    let is_alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();

    if !s.chars().all(|c| is_alnum(c) || c == '.' || c == '-') {
        return Err("only lowercase alphanumerics, '.' or '-' are allowed");
    }

    // Guarded by the emptiness check above
    let first = s.chars().next().unwrap_or('-');
    let last = s.chars().last().unwrap_or('-');
    if !is_alnum(first) || !is_alnum(last) {
        return Err("the first and last characters must be alphanumeric");
    }

    Ok(())
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClusterId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ClusterId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClusterId> for String {
    fn from(id: ClusterId) -> Self {
        id.0
    }
}

impl AsRef<str> for ClusterId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ClusterId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ClusterId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dns_1123_names() {
        for id in ["a", "east", "cluster-1", "us.east.prod", "0", "a1-b2.c3"] {
            assert!(ClusterId::new(id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn rejects_separators_at_the_edges() {
        for id in ["-east", "east-", ".east", "east.", "-", "."] {
            let err = ClusterId::new(id).unwrap_err();
            assert!(
                err.to_string().contains("first and last"),
                "{id}: unexpected error {err}"
            );
        }
    }

    #[test]
    fn rejects_invalid_characters() {
        for id in ["East", "us_east", "us east", "clüster", "a/b"] {
            let err = ClusterId::new(id).unwrap_err();
            assert!(matches!(err, Error::InvalidClusterId { ref value, .. } if value == id));
        }
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(ClusterId::new("").is_err());
        assert!(ClusterId::new("a".repeat(MAX_LEN)).is_ok());
        assert!(ClusterId::new("a".repeat(MAX_LEN + 1)).is_err());
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let id: ClusterId = serde_json::from_str("\"west\"").unwrap();
        assert_eq!(id, "west");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"west\"");

        let bad: Result<ClusterId, _> = serde_json::from_str("\"West\"");
        assert!(bad.is_err());
    }
}
