//! Client identity token

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable token identifying one physical client
///
/// Identities are opaque to the rest of the crate. Any non-empty string of
/// ASCII alphanumerics and `-_.:` up to [`Identity::MAX_LEN`] characters is
/// accepted; identities generated locally are always
/// [`Identity::GENERATED_LEN`] lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub const MAX_LEN: usize = 128;
    pub const GENERATED_LEN: usize = 32;

    /// Validate and wrap an identity string
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::InvalidIdentity("identity is empty".to_string()));
        }
        if value.len() > Self::MAX_LEN {
            return Err(Error::InvalidIdentity(format!(
                "identity is {} characters, limit is {}",
                value.len(),
                Self::MAX_LEN
            )));
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
        {
            return Err(Error::InvalidIdentity(format!(
                "identity contains unsupported character {:?}",
                bad
            )));
        }
        Ok(Self(value))
    }

    /// Derive a deterministic identity from stable machine characteristics
    pub fn from_fingerprint(components: &[String]) -> Self {
        let mut hasher = Sha256::new();
        for component in components {
            hasher.update(component.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hex::encode(hasher.finalize());
        Self(digest[..Self::GENERATED_LEN].to_string())
    }

    /// Random identity for processes that cannot derive a stable one
    pub fn ephemeral() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Whether this has the shape of a locally generated identity
    pub fn is_generated_form(&self) -> bool {
        self.0.len() == Self::GENERATED_LEN
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}
