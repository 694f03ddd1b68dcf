//! HMAC signing key ring.
//!
//! Tokens are signed with the active key and carry its id in the `kid`
//! header. Retired keys stay verifiable until they are removed from the ring,
//! which is how the shared secret is rotated without a flag day.

use std::collections::HashMap;

use jsonwebtoken::{DecodingKey, EncodingKey};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("signing key id must not be empty")]
    EmptyKeyId,

    #[error("secret for key '{0}' must not be empty")]
    EmptySecret(String),

    #[error("duplicate signing key id '{0}'")]
    DuplicateKeyId(String),
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Shared-secret key ring used by both the issuing and the verifying side.
#[derive(Clone)]
pub struct SigningKeys {
    active_kid: String,
    keys: HashMap<String, KeyPair>,
}

impl SigningKeys {
    /// Create a ring whose only (and active) key is `secret` under `kid`.
    pub fn new(kid: impl Into<String>, secret: impl AsRef<[u8]>) -> Result<Self, KeyError> {
        let kid = kid.into();
        let pair = key_pair(&kid, secret.as_ref())?;

        let mut keys = HashMap::new();
        keys.insert(kid.clone(), pair);

        Ok(Self {
            active_kid: kid,
            keys,
        })
    }

    /// Add a key that is still accepted for verification but never used to sign.
    pub fn with_retired(mut self, kid: impl Into<String>, secret: impl AsRef<[u8]>) -> Result<Self, KeyError> {
        let kid = kid.into();
        if self.keys.contains_key(&kid) {
            return Err(KeyError::DuplicateKeyId(kid));
        }
        let pair = key_pair(&kid, secret.as_ref())?;
        self.keys.insert(kid, pair);
        Ok(self)
    }

    pub fn active_kid(&self) -> &str {
        &self.active_kid
    }

    pub(crate) fn encoding_key(&self) -> Option<&EncodingKey> {
        self.keys.get(&self.active_kid).map(|pair| &pair.encoding)
    }

    /// Resolve the verification key for a token header.
    ///
    /// A token without `kid` is only accepted when the ring holds exactly one key.
    pub(crate) fn decoding_key(&self, kid: Option<&str>) -> Option<&DecodingKey> {
        match kid {
            Some(kid) => self.keys.get(kid).map(|pair| &pair.decoding),
            None if self.keys.len() == 1 => self.keys.values().next().map(|pair| &pair.decoding),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl core::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        f.debug_struct("SigningKeys")
            .field("active_kid", &self.active_kid)
            .field("kids", &kids)
            .finish()
    }
}

fn key_pair(kid: &str, secret: &[u8]) -> Result<KeyPair, KeyError> {
    if kid.trim().is_empty() {
        return Err(KeyError::EmptyKeyId);
    }
    if secret.is_empty() {
        return Err(KeyError::EmptySecret(kid.to_string()));
    }
    Ok(KeyPair {
        encoding: EncodingKey::from_secret(secret),
        decoding: DecodingKey::from_secret(secret),
    })
}
