//! Bearer token issuance and verification.
//!
//! Tokens are compact JWS strings (HS256) over [`TokenClaims`], with the
//! signing key id in the `kid` header. Verification needs only the shared key
//! ring, so the edge never calls back into the identity service.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use thiserror::Error;

use flowforge_core::{Clock, OrgId, SystemClock, UserId};

use crate::claims::{TokenClaims, TokenValidationError, validate_claims};
use crate::{Role, SigningKeys};

/// Default token lifetime.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// An encoded bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Debug for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Token(..)")
    }
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issuance failure. Only possible through a misconfigured key ring.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no active signing key")]
    NoActiveKey,

    #[error("failed to encode token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// Opaque verification failure.
///
/// This is the only thing that crosses the trust boundary; the cause stays in
/// [`InvalidReason`] and in debug logs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid token")]
pub struct InvalidToken;

/// Why a token failed verification (diagnostics only).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("malformed token")]
    Malformed,

    #[error("unknown signing key")]
    UnknownKey,

    #[error("signature mismatch")]
    BadSignature,

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Issues and verifies signed `(subject, org, role)` tokens.
#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<SigningKeys>,
    lifetime: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(keys: SigningKeys) -> Self {
        Self {
            keys: Arc::new(keys),
            lifetime: Some(Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS)),
            clock: Arc::new(SystemClock),
        }
    }

    /// `None` issues tokens without `exp`.
    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    pub fn issue(&self, subject: UserId, org: OrgId, role: Role) -> Result<Token, TokenError> {
        self.issue_at(subject, org, role, self.clock.now())
    }

    pub fn issue_at(
        &self,
        subject: UserId,
        org: OrgId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Token, TokenError> {
        let key = self.keys.encoding_key().ok_or(TokenError::NoActiveKey)?;

        let claims = TokenClaims {
            sub: subject,
            org_id: org,
            role,
            iat: now.timestamp(),
            exp: self.lifetime.map(|lifetime| (now + lifetime).timestamp()),
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.keys.active_kid().to_string());

        Ok(Token(jsonwebtoken::encode(&header, &claims, key)?))
    }

    /// Verify against the codec's clock.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, InvalidToken> {
        self.verify_at(token, self.clock.now())
    }

    /// Verify against an explicit instant. Pure: same input, same answer.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, InvalidToken> {
        self.inspect(token, now).map_err(|reason| {
            tracing::debug!(%reason, "token verification failed");
            InvalidToken
        })
    }

    /// Verify and return the detailed failure reason.
    pub fn inspect(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, InvalidReason> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| InvalidReason::Malformed)?;
        if header.alg != Algorithm::HS256 {
            return Err(InvalidReason::Malformed);
        }

        let key = self
            .keys
            .decoding_key(header.kid.as_deref())
            .ok_or(InvalidReason::UnknownKey)?;

        // The time window is checked by `validate_claims` against the injected
        // instant, not by jsonwebtoken against the system clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let data = jsonwebtoken::decode::<TokenClaims>(token, key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => InvalidReason::BadSignature,
                _ => InvalidReason::Malformed,
            }
        })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("keys", &self.keys)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(SigningKeys::new("k1", "test-secret").unwrap())
    }

    fn flip_signature_byte(token: &str) -> String {
        let (signing_input, signature) = token.rsplit_once('.').unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
        bytes[0] ^= 0x01;
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(bytes))
    }

    #[test]
    fn issued_token_verifies_for_every_role() {
        let codec = codec();
        for role in Role::ALL {
            let user = UserId::new();
            let org = OrgId::new();
            let token = codec.issue(user, org, role).unwrap();

            let claims = codec.verify(token.as_str()).unwrap();
            assert_eq!(claims.sub, user);
            assert_eq!(claims.org_id, org);
            assert_eq!(claims.role, role);
        }
    }

    #[test]
    fn flipped_signature_byte_fails() {
        let codec = codec();
        let token = codec.issue(UserId::new(), OrgId::new(), Role::Owner).unwrap();
        let tampered = flip_signature_byte(token.as_str());

        assert_eq!(codec.verify(&tampered), Err(InvalidToken));
        assert_eq!(
            codec.inspect(&tampered, Utc::now()),
            Err(InvalidReason::BadSignature)
        );
    }

    #[test]
    fn token_signed_with_other_secret_fails() {
        let other = TokenCodec::new(SigningKeys::new("k1", "another-secret").unwrap());
        let token = other.issue(UserId::new(), OrgId::new(), Role::Admin).unwrap();
        assert_eq!(codec().verify(token.as_str()), Err(InvalidToken));
    }

    #[test]
    fn malformed_input_fails_without_panicking() {
        let codec = codec();
        for garbage in ["", "abc", "a.b.c", "Bearer x", "....", "eyJ.eyJ.sig"] {
            assert_eq!(codec.verify(garbage), Err(InvalidToken), "input: {garbage:?}");
        }
    }

    #[test]
    fn expired_token_fails() {
        let codec = codec().with_lifetime(Some(Duration::minutes(5)));
        let issued_at = Utc::now() - Duration::hours(1);
        let token = codec
            .issue_at(UserId::new(), OrgId::new(), Role::Member, issued_at)
            .unwrap();

        assert_eq!(
            codec.inspect(token.as_str(), Utc::now()),
            Err(InvalidReason::Claims(TokenValidationError::Expired))
        );
        assert!(codec.verify_at(token.as_str(), issued_at + Duration::minutes(4)).is_ok());
    }

    #[test]
    fn tokens_without_lifetime_have_no_exp() {
        let codec = codec().with_lifetime(None);
        let token = codec.issue(UserId::new(), OrgId::new(), Role::Member).unwrap();
        let claims = codec
            .verify_at(token.as_str(), Utc::now() + Duration::days(400))
            .unwrap();
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn rotated_key_still_verifies_until_removed() {
        let old = TokenCodec::new(SigningKeys::new("k1", "old-secret").unwrap());
        let token = old.issue(UserId::new(), OrgId::new(), Role::Owner).unwrap();

        let rotated = TokenCodec::new(
            SigningKeys::new("k2", "new-secret")
                .unwrap()
                .with_retired("k1", "old-secret")
                .unwrap(),
        );
        assert!(rotated.verify(token.as_str()).is_ok());

        let fresh = rotated.issue(UserId::new(), OrgId::new(), Role::Owner).unwrap();
        let header = jsonwebtoken::decode_header(fresh.as_str()).unwrap();
        assert_eq!(header.kid.as_deref(), Some("k2"));

        let dropped = TokenCodec::new(SigningKeys::new("k2", "new-secret").unwrap());
        assert_eq!(
            dropped.inspect(token.as_str(), Utc::now()),
            Err(InvalidReason::UnknownKey)
        );
    }

    #[test]
    fn verification_is_deterministic() {
        let codec = codec();
        let token = codec.issue(UserId::new(), OrgId::new(), Role::Admin).unwrap();
        let now = Utc::now();
        assert_eq!(
            codec.verify_at(token.as_str(), now),
            codec.verify_at(token.as_str(), now)
        );
    }

    #[test]
    fn debug_hides_token_material() {
        let token = codec().issue(UserId::new(), OrgId::new(), Role::Admin).unwrap();
        assert_eq!(format!("{token:?}"), "Token(..)");
    }
}
