//! Signed session tokens (HS256 `header.payload.signature`).
//!
//! Tokens are the only session state the server keeps: claims travel inside
//! the cookie and are re-validated on every request. The token subtype is an
//! explicit `kind` claim (`verification` or `password`); it is never inferred
//! from the shape or length of the subject value.
//!
//! Verification on failure collapses every cause (malformed, bad algorithm,
//! wrong issuer/audience, expired, bad signature) into one opaque
//! [`TokenInvalid`] so callers cannot branch on why a token was rejected.

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

type HmacSha256 = Hmac<Sha256>;

/// Minimum length for the signing secret.
pub const MIN_SECRET_LENGTH: usize = 64;
/// Minimum Shannon entropy (bits per character) for the signing secret.
pub const MIN_SECRET_ENTROPY_BITS: f64 = 4.0;

const DEFAULT_PASSWORD_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_VERIFICATION_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Session subtype carried as an explicit claim.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Session backed by a messaging-verified code; allows setting a password.
    Verification,
    /// Session backed by password authentication; random session identifier.
    Password,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub username: String,
    pub phone: String,
    pub role: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Opaque rejection: callers must not learn why verification failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("Invalid token")]
pub struct TokenInvalid;

/// Signing secret validated at construction; a weak secret is a startup
/// configuration error, never a per-request failure.
#[derive(Clone)]
pub struct SigningSecret(String);

impl SigningSecret {
    /// # Errors
    /// Returns an error when the secret is shorter than [`MIN_SECRET_LENGTH`]
    /// or its Shannon entropy falls below [`MIN_SECRET_ENTROPY_BITS`].
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.len() < MIN_SECRET_LENGTH {
            return Err(anyhow!(
                "token secret must be at least {MIN_SECRET_LENGTH} characters"
            ));
        }
        let entropy = shannon_entropy(&value);
        if entropy < MIN_SECRET_ENTROPY_BITS {
            return Err(anyhow!(
                "token secret entropy too low: {entropy:.2} bits/char (minimum {MIN_SECRET_ENTROPY_BITS})"
            ));
        }
        Ok(Self(value))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SigningSecret").field(&"***").finish()
    }
}

/// Shannon entropy in bits per character.
fn shannon_entropy(value: &str) -> f64 {
    let length = value.chars().count();
    if length == 0 {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    for c in value.chars() {
        *counts.entry(c).or_insert(0_usize) += 1;
    }
    #[allow(clippy::cast_precision_loss)]
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / length as f64;
            -p * p.log2()
        })
        .sum()
}

/// Mints and verifies signed session tokens over a configured secret.
#[derive(Clone, Debug)]
pub struct TokenSigner {
    secret: SigningSecret,
    issuer: String,
    audience: String,
    password_ttl_seconds: i64,
    verification_ttl_seconds: i64,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: SigningSecret, issuer: String, audience: String) -> Self {
        Self {
            secret,
            issuer,
            audience,
            password_ttl_seconds: DEFAULT_PASSWORD_TTL_SECONDS,
            verification_ttl_seconds: DEFAULT_VERIFICATION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_password_ttl_seconds(mut self, seconds: i64) -> Self {
        self.password_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_ttl_seconds = seconds;
        self
    }

    /// Token lifetime in seconds for the given kind (drives cookie Max-Age).
    #[must_use]
    pub fn ttl_seconds(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Password => self.password_ttl_seconds,
            TokenKind::Verification => self.verification_ttl_seconds,
        }
    }

    /// Mint a signed token. Pure over the configured secret; no side effects.
    ///
    /// # Errors
    /// Returns an error if claim serialization or MAC setup fails.
    pub fn mint(
        &self,
        user_id: &str,
        username: &str,
        phone: &str,
        role: &str,
        kind: TokenKind,
    ) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: user_id.to_string(),
            username: username.to_string(),
            phone: phone.to_string(),
            role: role.to_string(),
            kind,
            iat: now,
            exp: now + self.ttl_seconds(kind),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{header_b64}.{payload_b64}");

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| anyhow!("failed to initialize token MAC"))?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Validate a token and return its claims.
    ///
    /// # Errors
    /// Returns [`TokenInvalid`] for every rejection cause.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenInvalid> {
        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenInvalid);
        };

        // Recompute the MAC over the first two segments before trusting
        // anything inside the payload.
        let signing_input = format!("{header_b64}.{payload_b64}");
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| TokenInvalid)?;
        mac.update(signing_input.as_bytes());
        let expected = mac.finalize().into_bytes();

        let provided = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenInvalid)?;
        if !bool::from(expected.ct_eq(&provided)) {
            return Err(TokenInvalid);
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenInvalid)?;
        let header: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| TokenInvalid)?;
        if header.alg != "HS256" {
            return Err(TokenInvalid);
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenInvalid)?;
        let claims: Claims =
            serde_json::from_slice(&payload_bytes).map_err(|_| TokenInvalid)?;

        if claims.iss != self.issuer || claims.aud != self.audience {
            return Err(TokenInvalid);
        }
        if Utc::now().timestamp() >= claims.exp {
            return Err(TokenInvalid);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        MIN_SECRET_ENTROPY_BITS, SigningSecret, TokenInvalid, TokenKind, TokenSigner,
        shannon_entropy,
    };
    use anyhow::{Result, anyhow};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn test_secret() -> SigningSecret {
        SigningSecret::new(
            "fA8#kP2$mQ9@xL4!nW7%vB3^zR6&cT1*dY5(hU0)jE8-gS2=pM4_qN7+wK9~oI3]",
        )
        .expect("test secret should pass policy")
    }

    fn signer() -> TokenSigner {
        TokenSigner::new(
            test_secret(),
            "konfirmi".to_string(),
            "konfirmi-web".to_string(),
        )
    }

    #[test]
    fn mint_verify_round_trip() -> Result<()> {
        let signer = signer();
        let token = signer.mint("X7K2M9", "Alice", "15551234567", "user", TokenKind::Verification)?;
        let claims = signer.verify(&token).expect("token should verify");
        assert_eq!(claims.user_id, "X7K2M9");
        assert_eq!(claims.username, "Alice");
        assert_eq!(claims.phone, "15551234567");
        assert_eq!(claims.kind, TokenKind::Verification);
        assert_eq!(claims.iss, "konfirmi");
        assert_eq!(claims.aud, "konfirmi-web");
        assert!(claims.exp > claims.iat);
        Ok(())
    }

    #[test]
    fn payload_carries_camel_case_user_id() -> Result<()> {
        let signer = signer();
        let token = signer.mint("X7K2M9", "Alice", "15551234567", "user", TokenKind::Verification)?;
        let payload_b64 = token
            .split('.')
            .nth(1)
            .ok_or_else(|| anyhow!("token has no payload segment"))?;
        let payload: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload_b64)?)?;
        assert_eq!(payload["userId"], "X7K2M9");
        assert_eq!(payload["kind"], "verification");
        Ok(())
    }

    #[test]
    fn expired_token_is_invalid() -> Result<()> {
        let signer = signer().with_password_ttl_seconds(-1);
        let token = signer.mint("sid", "Alice", "15551234567", "user", TokenKind::Password)?;
        assert_eq!(signer.verify(&token), Err(TokenInvalid));
        Ok(())
    }

    #[test]
    fn tampered_segments_are_invalid() -> Result<()> {
        let signer = signer();
        let token = signer.mint("X7K2M9", "Alice", "15551234567", "user", TokenKind::Password)?;

        for index in 0..3 {
            let mut segments: Vec<String> =
                token.split('.').map(str::to_string).collect();
            // Flip one character inside the segment.
            let mut bytes = segments[index].clone().into_bytes();
            bytes[1] = if bytes[1] == b'A' { b'B' } else { b'A' };
            segments[index] = String::from_utf8(bytes)?;
            let tampered = segments.join(".");
            assert_eq!(signer.verify(&tampered), Err(TokenInvalid), "segment {index}");
        }
        Ok(())
    }

    #[test]
    fn wrong_segment_count_is_invalid() {
        let signer = signer();
        assert_eq!(signer.verify("onlyone"), Err(TokenInvalid));
        assert_eq!(signer.verify("two.parts"), Err(TokenInvalid));
        assert_eq!(signer.verify("a.b.c.d"), Err(TokenInvalid));
    }

    #[test]
    fn issuer_audience_mismatch_is_invalid() -> Result<()> {
        let signer = signer();
        let token = signer.mint("sid", "Alice", "15551234567", "user", TokenKind::Password)?;
        let other = TokenSigner::new(
            test_secret(),
            "someone-else".to_string(),
            "konfirmi-web".to_string(),
        );
        assert_eq!(other.verify(&token), Err(TokenInvalid));
        Ok(())
    }

    #[test]
    fn secret_policy_rejects_short_and_low_entropy() {
        assert!(SigningSecret::new("short").is_err());
        // Long enough but a single repeated character has zero entropy.
        assert!(SigningSecret::new("a".repeat(80)).is_err());
        assert!(test_secret().0.len() >= 64);
    }

    #[test]
    fn shannon_entropy_bounds() {
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy("aaaa"), 0.0);
        assert!(shannon_entropy("abcdefghijklmnop") >= MIN_SECRET_ENTROPY_BITS);
    }

    #[test]
    fn kind_claim_distinguishes_subtypes() -> Result<()> {
        let signer = signer();
        // Same-length subjects, different kinds: discrimination is the claim.
        let verification =
            signer.mint("ABC123", "Alice", "15551234567", "user", TokenKind::Verification)?;
        let password = signer.mint("ABC123", "Alice", "15551234567", "user", TokenKind::Password)?;
        assert_eq!(
            signer.verify(&verification).map(|c| c.kind),
            Ok(TokenKind::Verification)
        );
        assert_eq!(
            signer.verify(&password).map(|c| c.kind),
            Ok(TokenKind::Password)
        );
        Ok(())
    }
}
