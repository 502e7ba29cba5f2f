//! Rate limit key construction
//!
//! Keys have the form `{algorithm}:{scope}:{identity_kind}:{identity_value}`.
//! Identity values are trimmed and email addresses are lower-cased, so
//! `"User@Example.com "` and `"user@example.com"` share one bucket. Scopes
//! may not contain `:`.

use crate::algorithms::Algorithm;
use crate::error::{RateLimitError, RateLimitResult};
use std::fmt;
use std::net::IpAddr;

/// Kind of caller identity a limit is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    /// Email address (case-insensitive)
    Email,
    /// Authenticated user id
    UserId,
    /// Client IP address
    Ip,
}

impl IdentityKind {
    /// Name used inside rate limit keys
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Email => "email",
            IdentityKind::UserId => "user_id",
            IdentityKind::Ip => "ip",
        }
    }

    /// Normalize a raw identity value for this kind
    pub fn normalize(&self, value: &str) -> String {
        let trimmed = value.trim();
        match self {
            IdentityKind::Email => trimmed.to_lowercase(),
            IdentityKind::UserId | IdentityKind::Ip => trimmed.to_string(),
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An already-resolved caller identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Email address, e.g. for sign-up or code resend
    Email(String),
    /// User id, e.g. taken from a validated token
    UserId(String),
    /// Client IP address
    Ip(String),
}

impl Identity {
    /// Create an email identity
    pub fn email(value: impl Into<String>) -> Self {
        Self::Email(value.into())
    }

    /// Create a user id identity
    pub fn user_id(value: impl Into<String>) -> Self {
        Self::UserId(value.into())
    }

    /// Create an IP identity
    pub fn ip(value: impl Into<String>) -> Self {
        Self::Ip(value.into())
    }

    /// Kind of this identity
    pub fn kind(&self) -> IdentityKind {
        match self {
            Identity::Email(_) => IdentityKind::Email,
            Identity::UserId(_) => IdentityKind::UserId,
            Identity::Ip(_) => IdentityKind::Ip,
        }
    }

    /// Raw value as supplied by the caller
    pub fn value(&self) -> &str {
        match self {
            Identity::Email(v) | Identity::UserId(v) | Identity::Ip(v) => v,
        }
    }

    /// Normalized value as used in keys
    pub fn normalized(&self) -> String {
        self.kind().normalize(self.value())
    }

    /// Whether the value is empty after normalization
    pub fn is_blank(&self) -> bool {
        self.value().trim().is_empty()
    }
}

impl From<IpAddr> for Identity {
    fn from(ip: IpAddr) -> Self {
        Self::Ip(ip.to_string())
    }
}

/// Separator between key segments
pub const KEY_SEPARATOR: char = ':';

/// Check that a scope is non-empty and free of [`KEY_SEPARATOR`]
///
/// Algorithm and kind are fixed tokens, so with a separator-free scope
/// everything after the third `:` is the identity and keys never collide.
pub fn validate_scope(scope: &str) -> RateLimitResult<()> {
    if scope.trim().is_empty() {
        return Err(RateLimitError::invalid("scope must not be empty"));
    }
    if scope.contains(KEY_SEPARATOR) {
        return Err(RateLimitError::invalid(format!(
            "scope '{}' must not contain '{}'",
            scope, KEY_SEPARATOR
        )));
    }
    Ok(())
}

/// Compose a rate limit key. Pure and deterministic.
///
/// `scope` is expected to have passed [`validate_scope`].
pub fn build_key(
    algorithm: Algorithm,
    scope: &str,
    kind: IdentityKind,
    identity_value: &str,
) -> String {
    format!(
        "{}:{}:{}:{}",
        algorithm.as_str(),
        scope,
        kind.as_str(),
        kind.normalize(identity_value)
    )
}

/// Key builder bound to identities
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyBuilder;

impl KeyBuilder {
    /// Build the key for an identity under a scope
    pub fn key_for(algorithm: Algorithm, scope: &str, identity: &Identity) -> String {
        build_key(algorithm, scope, identity.kind(), identity.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = build_key(
            Algorithm::Fixed,
            "SignUpService.InitiateSignUp",
            IdentityKind::Email,
            "user@example.com",
        );
        assert_eq!(key, "fixed:SignUpService.InitiateSignUp:email:user@example.com");
    }

    #[test]
    fn test_validate_scope() {
        assert!(validate_scope("SignUpService.InitiateSignUp").is_ok());
        for scope in ["", "  ", "S:ip:1.2.3.4"] {
            assert!(matches!(
                validate_scope(scope),
                Err(RateLimitError::InvalidParameters(_))
            ));
        }
    }

    #[test]
    fn test_email_normalization() {
        let kind = IdentityKind::Email;
        let a = build_key(Algorithm::Sliding, "ResendCode", kind, "Test@Example.com");
        let b = build_key(Algorithm::Sliding, "ResendCode", kind, "test@example.com ");
        assert_eq!(a, b);
    }

    #[test]
    fn test_user_id_is_case_sensitive() {
        let a = build_key(Algorithm::Fixed, "SignIn", IdentityKind::UserId, "AbC");
        let b = build_key(Algorithm::Fixed, "SignIn", IdentityKind::UserId, " abc ");
        assert_ne!(a, b);
        assert!(b.ends_with(":user_id:abc"));
    }

    #[test]
    fn test_kinds_and_algorithms_do_not_collide() {
        let email = KeyBuilder::key_for(Algorithm::Fixed, "s", &Identity::email("x"));
        let ip = KeyBuilder::key_for(Algorithm::Fixed, "s", &Identity::ip("x"));
        let sliding = KeyBuilder::key_for(Algorithm::Sliding, "s", &Identity::email("x"));
        assert_ne!(email, ip);
        assert_ne!(email, sliding);
    }

    #[test]
    fn test_identity_from_ip_addr() {
        let identity: Identity = "10.1.2.3".parse::<IpAddr>().unwrap().into();
        assert_eq!(identity.kind(), IdentityKind::Ip);
        assert_eq!(identity.value(), "10.1.2.3");
    }

    #[test]
    fn test_blank_identity() {
        assert!(Identity::email("   ").is_blank());
        assert!(!Identity::user_id("42").is_blank());
    }
}
