//! Service-account token lifecycle
//!
//! A token's secret is returned once, by `create`. Listing never includes
//! it, so a token can exist remotely while its secret is unknown locally.
//! There is no update: changing a token means deleting and creating it.

use crate::error::{Error, Result};
use crate::remote::{OrgContext, TokenRemote};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Secret token value. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Take ownership of the secret value.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Declaration of a token to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub service_account_id: i64,
    pub name: String,
    /// Lifetime in seconds. `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_to_live: Option<u64>,
}

impl TokenSpec {
    pub fn new(service_account_id: i64, name: impl Into<String>, seconds_to_live: Option<u64>) -> Self {
        Self {
            service_account_id,
            name: name.into(),
            // A zero lifetime means no expiry on the remote
            seconds_to_live: seconds_to_live.filter(|ttl| *ttl > 0),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidToken("name must not be empty".to_string()));
        }
        if self.service_account_id <= 0 {
            return Err(Error::InvalidToken(format!(
                "invalid service account id {}",
                self.service_account_id
            )));
        }
        Ok(())
    }
}

/// A freshly created token, including its secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedToken {
    pub id: i64,
    pub name: String,
    pub secret: Secret,
}

/// A token as listed by the remote. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: i64,
    pub name: String,
    /// Expiration reported by the remote, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    /// Expiry flag reported by the remote. Never computed locally.
    #[serde(default)]
    pub has_expired: bool,
}

/// Result of looking a token up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    Present(TokenRecord),
    /// No token with that id. Callers clear their local record.
    Absent,
}

/// Result of deleting a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    /// The token (or its service account) was already gone.
    AlreadyGone,
}

/// Drop zero-valued timestamps the remote uses for "no expiration".
pub fn normalize_expiration(expiration: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    expiration.filter(|t| t.year() > 1)
}

/// Create a token. The returned secret is not retrievable again.
pub fn create<R>(remote: &R, org: &OrgContext, spec: &TokenSpec) -> Result<CreatedToken>
where
    R: TokenRemote + ?Sized,
{
    spec.validate()?;
    remote.create_token(org, spec)
}

/// Find a token by id among the service account's tokens.
///
/// A missing token, or a missing service account, is `Absent` rather than an
/// error.
pub fn read<R>(
    remote: &R,
    org: &OrgContext,
    service_account_id: i64,
    token_id: i64,
) -> Result<TokenLookup>
where
    R: TokenRemote + ?Sized,
{
    let tokens = match remote.list_tokens(org, service_account_id) {
        Ok(tokens) => tokens,
        Err(e) if e.is_not_found() => return Ok(TokenLookup::Absent),
        Err(e) => return Err(e),
    };

    Ok(tokens
        .into_iter()
        .find(|t| t.id == token_id)
        .map_or(TokenLookup::Absent, TokenLookup::Present))
}

/// Delete a token, treating an already-missing token as success.
pub fn delete<R>(
    remote: &R,
    org: &OrgContext,
    service_account_id: i64,
    token_id: i64,
) -> Result<Deletion>
where
    R: TokenRemote + ?Sized,
{
    match remote.delete_token(org, service_account_id, token_id) {
        Ok(()) => Ok(Deletion::Deleted),
        Err(e) if e.is_not_found() => Ok(Deletion::AlreadyGone),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockRemote};
    use chrono::TimeZone;

    fn org() -> OrgContext {
        OrgContext::default_org()
    }

    #[test]
    fn test_secret_only_at_create() {
        let mock = MockRemote::new();
        mock.add_service_account(7);

        let created = create(&mock, &org(), &TokenSpec::new(7, "ci", None)).unwrap();
        assert!(!created.secret.expose().is_empty());

        match read(&mock, &org(), 7, created.id).unwrap() {
            TokenLookup::Present(record) => {
                assert_eq!(record.id, created.id);
                assert_eq!(record.name, "ci");
                assert!(!format!("{record:?}").contains(created.secret.expose()));
            }
            TokenLookup::Absent => panic!("Expected TokenLookup::Present"),
        }
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("glsa_abc");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert_eq!(secret.into_inner(), "glsa_abc");
    }

    #[test]
    fn test_read_missing_token_is_absent() {
        let mock = MockRemote::new();
        mock.add_service_account(7);
        create(&mock, &org(), &TokenSpec::new(7, "ci", None)).unwrap();

        assert_eq!(read(&mock, &org(), 7, 999).unwrap(), TokenLookup::Absent);
    }

    #[test]
    fn test_read_missing_service_account_is_absent() {
        let mock = MockRemote::new();
        assert_eq!(read(&mock, &org(), 7, 1).unwrap(), TokenLookup::Absent);
    }

    #[test]
    fn test_read_transient_error_propagates() {
        let mock = MockRemote::new();
        mock.add_service_account(7);
        mock.fail_on(Call::ListTokens, Error::http("HTTP 502", Some(502)));
        assert!(read(&mock, &org(), 7, 1).is_err());
    }

    #[test]
    fn test_delete_then_delete_again() {
        let mock = MockRemote::new();
        mock.add_service_account(7);
        let created = create(&mock, &org(), &TokenSpec::new(7, "ci", Some(60))).unwrap();

        assert_eq!(delete(&mock, &org(), 7, created.id).unwrap(), Deletion::Deleted);
        assert_eq!(
            delete(&mock, &org(), 7, created.id).unwrap(),
            Deletion::AlreadyGone
        );
        assert_eq!(read(&mock, &org(), 7, created.id).unwrap(), TokenLookup::Absent);
    }

    #[test]
    fn test_expiration_comes_from_remote() {
        let mock = MockRemote::new();
        mock.add_service_account(7);
        let created = create(&mock, &org(), &TokenSpec::new(7, "short", Some(60))).unwrap();
        mock.expire_token(7, created.id);

        match read(&mock, &org(), 7, created.id).unwrap() {
            TokenLookup::Present(record) => {
                assert!(record.has_expired);
                assert!(record.expiration.is_some());
            }
            TokenLookup::Absent => panic!("Expected TokenLookup::Present"),
        }
    }

    #[test]
    fn test_create_validates_before_remote_call() {
        let mock = MockRemote::new();
        mock.add_service_account(7);

        let err = create(&mock, &org(), &TokenSpec::new(7, "  ", None)).unwrap_err();
        assert!(err.is_validation());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let spec = TokenSpec::new(7, "ci", Some(0));
        assert_eq!(spec.seconds_to_live, None);
    }

    #[test]
    fn test_normalize_expiration() {
        let zero = Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(normalize_expiration(Some(zero)), None);

        let real = Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(normalize_expiration(Some(real)), Some(real));
        assert_eq!(normalize_expiration(None), None);
    }
}
