//! Authentication
//!
//! A transport asks its authenticator for a token once per connection,
//! before the send and receive loops start. The token is presented in a
//! single SASL_AUTH round trip; any status other than NoError fails the
//! connection attempt.

use bytes::Bytes;

use crate::error::Result;

/// SASL mechanism plus its initial response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationToken {
    pub mechanism: String,
    pub payload: Bytes,
}

/// Source of authentication tokens
pub trait Authenticator: Send + Sync {
    fn create_token(&self) -> Result<AuthenticationToken>;
}

/// SASL PLAIN credentials
#[derive(Debug, Clone)]
pub struct SaslPlainAuthenticator {
    /// Authorization identity, usually empty
    pub zone: String,
    pub user: String,
    pub password: String,
}

impl SaslPlainAuthenticator {
    pub fn new(zone: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            user: user.into(),
            password: password.into(),
        }
    }
}

impl Authenticator for SaslPlainAuthenticator {
    fn create_token(&self) -> Result<AuthenticationToken> {
        // PLAIN: authzid NUL authcid NUL passwd
        let mut payload =
            Vec::with_capacity(self.zone.len() + self.user.len() + self.password.len() + 2);
        payload.extend_from_slice(self.zone.as_bytes());
        payload.push(0);
        payload.extend_from_slice(self.user.as_bytes());
        payload.push(0);
        payload.extend_from_slice(self.password.as_bytes());

        Ok(AuthenticationToken {
            mechanism: "PLAIN".to_string(),
            payload: Bytes::from(payload),
        })
    }
}
