//! # CSRF Protection
//!
//! One-time form tokens stored on the session. A token is consumed by the
//! first successful match, so every rendered form needs a fresh one.

use crate::error::{Error, Result};
use crate::session::Session;
use rand::RngCore;

/// Form field carrying the token
pub const CSRF_FIELD: &str = "csrf_token";

/// Random bytes in a default token
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// `len` random bytes, hex encoded
#[must_use]
pub fn unique_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Token issuer and checker bound to one session key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Csrf {
    session_key: String,
}

impl Csrf {
    /// Store tokens under `session_key`
    pub fn new(session_key: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
        }
    }

    /// Session key tokens are stored under
    #[must_use]
    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Issue a token and store it on the session, replacing any previous one
    #[must_use]
    pub fn generate(&self, session: &Session) -> String {
        let token = unique_token(DEFAULT_TOKEN_BYTES);
        session.set(self.session_key.clone(), token.clone());
        token
    }

    /// Whether `token` is the stored one; a match consumes it
    #[must_use]
    pub fn matches(&self, session: &Session, token: &str) -> bool {
        let stored: Option<String> = session.get_as(&self.session_key);
        match stored {
            Some(stored) if !stored.is_empty() && stored == token => {
                session.unset(&self.session_key);
                true
            }
            _ => false,
        }
    }

    /// Check a submitted token
    ///
    /// # Errors
    ///
    /// Returns `Error::CsrfTokenMismatch` when the token is missing or stale.
    pub fn verify(&self, session: &Session, token: Option<&str>) -> Result<()> {
        match token {
            Some(token) if self.matches(session, token) => Ok(()),
            _ => Err(Error::CsrfTokenMismatch),
        }
    }

    /// Hidden form input holding a fresh token
    #[must_use]
    pub fn field(&self, session: &Session) -> String {
        format!(
            "<input type=\"hidden\" name=\"{CSRF_FIELD}\" value=\"{}\">",
            self.generate(session)
        )
    }
}
