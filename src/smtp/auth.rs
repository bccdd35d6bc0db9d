//! AUTH PLAIN credential checking

use crate::smtp::error::SmtpError;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// The single username/password pair the server accepts
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check a base64 PLAIN response of the form `authzid NUL authcid NUL passwd`.
    ///
    /// The authorization identity is ignored.
    pub fn verify_plain(&self, encoded: &str) -> Result<(), SmtpError> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| SmtpError::InvalidSyntax("invalid base64 in AUTH response".to_string()))?;

        let parts: Vec<&[u8]> = decoded.split(|&b| b == 0).collect();
        match parts.as_slice() {
            [_, username, password]
                if *username == self.username.as_bytes()
                    && *password == self.password.as_bytes() =>
            {
                Ok(())
            }
            _ => Err(SmtpError::AuthFailed),
        }
    }
}
