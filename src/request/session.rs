use anyhow::{anyhow, Result};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Signs and verifies session cookie values of the form `<session_key>.<signature>`.
#[derive(Clone)]
pub struct SessionSigner {
    key: Vec<u8>,
}

impl SessionSigner {
    /// Build a signer from a configured secret.
    /// If secret is None, generates a random key (WARNING: sessions won't survive restarts)
    pub fn new(secret: Option<&str>) -> Self {
        let key = match secret {
            Some(s) => s.as_bytes().to_vec(),
            None => {
                tracing::warn!("SESSION_SECRET not set, session cookies will not survive restarts");
                rand::random::<[u8; 32]>().to_vec()
            }
        };

        Self { key }
    }

    /// Generate a fresh 32-character session key
    pub fn generate_key() -> String {
        BASE64_URL_SAFE_NO_PAD.encode(rand::random::<[u8; 24]>())
    }

    fn mac(&self) -> Result<Hmac<Sha256>> {
        Hmac::<Sha256>::new_from_slice(&self.key).map_err(|e| anyhow!("Failed to create HMAC: {}", e))
    }

    /// Create a signed cookie value for a session key
    pub fn sign(&self, session_key: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(session_key.as_bytes());
        let signature = BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", session_key, signature))
    }

    /// Verify a signed cookie value and return the session key it carries
    pub fn verify(&self, cookie_value: &str) -> Result<String> {
        let (session_key, signature_b64) = cookie_value
            .split_once('.')
            .ok_or_else(|| anyhow!("Invalid session cookie format"))?;

        if session_key.is_empty() || signature_b64.contains('.') {
            return Err(anyhow!("Invalid session cookie format"));
        }

        let mut mac = self.mac()?;
        mac.update(session_key.as_bytes());
        let expected = mac.finalize().into_bytes();

        let provided = BASE64_URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| anyhow!("Invalid session cookie signature encoding"))?;

        if expected[..].ct_eq(&provided[..]).into() {
            Ok(session_key.to_string())
        } else {
            Err(anyhow!("Session cookie signature verification failed"))
        }
    }
}
