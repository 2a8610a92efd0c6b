use anyhow::{bail, Context, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// Claims read from a visitor's bearer token
#[derive(Debug, Deserialize)]
pub struct VisitorClaims {
    pub sub: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Validates HS256 bearer tokens signed with a shared secret.
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<VisitorClaims> {
        let header = decode_header(token).context("failed to parse token header")?;
        if header.alg != Algorithm::HS256 {
            bail!("unsupported token algorithm {:?}", header.alg);
        }

        let data = decode::<VisitorClaims>(token, &self.key, &self.validation)
            .context("token failed signature or structural validation")?;

        if data.claims.sub.is_empty() {
            bail!("token has an empty 'sub' claim");
        }

        Ok(data.claims)
    }
}
