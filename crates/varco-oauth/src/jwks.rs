//! JWKS fetching and ID-token validation

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use varco_core::{ClaimSet, IdpSettings, Result, VarcoError};

use crate::client::HttpClient;

const SERVICE: &str = "idp-jwks";
const JWKS_TTL_SECS: i64 = 3600;

/// JSON Web Key Set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// JSON Web Key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl JwkSet {
    pub fn find_key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    pub fn get_decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        let jwk = self
            .find_key(kid)
            .ok_or_else(|| VarcoError::upstream(SERVICE, format!("kid '{kid}' not in JWKS")))?;

        match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk
                    .n
                    .as_ref()
                    .ok_or_else(|| VarcoError::malformed(SERVICE, "RSA key missing 'n'"))?;
                let e = jwk
                    .e
                    .as_ref()
                    .ok_or_else(|| VarcoError::malformed(SERVICE, "RSA key missing 'e'"))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| VarcoError::malformed(SERVICE, format!("invalid RSA key: {e}")))
            }
            "EC" => {
                let x = jwk
                    .x
                    .as_ref()
                    .ok_or_else(|| VarcoError::malformed(SERVICE, "EC key missing 'x'"))?;
                let y = jwk
                    .y
                    .as_ref()
                    .ok_or_else(|| VarcoError::malformed(SERVICE, "EC key missing 'y'"))?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| VarcoError::malformed(SERVICE, format!("invalid EC key: {e}")))
            }
            other => Err(VarcoError::malformed(
                SERVICE,
                format!("unsupported key type: {other}"),
            )),
        }
    }
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: DateTime<Utc>,
}

/// TTL cache for the IdP key set
pub struct JwksCache {
    cached: RwLock<Option<CachedJwks>>,
    ttl_secs: i64,
}

impl JwksCache {
    pub fn new() -> Self {
        Self {
            cached: RwLock::new(None),
            ttl_secs: JWKS_TTL_SECS,
        }
    }

    pub async fn get_or_fetch(&self, jwks_uri: &str, http: &HttpClient) -> Result<JwkSet> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if (Utc::now() - entry.fetched_at).num_seconds() < self.ttl_secs {
                    return Ok(entry.keys.clone());
                }
            }
        }

        debug!(jwks_uri = %jwks_uri, "Fetching JWKS");
        let response = http
            .inner()
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| VarcoError::upstream(SERVICE, e.to_string()))?;

        if !response.status().is_success() {
            return Err(VarcoError::upstream(
                SERVICE,
                format!("JWKS endpoint returned HTTP {}", response.status()),
            ));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| VarcoError::malformed(SERVICE, e.to_string()))?;

        let mut cached = self.cached.write().await;
        *cached = Some(CachedJwks {
            keys: jwks.clone(),
            fetched_at: Utc::now(),
        });

        Ok(jwks)
    }
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates ID tokens issued alongside the access token.
///
/// Checks signature against the IdP JWKS, plus issuer, audience and
/// expiry. A failure aborts the login flow like any token-exchange error.
pub struct IdTokenValidator {
    settings: Arc<IdpSettings>,
    jwks: Arc<JwksCache>,
    http: HttpClient,
}

impl IdTokenValidator {
    pub fn new(settings: Arc<IdpSettings>, http: HttpClient) -> Self {
        Self {
            settings,
            jwks: Arc::new(JwksCache::new()),
            http,
        }
    }

    #[instrument(skip(self, id_token))]
    pub async fn validate(&self, id_token: &str) -> Result<ClaimSet> {
        let header = decode_header(id_token)
            .map_err(|e| VarcoError::malformed(SERVICE, format!("bad ID token header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| VarcoError::malformed(SERVICE, "ID token header missing 'kid'"))?;

        let jwks = self
            .jwks
            .get_or_fetch(&self.settings.jwks_endpoint(), &self.http)
            .await?;
        let decoding_key = jwks.get_decoding_key(&kid)?;

        // Symmetric algorithms never match a JWKS-published key
        if matches!(
            header.alg,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(VarcoError::malformed(SERVICE, "unexpected symmetric ID token alg"));
        }

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.settings.token_endpoint()]);
        validation.set_audience(&[&self.settings.client_id]);

        let data = decode::<HashMap<String, serde_json::Value>>(id_token, &decoding_key, &validation)
            .map_err(|e| VarcoError::upstream(SERVICE, format!("ID token rejected: {e}")))?;

        Ok(ClaimSet::from_map(data.claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_key_by_kid() {
        let jwks = JwkSet {
            keys: vec![
                Jwk {
                    kty: "RSA".to_string(),
                    kid: Some("a".to_string()),
                    alg: Some("RS256".to_string()),
                    n: Some("n".to_string()),
                    e: Some("AQAB".to_string()),
                    x: None,
                    y: None,
                },
                Jwk {
                    kty: "EC".to_string(),
                    kid: Some("b".to_string()),
                    alg: Some("ES256".to_string()),
                    n: None,
                    e: None,
                    x: Some("x".to_string()),
                    y: Some("y".to_string()),
                },
            ],
        };

        assert!(jwks.find_key("a").is_some());
        assert!(jwks.find_key("b").is_some());
        assert!(jwks.find_key("c").is_none());
    }

    #[test]
    fn test_unsupported_key_type_rejected() {
        let jwks = JwkSet {
            keys: vec![Jwk {
                kty: "oct".to_string(),
                kid: Some("sym".to_string()),
                alg: None,
                n: None,
                e: None,
                x: None,
                y: None,
            }],
        };

        assert!(jwks.get_decoding_key("sym").is_err());
    }
}
