//! JWT issuance for client logins and outbound API calls.
//!
//! Client tokens are long-lived (30 days) and carry an ACL over the
//! signaling-plane resource paths. Service tokens are short-lived bearer
//! credentials minted fresh for every directory or session call.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

/// Client token lifetime: 30 days.
pub const CLIENT_TOKEN_TTL_SECS: i64 = 2_592_000;

/// Service token lifetime: 15 minutes.
pub const SERVICE_TOKEN_TTL_SECS: i64 = 900;

/// Resource paths a client token may reach.
pub const ACL_PATHS: [&str; 10] = [
    "/*/users/**",
    "/*/conversations/**",
    "/*/sessions/**",
    "/*/devices/**",
    "/*/image/**",
    "/*/media/**",
    "/*/applications/**",
    "/*/push/**",
    "/*/knocking/**",
    "/*/legs/**",
];

/// Path-pattern ACL embedded in client tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub paths: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
}

impl Acl {
    /// The fixed client ACL.
    pub fn client() -> Self {
        Self {
            paths: ACL_PATHS
                .iter()
                .map(|path| (path.to_string(), serde_json::Map::new()))
                .collect(),
        }
    }
}

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub application_id: String,
    pub iat: i64,
    pub jti: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Acl>,
    /// Present only on client tokens tied to one user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl Claims {
    /// Claims for a client token issued at `now` (unix seconds).
    pub fn client(application_id: &str, subject: Option<&str>, now: i64) -> Self {
        Self {
            application_id: application_id.to_string(),
            iat: now,
            jti: Uuid::new_v4().to_string(),
            exp: now + CLIENT_TOKEN_TTL_SECS,
            acl: Some(Acl::client()),
            sub: subject.map(str::to_string),
        }
    }

    /// Claims for a short-lived service credential issued at `now`.
    pub fn service(application_id: &str, now: i64) -> Self {
        Self {
            application_id: application_id.to_string(),
            iat: now,
            jti: Uuid::new_v4().to_string(),
            exp: now + SERVICE_TOKEN_TTL_SECS,
            acl: None,
            sub: None,
        }
    }
}

/// Signs tokens with the application's private key.
#[derive(Clone)]
pub struct TokenIssuer {
    application_id: String,
    key: Arc<EncodingKey>,
    header: Header,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("application_id", &self.application_id)
            .field("alg", &self.header.alg)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// RS256 issuer from a PEM-encoded RSA private key.
    pub fn from_rsa_pem(
        application_id: impl Into<String>,
        private_key: &SecretString,
    ) -> Result<Self, TokenError> {
        let key = EncodingKey::from_rsa_pem(private_key.expose_secret().as_bytes())
            .map_err(|e| TokenError::InvalidKey(e.to_string()))?;
        Ok(Self::with_key(application_id, key, Algorithm::RS256))
    }

    /// Issuer over an already-built key.
    pub fn with_key(
        application_id: impl Into<String>,
        key: EncodingKey,
        algorithm: Algorithm,
    ) -> Self {
        let mut header = Header::new(algorithm);
        header.typ = Some("JWT".to_string());
        Self {
            application_id: application_id.into(),
            key: Arc::new(key),
            header,
        }
    }

    /// Client token, bound to `subject` when one is given.
    pub fn client_token(&self, subject: Option<&str>) -> Result<String, TokenError> {
        let claims = Claims::client(&self.application_id, subject, Utc::now().timestamp());
        tracing::debug!(sub = ?claims.sub, exp = claims.exp, "Issuing client token");
        self.sign(&claims)
    }

    /// Fresh bearer credential for one outbound API call.
    pub fn service_token(&self) -> Result<String, TokenError> {
        self.sign(&Claims::service(&self.application_id, Utc::now().timestamp()))
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        Ok(encode(&self.header, claims, &self.key)?)
    }
}
