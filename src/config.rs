//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::roster::Roster;

const DEFAULT_API_BASE_URL: &str = "https://api.nexmo.com";
const DEFAULT_PRIVATE_KEY_PATH: &str = "./.private.key";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Broker configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Application identity, stamped into every token.
    pub app_id: String,
    /// API region host, e.g. `api-us-3.vonage.com`.
    pub api_region: String,
    /// Datacenter code derived from the region (`us-3`).
    pub dc: String,
    /// Caller id for in-app calls to PSTN numbers.
    pub service_number: String,
    pub private_key_path: PathBuf,
    /// Allowed in-app users, in IVR menu order.
    pub roster: Roster,
    /// Base URL of the user directory / session API.
    pub api_base_url: String,
    /// Callback host used when a request carries no `Host` header.
    pub public_host: Option<String>,
    pub port: u16,
    /// Timeout applied to every outbound API call.
    pub http_timeout: Duration,
}

impl BrokerConfig {
    /// Load from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let app_id = required("APP_ID")?;
        let api_region = required("API_REGION")?;
        let dc = datacenter(&api_region)?;
        let service_number = required("SERVICE_NUMBER")?;
        let roster = Roster::parse(&required("CLIENT_SDK_USERS")?)?;

        let private_key_path = lookup("PRIVATE_KEY_PATH")
            .unwrap_or_else(|| DEFAULT_PRIVATE_KEY_PATH.to_string())
            .into();
        let api_base_url =
            lookup("API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let public_host = non_empty("PUBLIC_HOST").or_else(|| non_empty("NERU_HOST"));

        let port = match lookup("NERU_APP_PORT").or_else(|| lookup("PORT")) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".into(),
                message: format!("not a port number: {raw}"),
            })?,
            None => DEFAULT_PORT,
        };

        let http_timeout_secs = match lookup("HTTP_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "HTTP_TIMEOUT_SECS".into(),
                        message: format!("not a positive number of seconds: {raw}"),
                    });
                }
            },
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            app_id,
            api_region,
            dc,
            service_number,
            private_key_path,
            roster,
            api_base_url,
            public_host,
            port,
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }

    /// Read the PEM signing key from `private_key_path`.
    pub fn read_private_key(&self) -> Result<SecretString, ConfigError> {
        let pem = std::fs::read_to_string(&self.private_key_path)?;
        Ok(SecretString::from(pem))
    }
}

/// Datacenter code: characters 4..8 of the region host (`api-us-3...` → `us-3`).
fn datacenter(api_region: &str) -> Result<String, ConfigError> {
    api_region
        .get(4..8)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: "API_REGION".into(),
            message: format!("too short to carry a datacenter code: {api_region}"),
        })
}
