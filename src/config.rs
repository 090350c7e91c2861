//! # Configuration
//!
//! Gateway configuration assembled once at startup from environment
//! variables and immutable afterwards. The transport client receives this
//! object by reference; nothing mutates it after construction.
//!
//! Recognized variables:
//!
//! - `VAULT_ADDR` - Vault base URI (default `http://127.0.0.1:8200`)
//! - `VAULT_MOUNT` - KV mount name (default `secret`)
//! - `VAULT_CACERT` - path to a PEM trust anchor for the server's TLS identity
//! - `VAULT_AUTH_METHOD` - `token` (default) or `approle`
//! - `VAULT_TOKEN` / `VAULT_TOKEN_FILE` - pre-issued token material
//! - `VAULT_APPROLE_ROLE_ID`, `VAULT_APPROLE_SECRET_ID` /
//!   `VAULT_APPROLE_SECRET_ID_FILE` - AppRole material
//! - `VAULT_CLIENT_TIMEOUT_SECS` - per-request deadline (default 5)
//! - `VAULT_RENEW_THRESHOLD_SECS` - remaining token lifetime that triggers
//!   renewal (default 60)
//! - `GATEWAY_PORT` - HTTP listen port (default 5000)

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use zeroize::Zeroizing;

use crate::constants::{
    DEFAULT_CLIENT_TIMEOUT_SECS, DEFAULT_GATEWAY_PORT, DEFAULT_MOUNT,
    DEFAULT_RENEW_THRESHOLD_SECS, DEFAULT_VAULT_ADDR,
};
use crate::error::ConfigError;

/// Credential material the transport client exchanges for a session token.
///
/// Secret parts live in [`Zeroizing`] buffers and are wiped when the config
/// is dropped. The `Debug` impl never prints them.
#[derive(Clone)]
pub enum AuthMethod {
    /// A pre-issued Vault token used directly as the session token.
    Token { token: Zeroizing<String> },
    /// AppRole login: `role_id` + `secret_id` exchanged for a leased token.
    AppRole {
        role_id: String,
        secret_id: Zeroizing<String>,
    },
}

impl AuthMethod {
    /// Short method name as it appears in logs and the config snapshot.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::AppRole { .. } => "approle",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token { .. } => f.debug_struct("Token").finish_non_exhaustive(),
            Self::AppRole { role_id, .. } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Immutable gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Vault base URI, no trailing slash.
    pub addr: String,
    /// KV mount (backend namespace) all secret paths are relative to.
    pub mount: String,
    /// PEM trust anchor for the server's TLS identity. When unset, the
    /// bundled webpki roots are used. There is no insecure fallback.
    pub ca_cert: Option<PathBuf>,
    /// Credential material for session establishment.
    pub auth: AuthMethod,
    /// Hard deadline applied to every outbound request.
    pub request_timeout: Duration,
    /// Remaining token lifetime below which renewal kicks in.
    pub renew_threshold: Duration,
    /// HTTP listen port for the boundary adapter.
    pub listen_port: u16,
}

/// Non-sensitive view of the configuration served on `/config`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    pub addr: String,
    pub mount: String,
    pub auth_method: &'static str,
    pub tls_trust_anchor: Option<String>,
    pub request_timeout_secs: u64,
    pub renew_threshold_secs: u64,
}

impl GatewayConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing, a value
    /// does not parse, or credential files cannot be read.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let addr = lookup("VAULT_ADDR").unwrap_or_else(|| DEFAULT_VAULT_ADDR.to_string());
        let addr = addr.trim_end_matches('/').to_string();
        if !addr.starts_with("http://") && !addr.starts_with("https://") {
            return Err(ConfigError::InvalidVar {
                var: "VAULT_ADDR",
                reason: format!("'{addr}' is not an http(s) URI"),
            });
        }

        let mount = lookup("VAULT_MOUNT").unwrap_or_else(|| DEFAULT_MOUNT.to_string());
        let ca_cert = lookup("VAULT_CACERT").map(PathBuf::from);
        let auth = Self::auth_from_lookup(&lookup)?;

        let request_timeout = Duration::from_secs(parse_secs(
            &lookup,
            "VAULT_CLIENT_TIMEOUT_SECS",
            DEFAULT_CLIENT_TIMEOUT_SECS,
        )?);
        let renew_threshold = Duration::from_secs(parse_secs(
            &lookup,
            "VAULT_RENEW_THRESHOLD_SECS",
            DEFAULT_RENEW_THRESHOLD_SECS,
        )?);

        let listen_port = match lookup("GATEWAY_PORT") {
            None => DEFAULT_GATEWAY_PORT,
            Some(raw) => raw.parse::<u16>().map_err(|err| ConfigError::InvalidVar {
                var: "GATEWAY_PORT",
                reason: err.to_string(),
            })?,
        };

        Ok(Self {
            addr,
            mount,
            ca_cert,
            auth,
            request_timeout,
            renew_threshold,
            listen_port,
        })
    }

    fn auth_from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<AuthMethod, ConfigError> {
        let method = lookup("VAULT_AUTH_METHOD").unwrap_or_else(|| "token".to_string());
        match method.as_str() {
            "token" => {
                let token = match lookup("VAULT_TOKEN") {
                    Some(token) if !token.trim().is_empty() => token.trim().to_string(),
                    _ => match lookup("VAULT_TOKEN_FILE") {
                        Some(path) => read_credential_file("token", &path)?,
                        None => return Err(ConfigError::MissingVar("VAULT_TOKEN")),
                    },
                };
                Ok(AuthMethod::Token {
                    token: Zeroizing::new(token),
                })
            }
            "approle" => {
                let role_id = lookup("VAULT_APPROLE_ROLE_ID")
                    .ok_or(ConfigError::MissingVar("VAULT_APPROLE_ROLE_ID"))?;
                let secret_id = match lookup("VAULT_APPROLE_SECRET_ID") {
                    Some(secret_id) => secret_id,
                    None => match lookup("VAULT_APPROLE_SECRET_ID_FILE") {
                        Some(path) => read_credential_file("approle secret_id", &path)?,
                        None => return Err(ConfigError::MissingVar("VAULT_APPROLE_SECRET_ID")),
                    },
                };
                Ok(AuthMethod::AppRole {
                    role_id,
                    secret_id: Zeroizing::new(secret_id),
                })
            }
            other => Err(ConfigError::InvalidVar {
                var: "VAULT_AUTH_METHOD",
                reason: format!("unsupported method '{other}' (expected 'token' or 'approle')"),
            }),
        }
    }

    /// Non-sensitive snapshot for the `/config` endpoint and startup log.
    #[must_use]
    pub fn redacted(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            addr: self.addr.clone(),
            mount: self.mount.clone(),
            auth_method: self.auth.name(),
            tls_trust_anchor: self
                .ca_cert
                .as_ref()
                .map(|path| path.display().to_string()),
            request_timeout_secs: self.request_timeout.as_secs(),
            renew_threshold_secs: self.renew_threshold.as_secs(),
        }
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|err| ConfigError::InvalidVar {
            var,
            reason: err.to_string(),
        }),
    }
}

fn read_credential_file(what: &'static str, path: &str) -> Result<String, ConfigError> {
    fs::read_to_string(path)
        .map(|contents| contents.trim().to_string())
        .map_err(|source| ConfigError::CredentialFile {
            what,
            path: path.to_string(),
            source,
        })
}
