//! # Transport Client
//!
//! Owns the authenticated channel to the Vault server: the HTTP connection
//! pool, the TLS trust anchor, and the session token.
//!
//! The token slot is the only long-lived mutable state in the crate. It is
//! guarded by an async mutex so that at most one re-authentication is in
//! flight at a time; concurrent requests that observe an expiring token
//! wait on the in-progress refresh and re-check the deadline once they hold
//! the lock. A request that comes back 401/403 re-authenticates exactly
//! once and retries before surfacing the failure.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::{Certificate, Method, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{AuthMethod, GatewayConfig};
use crate::constants::MIN_RENEWAL_TIMER_PERIOD_SECS;
use crate::error::VaultError;
use crate::metrics;

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Authenticated HTTP channel to the Vault server.
pub struct VaultTransport {
    http: reqwest::Client,
    addr: String,
    auth: AuthMethod,
    request_timeout: Duration,
    renew_threshold: Duration,
    token: Mutex<Option<SessionToken>>,
}

/// Session token with its monotonic expiry deadline.
///
/// The secret lives in a [`Zeroizing`] buffer and is wiped when the token
/// is replaced or the transport is dropped.
struct SessionToken {
    secret: Zeroizing<String>,
    deadline: Option<Instant>,
    renewable: bool,
}

impl SessionToken {
    fn from_auth(auth: AuthBlock) -> Self {
        let deadline = (auth.lease_duration > 0)
            .then(|| Instant::now() + Duration::from_secs(auth.lease_duration));
        Self {
            secret: Zeroizing::new(auth.client_token),
            deadline,
            renewable: auth.renewable,
        }
    }

    /// True when less than `threshold` of the lease remains. Tokens without
    /// a deadline (static tokens) never expire.
    fn expiring_within(&self, threshold: Duration) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() + threshold >= deadline)
    }
}

#[derive(Deserialize)]
struct AuthEnvelope {
    auth: AuthBlock,
}

#[derive(Deserialize)]
struct AuthBlock {
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

impl VaultTransport {
    /// Build the HTTP client from the immutable configuration.
    ///
    /// TLS verification is strict rustls: when `ca_cert` is set, that PEM
    /// is the trust anchor; otherwise the bundled webpki roots apply. An
    /// expired certificate, mismatched host, or untrusted CA always fails
    /// the request.
    ///
    /// # Errors
    ///
    /// Fails when the trust anchor cannot be read or is not valid PEM.
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.request_timeout);

        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path).with_context(|| {
                format!("failed to read TLS trust anchor {}", path.display())
            })?;
            let cert =
                Certificate::from_pem(&pem).context("TLS trust anchor is not valid PEM")?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder.build().context("failed to build HTTP client")?;
        info!(
            addr = %config.addr,
            auth = config.auth.name(),
            "vault transport ready"
        );

        Ok(Self {
            http,
            addr: config.addr.clone(),
            auth: config.auth.clone(),
            request_timeout: config.request_timeout,
            renew_threshold: config.renew_threshold,
            token: Mutex::new(None),
        })
    }

    /// Authenticated request against `api_path` (e.g. `v1/secret/data/app`).
    ///
    /// Returns `Ok(None)` for 404 so the accessor can represent absence
    /// without an error. A 401/403 triggers exactly one re-authentication
    /// and retry.
    pub(crate) async fn request(
        &self,
        method: Method,
        api_path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<Option<serde_json::Value>, VaultError> {
        let token = self.current_token().await?;
        let mut response = self
            .execute(method.clone(), api_path, query, body, token.as_str())
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            warn!(
                path = api_path,
                status = %response.status(),
                "request rejected, re-authenticating once"
            );
            metrics::increment_auth_retries();
            let token = self.reauthenticate(token.as_str()).await?;
            response = self
                .execute(method, api_path, query, body, token.as_str())
                .await?;
        }

        self.decode(response, api_path).await
    }

    /// Unauthenticated GET whose JSON body is parsed regardless of the
    /// status code. Vault reports sealed/standby/uninitialized states
    /// through non-2xx statuses on `sys/health`.
    pub(crate) async fn request_any_status(
        &self,
        api_path: &str,
    ) -> Result<serde_json::Value, VaultError> {
        let url = format!("{}/{}", self.addr, api_path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| VaultError::from_reqwest(err, self.request_timeout))?;
        response
            .json()
            .await
            .map_err(|err| VaultError::from_reqwest(err, self.request_timeout))
    }

    /// Ahead-of-expiry renewal in the background, ticking at half the
    /// renewal threshold. Abort the returned handle at shutdown. A static
    /// token has no deadline, so for token auth the tick is a no-op.
    pub fn spawn_renewal_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let transport = Arc::clone(self);
        let period = (transport.renew_threshold / 2)
            .max(Duration::from_secs(MIN_RENEWAL_TIMER_PERIOD_SECS));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = transport.current_token().await {
                    warn!("background token renewal failed: {err}");
                }
            }
        })
    }

    /// Current session token, refreshed first when its remaining lifetime
    /// is under the threshold. All token mutation happens here and in
    /// [`Self::reauthenticate`], under the slot lock.
    async fn current_token(&self) -> Result<Zeroizing<String>, VaultError> {
        let mut slot = self.token.lock().await;

        let needs_refresh = match slot.as_ref() {
            None => true,
            Some(token) => token.expiring_within(self.renew_threshold),
        };

        if needs_refresh {
            let fresh = match slot.as_ref() {
                Some(stale) if stale.renewable => {
                    match self.renew_self(stale.secret.as_str()).await {
                        Ok(renewed) => renewed,
                        Err(err) => {
                            debug!("token renewal failed, falling back to fresh login: {err}");
                            self.login().await?
                        }
                    }
                }
                _ => self.login().await?,
            };
            if slot.is_some() {
                metrics::increment_token_renewals();
            }
            *slot = Some(fresh);
        }

        match slot.as_ref() {
            Some(token) => Ok(token.secret.clone()),
            None => Err(VaultError::Auth("no session token established".to_string())),
        }
    }

    /// Replace a token the server rejected. If another caller already
    /// replaced it, reuse theirs instead of logging in again, so concurrent
    /// failures converge on a single fresh token.
    async fn reauthenticate(&self, rejected: &str) -> Result<Zeroizing<String>, VaultError> {
        let mut slot = self.token.lock().await;

        if let Some(current) = slot.as_ref() {
            if current.secret.as_str() != rejected {
                return Ok(current.secret.clone());
            }
        }

        let fresh = self.login().await?;
        let secret = fresh.secret.clone();
        *slot = Some(fresh);
        Ok(secret)
    }

    /// Exchange the configured credential material for a session token.
    async fn login(&self) -> Result<SessionToken, VaultError> {
        match &self.auth {
            AuthMethod::Token { token } => Ok(SessionToken {
                secret: token.clone(),
                deadline: None,
                renewable: false,
            }),
            AuthMethod::AppRole { role_id, secret_id } => {
                let url = format!("{}/v1/auth/approle/login", self.addr);
                let payload = serde_json::json!({
                    "role_id": role_id,
                    "secret_id": secret_id.as_str(),
                });
                let response = self
                    .http
                    .post(&url)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|err| VaultError::from_reqwest(err, self.request_timeout))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(VaultError::Auth(format!(
                        "approle login rejected with status {status}"
                    )));
                }

                let login: AuthEnvelope = response
                    .json()
                    .await
                    .map_err(|err| VaultError::from_reqwest(err, self.request_timeout))?;
                debug!(
                    lease_secs = login.auth.lease_duration,
                    "approle login succeeded"
                );
                Ok(SessionToken::from_auth(login.auth))
            }
        }
    }

    /// Renew the current leased token through `auth/token/renew-self`.
    async fn renew_self(&self, token: &str) -> Result<SessionToken, VaultError> {
        let url = format!("{}/v1/auth/token/renew-self", self.addr);
        let response = self
            .http
            .post(&url)
            .header(VAULT_TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|err| VaultError::from_reqwest(err, self.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::Auth(format!(
                "token renewal rejected with status {status}"
            )));
        }

        let renewed: AuthEnvelope = response
            .json()
            .await
            .map_err(|err| VaultError::from_reqwest(err, self.request_timeout))?;
        Ok(SessionToken::from_auth(renewed.auth))
    }

    async fn execute(
        &self,
        method: Method,
        api_path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<reqwest::Response, VaultError> {
        let url = format!("{}/{}", self.addr, api_path);
        let mut request = self
            .http
            .request(method, &url)
            .header(VAULT_TOKEN_HEADER, token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|err| VaultError::from_reqwest(err, self.request_timeout))
    }

    async fn decode(
        &self,
        response: reqwest::Response,
        api_path: &str,
    ) -> Result<Option<serde_json::Value>, VaultError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(VaultError::Auth(format!(
                "request rejected with status {status}"
            )));
        }
        if !status.is_success() {
            return Err(VaultError::Transport(format!(
                "server returned status {status} for '{api_path}'"
            )));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Some(serde_json::Value::Null));
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|err| VaultError::from_reqwest(err, self.request_timeout))
    }
}

impl fmt::Debug for VaultTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultTransport")
            .field("addr", &self.addr)
            .field("auth", &self.auth.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token_never_expires() {
        let token = SessionToken {
            secret: Zeroizing::new("s.static".to_string()),
            deadline: None,
            renewable: false,
        };
        assert!(!token.expiring_within(Duration::from_secs(3600)));
    }

    #[test]
    fn test_leased_token_expiry_window() {
        let token = SessionToken::from_auth(AuthBlock {
            client_token: "s.leased".to_string(),
            lease_duration: 120,
            renewable: true,
        });
        assert!(token.deadline.is_some());
        assert!(token.renewable);
        // 120s remaining: inside a 300s window, outside a 10s window
        assert!(token.expiring_within(Duration::from_secs(300)));
        assert!(!token.expiring_within(Duration::from_secs(10)));
    }

    #[test]
    fn test_zero_lease_means_no_deadline() {
        let token = SessionToken::from_auth(AuthBlock {
            client_token: "s.root".to_string(),
            lease_duration: 0,
            renewable: false,
        });
        assert!(token.deadline.is_none());
    }

    #[test]
    fn test_auth_envelope_deserializes_vault_login_response() {
        let raw = serde_json::json!({
            "request_id": "9c2f4f6a",
            "lease_id": "",
            "auth": {
                "client_token": "hvs.CAESIJ",
                "accessor": "ignored",
                "lease_duration": 2764800,
                "renewable": true,
                "token_type": "service"
            }
        });
        let envelope: AuthEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(envelope.auth.client_token, "hvs.CAESIJ");
        assert_eq!(envelope.auth.lease_duration, 2_764_800);
        assert!(envelope.auth.renewable);
    }
}
