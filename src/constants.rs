//! # Constants
//!
//! Shared defaults used throughout the gateway.
//!
//! Every one of these can be overridden through the environment; see
//! `config` for the variable names.

/// Default Vault server address
pub const DEFAULT_VAULT_ADDR: &str = "http://127.0.0.1:8200";

/// Default KV mount (backend namespace) secrets are read from and written to
pub const DEFAULT_MOUNT: &str = "secret";

/// Default HTTP listen port for the gateway
pub const DEFAULT_GATEWAY_PORT: u16 = 5000;

/// Default per-request timeout for calls to the Vault server (seconds)
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 5;

/// Default remaining-lifetime threshold below which the session token is
/// renewed before the next request (seconds)
pub const DEFAULT_RENEW_THRESHOLD_SECS: u64 = 60;

/// Floor for the background renewal timer period (seconds)
pub const MIN_RENEWAL_TIMER_PERIOD_SECS: u64 = 1;
