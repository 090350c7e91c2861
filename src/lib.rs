//! # Vault KV Gateway
//!
//! A thin, authenticated gateway in front of a HashiCorp-Vault-compatible
//! secrets server.
//!
//! ## Overview
//!
//! Three layers, one direction of data flow:
//!
//! 1. **Transport client** ([`transport`]) - owns the rustls connection
//!    pool, the TLS trust anchor, and the session token lifecycle
//!    (acquisition, ahead-of-expiry renewal, single re-auth retry)
//! 2. **Secret accessor** ([`kv`]) - typed read/write/read-field over the
//!    versioned KV namespace, plus the non-versioned legacy API and the
//!    server health check, behind the [`kv::SecretStore`] trait
//! 3. **Boundary adapter** ([`server`]) - REST endpoints that translate
//!    requests to accessor calls and error kinds to status codes
//!
//! Requests are stateless and independent; the only state crossing
//! requests is the transport client's token, private to that layer.

pub mod config;
pub mod constants;
pub mod error;
pub mod kv;
pub mod metrics;
pub mod server;
pub mod transport;

pub use config::{AuthMethod, ConfigSnapshot, GatewayConfig};
pub use error::{ConfigError, VaultError};
pub use kv::{HealthStatus, SecretData, SecretStore, VaultKv, WrittenVersion};
pub use transport::VaultTransport;
