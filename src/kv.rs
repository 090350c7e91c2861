//! # Secret Accessor
//!
//! Typed get/put over the versioned KV namespace.
//!
//! The [`SecretStore`] trait is the seam between the boundary adapter and
//! the transport: handlers only see the trait, so tests drive them against
//! an in-memory implementation. [`VaultKv`] is the real implementation,
//! translating accessor calls into KV v2 (and, for `read_legacy`, KV v1)
//! requests. Nothing is cached across calls; secrets live server-side only.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VaultError;
use crate::metrics;
use crate::transport::VaultTransport;

/// A secret's payload: string keys to JSON values.
pub type SecretData = BTreeMap<String, serde_json::Value>;

/// Version number assigned by the server to a completed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenVersion {
    pub version: u64,
}

/// Snapshot of the server's health response. Transient; reflects only the
/// most recent reply.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    pub initialized: bool,
    pub sealed: bool,
    pub standby: bool,
}

impl HealthStatus {
    /// Usable for reads and writes: initialized, unsealed, and active.
    #[must_use]
    pub fn healthy(&self) -> bool {
        self.initialized && !self.sealed && !self.standby
    }
}

/// Read/write access to a secrets namespace.
///
/// Absence is an explicit outcome, never an error disguised as one:
/// `read*` return `Ok(None)` for a missing path, and `read_field`
/// distinguishes a missing secret from a missing field.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Latest version of the secret at `path`.
    async fn read(&self, path: &str) -> Result<Option<SecretData>, VaultError>;

    /// A specific version of the secret at `path`.
    async fn read_version(
        &self,
        path: &str,
        version: u64,
    ) -> Result<Option<SecretData>, VaultError>;

    /// Store `data` as a new version. Atomic from the caller's point of
    /// view; the server either stores the whole mapping or none of it.
    async fn write(&self, path: &str, data: SecretData) -> Result<WrittenVersion, VaultError>;

    /// Read through the older non-versioned KV v1 API. A distinct
    /// operation, not a flag on `read`, so versioned and non-versioned
    /// semantics cannot be mixed accidentally.
    async fn read_legacy(&self, path: &str) -> Result<Option<SecretData>, VaultError>;

    /// Server health snapshot.
    async fn health(&self) -> Result<HealthStatus, VaultError>;

    /// `read` plus field lookup. An absent secret surfaces as
    /// [`VaultError::NotFound`], a present secret without the field as
    /// [`VaultError::FieldNotFound`]; a present field keeps its value even
    /// when that value is empty or null.
    async fn read_field(
        &self,
        path: &str,
        field: &str,
    ) -> Result<serde_json::Value, VaultError> {
        match self.read(path).await? {
            None => Err(VaultError::NotFound {
                path: path.to_string(),
            }),
            Some(data) => data
                .get(field)
                .cloned()
                .ok_or_else(|| VaultError::FieldNotFound {
                    path: path.to_string(),
                    field: field.to_string(),
                }),
        }
    }
}

/// KV accessor backed by a shared [`VaultTransport`].
#[derive(Debug)]
pub struct VaultKv {
    transport: Arc<VaultTransport>,
    mount: String,
}

impl VaultKv {
    #[must_use]
    pub fn new(transport: Arc<VaultTransport>, mount: impl Into<String>) -> Self {
        Self {
            transport,
            mount: mount.into(),
        }
    }

    fn data_path(&self, path: &str) -> String {
        format!("v1/{}/data/{}", self.mount, path)
    }

    fn legacy_path(&self, path: &str) -> String {
        format!("v1/{}/{}", self.mount, path)
    }

    async fn read_inner(
        &self,
        path: &str,
        version: Option<u64>,
    ) -> Result<Option<SecretData>, VaultError> {
        validate_path(path)?;
        let query: Vec<(&str, String)> = version
            .map(|version| ("version", version.to_string()))
            .into_iter()
            .collect();

        let Some(raw) = self
            .transport
            .request(Method::GET, &self.data_path(path), &query, None)
            .await?
        else {
            return Ok(None);
        };

        let envelope: Kv2ReadEnvelope = decode_envelope(raw)?;
        debug!(path, version = envelope.data.metadata.version, "read secret");
        Ok(Some(envelope.data.data))
    }
}

#[async_trait]
impl SecretStore for VaultKv {
    async fn read(&self, path: &str) -> Result<Option<SecretData>, VaultError> {
        timed("read", self.read_inner(path, None)).await
    }

    async fn read_version(
        &self,
        path: &str,
        version: u64,
    ) -> Result<Option<SecretData>, VaultError> {
        timed("read_version", self.read_inner(path, Some(version))).await
    }

    async fn write(&self, path: &str, data: SecretData) -> Result<WrittenVersion, VaultError> {
        timed("write", async {
            validate_path(path)?;
            let payload = serde_json::json!({ "data": data });
            let raw = self
                .transport
                .request(Method::POST, &self.data_path(path), &[], Some(&payload))
                .await?
                .ok_or_else(|| VaultError::NotFound {
                    path: path.to_string(),
                })?;

            let envelope: Kv2WriteEnvelope = decode_envelope(raw)?;
            debug!(path, version = envelope.data.version, "wrote secret");
            Ok(WrittenVersion {
                version: envelope.data.version,
            })
        })
        .await
    }

    async fn read_legacy(&self, path: &str) -> Result<Option<SecretData>, VaultError> {
        timed("read_legacy", async {
            validate_path(path)?;
            let Some(raw) = self
                .transport
                .request(Method::GET, &self.legacy_path(path), &[], None)
                .await?
            else {
                return Ok(None);
            };

            let envelope: Kv1Envelope = decode_envelope(raw)?;
            debug!(path, "read legacy secret");
            Ok(Some(envelope.data))
        })
        .await
    }

    async fn health(&self) -> Result<HealthStatus, VaultError> {
        timed("health", async {
            let raw = self.transport.request_any_status("v1/sys/health").await?;
            let health: SysHealth = decode_envelope(raw)?;
            Ok(HealthStatus {
                initialized: health.initialized,
                sealed: health.sealed,
                standby: health.standby,
            })
        })
        .await
    }
}

/// Record the operation counter and duration around an accessor call.
async fn timed<T, F>(operation: &str, fut: F) -> Result<T, VaultError>
where
    F: std::future::Future<Output = Result<T, VaultError>>,
{
    let start = Instant::now();
    let result = fut.await;
    let outcome = match &result {
        Ok(_) => "success",
        Err(err) => err.outcome(),
    };
    metrics::record_kv_operation(operation, outcome, start.elapsed().as_secs_f64());
    result
}

/// Reject paths the server could never address: empty, absolute, trailing
/// separator, empty segments, or dot segments. An invalid path is reported
/// as absent rather than inventing an error kind outside the taxonomy.
fn validate_path(path: &str) -> Result<(), VaultError> {
    let valid = !path.is_empty()
        && !path.starts_with('/')
        && !path.ends_with('/')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(VaultError::NotFound {
            path: path.to_string(),
        })
    }
}

fn decode_envelope<T: serde::de::DeserializeOwned>(
    raw: serde_json::Value,
) -> Result<T, VaultError> {
    serde_json::from_value(raw)
        .map_err(|err| VaultError::Transport(format!("unexpected response shape: {err}")))
}

#[derive(Deserialize)]
struct Kv2ReadEnvelope {
    data: Kv2ReadData,
}

#[derive(Deserialize)]
struct Kv2ReadData {
    data: SecretData,
    metadata: Kv2Metadata,
}

#[derive(Deserialize)]
struct Kv2Metadata {
    version: u64,
}

#[derive(Deserialize)]
struct Kv2WriteEnvelope {
    data: Kv2WriteData,
}

#[derive(Deserialize)]
struct Kv2WriteData {
    version: u64,
}

#[derive(Deserialize)]
struct Kv1Envelope {
    data: SecretData,
}

#[derive(Deserialize)]
struct SysHealth {
    #[serde(default)]
    initialized: bool,
    #[serde(default)]
    sealed: bool,
    #[serde(default)]
    standby: bool,
}
