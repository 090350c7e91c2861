//! # Mock Vault Contract Tests
//!
//! Spin up an in-process Vault-shaped server on an ephemeral port and
//! exercise the real transport client and accessor against it:
//! - AppRole login and KV v2 round-trips
//! - versioned and KV v1 (legacy) reads
//! - 404 surfacing as explicit absence
//! - a rejected token triggering exactly one silent re-authentication
//! - short leases forcing ahead-of-expiry renewal
//! - timeout classification

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use vault_gateway::config::{AuthMethod, GatewayConfig};
use vault_gateway::error::VaultError;
use vault_gateway::kv::{SecretData, SecretStore, VaultKv};
use vault_gateway::transport::VaultTransport;

const ROLE_ID: &str = "gateway";
const SECRET_ID: &str = "s3cr3t-id";

struct MockVault {
    secrets: Mutex<HashMap<String, Vec<SecretData>>>,
    legacy: Mutex<HashMap<String, SecretData>>,
    valid_tokens: Mutex<HashSet<String>>,
    logins: AtomicUsize,
    lease_secs: u64,
    sealed: bool,
}

impl MockVault {
    fn build(lease_secs: u64, sealed: bool) -> Self {
        Self {
            secrets: Mutex::new(HashMap::new()),
            legacy: Mutex::new(HashMap::new()),
            valid_tokens: Mutex::new(HashSet::new()),
            logins: AtomicUsize::new(0),
            lease_secs,
            sealed,
        }
    }

    fn new(lease_secs: u64) -> Arc<Self> {
        Arc::new(Self::build(lease_secs, false))
    }

    fn sealed(lease_secs: u64) -> Arc<Self> {
        Arc::new(Self::build(lease_secs, true))
    }

    fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    async fn revoke_all_tokens(&self) {
        self.valid_tokens.lock().await.clear();
    }

    async fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(token) = headers.get("x-vault-token").and_then(|v| v.to_str().ok()) else {
            return false;
        };
        self.valid_tokens.lock().await.contains(token)
    }
}

fn permission_denied() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "errors": ["permission denied"] })),
    )
        .into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "errors": [] }))).into_response()
}

async fn login(
    State(vault): State<Arc<MockVault>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if body["role_id"] != ROLE_ID || body["secret_id"] != SECRET_ID {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": ["invalid role or secret id"] })),
        )
            .into_response();
    }

    let count = vault.logins.fetch_add(1, Ordering::SeqCst) + 1;
    let token = format!("mock-token-{count}");
    vault.valid_tokens.lock().await.insert(token.clone());

    Json(json!({
        "auth": {
            "client_token": token,
            "lease_duration": vault.lease_secs,
            "renewable": false,
            "token_type": "service"
        }
    }))
    .into_response()
}

async fn sys_health(State(vault): State<Arc<MockVault>>) -> Response {
    let body = json!({
        "initialized": true,
        "sealed": vault.sealed,
        "standby": false,
    });
    let status = if vault.sealed {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(body)).into_response()
}

async fn kv2_read(
    State(vault): State<Arc<MockVault>>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !vault.authorized(&headers).await {
        return permission_denied();
    }

    let secrets = vault.secrets.lock().await;
    let Some(versions) = secrets.get(&path) else {
        return not_found();
    };

    let (version, data) = match query.get("version").and_then(|raw| raw.parse::<usize>().ok()) {
        Some(requested) if requested >= 1 => match versions.get(requested - 1) {
            Some(data) => (requested, data.clone()),
            None => return not_found(),
        },
        Some(_) => return not_found(),
        None => match versions.last() {
            Some(data) => (versions.len(), data.clone()),
            None => return not_found(),
        },
    };

    Json(json!({
        "data": {
            "data": data,
            "metadata": {
                "created_time": "2026-01-01T00:00:00Z",
                "version": version,
                "destroyed": false
            }
        }
    }))
    .into_response()
}

async fn kv2_write(
    State(vault): State<Arc<MockVault>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if !vault.authorized(&headers).await {
        return permission_denied();
    }

    let Ok(data) = serde_json::from_value::<SecretData>(body["data"].clone()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": ["data must be a mapping"] })),
        )
            .into_response();
    };

    let mut secrets = vault.secrets.lock().await;
    let versions = secrets.entry(path).or_default();
    versions.push(data);

    Json(json!({
        "data": {
            "created_time": "2026-01-01T00:00:00Z",
            "version": versions.len(),
            "destroyed": false
        }
    }))
    .into_response()
}

async fn kv1_read(
    State(vault): State<Arc<MockVault>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !vault.authorized(&headers).await {
        return permission_denied();
    }

    let legacy = vault.legacy.lock().await;
    match legacy.get(&path) {
        Some(data) => Json(json!({ "data": data, "lease_duration": 2764800 })).into_response(),
        None => not_found(),
    }
}

async fn slow_read(Path(_path): Path<String>) -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    not_found()
}

async fn spawn_mock(vault: Arc<MockVault>) -> String {
    let app = Router::new()
        .route("/v1/auth/approle/login", post(login))
        .route("/v1/sys/health", get(sys_health))
        .route("/v1/secret/data/{*path}", get(kv2_read).post(kv2_write))
        .route("/v1/legacy/{*path}", get(kv1_read))
        .route("/v1/slow/data/{*path}", get(slow_read))
        .with_state(vault);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn config_for(addr: &str) -> GatewayConfig {
    GatewayConfig {
        addr: addr.to_string(),
        mount: "secret".to_string(),
        ca_cert: None,
        auth: AuthMethod::AppRole {
            role_id: ROLE_ID.to_string(),
            secret_id: Zeroizing::new(SECRET_ID.to_string()),
        },
        request_timeout: Duration::from_secs(2),
        renew_threshold: Duration::from_secs(60),
        listen_port: 0,
    }
}

fn kv_for(config: &GatewayConfig) -> VaultKv {
    let transport = Arc::new(VaultTransport::new(config).unwrap());
    VaultKv::new(transport, config.mount.clone())
}

fn sample_secret() -> SecretData {
    let mut data = SecretData::new();
    data.insert(
        "name".to_string(),
        serde_json::Value::String("demo".to_string()),
    );
    data
}

#[tokio::test]
async fn test_approle_login_and_round_trip() {
    let vault = MockVault::new(3600);
    let addr = spawn_mock(Arc::clone(&vault)).await;
    let kv = kv_for(&config_for(&addr));

    let written = kv.write("app/config", sample_secret()).await.unwrap();
    assert_eq!(written.version, 1);

    let read = kv.read("app/config").await.unwrap();
    assert_eq!(read, Some(sample_secret()));

    // one login serves every request while the lease is healthy
    assert_eq!(vault.login_count(), 1);
}

#[tokio::test]
async fn test_reading_a_path_never_written_is_explicit_absence() {
    let vault = MockVault::new(3600);
    let addr = spawn_mock(Arc::clone(&vault)).await;
    let kv = kv_for(&config_for(&addr));

    let read = kv.read("nonexistent/path").await.unwrap();
    assert!(read.is_none());
}

#[tokio::test]
async fn test_versioned_reads_address_history() {
    let vault = MockVault::new(3600);
    let addr = spawn_mock(Arc::clone(&vault)).await;
    let kv = kv_for(&config_for(&addr));

    let mut first = SecretData::new();
    first.insert("tier".to_string(), json!("bronze"));
    let mut second = SecretData::new();
    second.insert("tier".to_string(), json!("gold"));

    kv.write("app/plan", first.clone()).await.unwrap();
    let written = kv.write("app/plan", second.clone()).await.unwrap();
    assert_eq!(written.version, 2);

    assert_eq!(kv.read_version("app/plan", 1).await.unwrap(), Some(first));
    assert_eq!(kv.read("app/plan").await.unwrap(), Some(second));
    assert!(kv.read_version("app/plan", 9).await.unwrap().is_none());
}

#[tokio::test]
async fn test_legacy_read_uses_the_non_versioned_api() {
    let vault = MockVault::new(3600);
    let addr = spawn_mock(Arc::clone(&vault)).await;

    vault
        .legacy
        .lock()
        .await
        .insert("app/config".to_string(), sample_secret());

    let mut config = config_for(&addr);
    config.mount = "legacy".to_string();
    let kv = kv_for(&config);

    assert_eq!(
        kv.read_legacy("app/config").await.unwrap(),
        Some(sample_secret())
    );
    assert!(kv.read_legacy("app/other").await.unwrap().is_none());
}

#[tokio::test]
async fn test_field_reads_through_the_full_stack() {
    let vault = MockVault::new(3600);
    let addr = spawn_mock(Arc::clone(&vault)).await;
    let kv = kv_for(&config_for(&addr));

    kv.write("app/config", sample_secret()).await.unwrap();

    let value = kv.read_field("app/config", "name").await.unwrap();
    assert_eq!(value, json!("demo"));

    let err = kv.read_field("app/config", "missing").await.unwrap_err();
    assert!(matches!(err, VaultError::FieldNotFound { .. }));

    let err = kv.read_field("app/other", "name").await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}

#[tokio::test]
async fn test_rejected_token_triggers_exactly_one_reauthentication() {
    let vault = MockVault::new(3600);
    let addr = spawn_mock(Arc::clone(&vault)).await;
    let kv = kv_for(&config_for(&addr));

    kv.write("app/config", sample_secret()).await.unwrap();
    assert_eq!(vault.login_count(), 1);

    // server-side revocation: the next request is rejected, the transport
    // re-authenticates once, and the caller observes success
    vault.revoke_all_tokens().await;
    let read = kv.read("app/config").await.unwrap();
    assert_eq!(read, Some(sample_secret()));
    assert_eq!(vault.login_count(), 2);
}

#[tokio::test]
async fn test_invalid_credentials_surface_as_auth_error() {
    let vault = MockVault::new(3600);
    let addr = spawn_mock(Arc::clone(&vault)).await;

    let mut config = config_for(&addr);
    config.auth = AuthMethod::AppRole {
        role_id: ROLE_ID.to_string(),
        secret_id: Zeroizing::new("wrong".to_string()),
    };
    let kv = kv_for(&config);

    let err = kv.read("app/config").await.unwrap_err();
    assert!(matches!(err, VaultError::Auth(_)));
}

#[tokio::test]
async fn test_short_lease_forces_renewal_before_requests() {
    // lease far below the renewal threshold: every request refreshes first
    let vault = MockVault::new(1);
    let addr = spawn_mock(Arc::clone(&vault)).await;
    let kv = kv_for(&config_for(&addr));

    kv.write("app/config", sample_secret()).await.unwrap();
    let read = kv.read("app/config").await.unwrap();
    assert_eq!(read, Some(sample_secret()));

    assert!(
        vault.login_count() >= 2,
        "expected a renewal login, saw {}",
        vault.login_count()
    );
}

#[tokio::test]
async fn test_health_reflects_active_and_sealed_servers() {
    let vault = MockVault::new(3600);
    let addr = spawn_mock(Arc::clone(&vault)).await;
    let kv = kv_for(&config_for(&addr));

    let status = kv.health().await.unwrap();
    assert!(status.healthy());

    // a sealed server answers with a 5xx status but a parseable body
    let sealed = MockVault::sealed(3600);
    let sealed_addr = spawn_mock(sealed).await;
    let kv = kv_for(&config_for(&sealed_addr));

    let status = kv.health().await.unwrap();
    assert!(status.initialized);
    assert!(status.sealed);
    assert!(!status.healthy());
}

#[tokio::test]
async fn test_health_errors_only_on_transport_failure() {
    // nothing listening on this port
    let config = config_for("http://127.0.0.1:1");
    let kv = kv_for(&config);

    let err = kv.health().await.unwrap_err();
    assert!(matches!(
        err,
        VaultError::Transport(_) | VaultError::Timeout(_)
    ));
}

#[tokio::test]
async fn test_slow_server_surfaces_as_timeout() {
    let vault = MockVault::new(3600);
    let addr = spawn_mock(Arc::clone(&vault)).await;

    let mut config = config_for(&addr);
    config.mount = "slow".to_string();
    config.request_timeout = Duration::from_millis(250);
    let kv = kv_for(&config);

    let err = kv.read("app/config").await.unwrap_err();
    assert!(matches!(err, VaultError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn test_concurrent_writers_each_succeed_and_one_wins() {
    let vault = MockVault::new(3600);
    let addr = spawn_mock(Arc::clone(&vault)).await;
    let config = config_for(&addr);
    let transport = Arc::new(VaultTransport::new(&config).unwrap());
    let kv = Arc::new(VaultKv::new(transport, config.mount.clone()));

    let mut handles = Vec::new();
    for writer in 0..4u64 {
        let kv = Arc::clone(&kv);
        handles.push(tokio::spawn(async move {
            let mut data = SecretData::new();
            data.insert("writer".to_string(), json!(writer));
            kv.write("app/shared", data).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let read = kv.read("app/shared").await.unwrap().unwrap();
    let winner = read.get("writer").and_then(serde_json::Value::as_u64);
    assert!(matches!(winner, Some(0..=3)), "unexpected winner {winner:?}");
}
