//! Loopback HTTP endpoint through which the consent surface reads the pending
//! request and writes the user's decision.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, Router},
    Json,
};
use rcs_core::consent::ensure_private_dir;
use rcs_core::{BridgeError, ConsentBridge};
use rcs_proto::v1::{ConsentDecision, ConsentRequest};
use rcs_proto::Validate;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// File the generated token is written to, inside the bridge directory.
pub const TOKEN_FILE: &str = "bridge.token";

#[derive(Debug, Error)]
pub enum ConsentApiError {
    #[error("consent endpoint must bind a loopback address, got {0}")]
    NotLoopback(SocketAddr),
    #[error("failed to generate token: {0}")]
    Random(#[from] getrandom::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[derive(Clone)]
pub struct ConsentApiState {
    pub bridge: ConsentBridge,
    pub token: String,
}

pub fn router(state: ConsentApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/consent/request", get(read_request))
        .route("/v1/consent/decision", post(write_decision))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener, refusing anything but loopback.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ConsentApiError> {
    if !addr.ip().is_loopback() {
        return Err(ConsentApiError::NotLoopback(addr));
    }
    let listener = TcpListener::bind(addr).await?;
    info!("Consent endpoint listening on {}", listener.local_addr()?);
    Ok(listener)
}

pub async fn serve(listener: TcpListener, state: ConsentApiState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

/// Use the configured token, or generate one and write it where the consent
/// surface can read it.
pub async fn resolve_token(
    configured: Option<&str>,
    bridge_dir: &Path,
) -> Result<String, ConsentApiError> {
    if let Some(token) = configured {
        return Ok(token.to_string());
    }
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)?;
    let token = hex::encode(bytes);
    let path = write_token_file(bridge_dir, &token).await?;
    info!("Generated consent token at {}", path.display());
    Ok(token)
}

/// Write through a freshly created temporary file renamed into place, so an
/// existing entry at the token path (a planted symlink included) is replaced
/// rather than written through.
async fn write_token_file(dir: &Path, token: &str) -> Result<PathBuf, ConsentApiError> {
    ensure_private_dir(dir).await?;
    let path = dir.join(TOKEN_FILE);
    let tmp = dir.join(format!(".{TOKEN_FILE}.tmp"));
    match tokio::fs::remove_file(&tmp).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(&tmp).await?;
    file.write_all(token.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, &path).await?;
    Ok(path)
}

/// Check bearer authentication
fn check_auth(headers: &HeaderMap, expected_token: &str) -> bool {
    let token = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .unwrap_or("");

    !token.is_empty() && token == expected_token
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn read_request(
    State(state): State<ConsentApiState>,
    headers: HeaderMap,
) -> Response {
    if !check_auth(&headers, &state.token) {
        warn!("Consent endpoint authentication failed");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.bridge.read_request().await {
        Ok(Some(request)) => Json::<ConsentRequest>(request).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Failed to read consent request: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn write_decision(
    State(state): State<ConsentApiState>,
    headers: HeaderMap,
    Json(decision): Json<ConsentDecision>,
) -> StatusCode {
    if !check_auth(&headers, &state.token) {
        warn!("Consent endpoint authentication failed");
        return StatusCode::UNAUTHORIZED;
    }
    if let Err(e) = decision.validate() {
        warn!("Rejecting consent decision: {}", e);
        return StatusCode::BAD_REQUEST;
    }
    match state.bridge.submit_decision(&decision).await {
        Ok(()) => {
            info!(
                session = %decision.session_id.short(),
                approved = decision.approved,
                "consent decision recorded"
            );
            StatusCode::ACCEPTED
        }
        Err(e) => {
            error!("Failed to record consent decision: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_rejects_non_loopback() {
        let err = bind("0.0.0.0:0".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, ConsentApiError::NotLoopback(_)));
    }

    #[tokio::test]
    async fn test_generated_token_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let token = resolve_token(None, dir.path()).await.unwrap();
        assert_eq!(token.len(), 64);
        let on_disk = std::fs::read_to_string(dir.path().join(TOKEN_FILE)).unwrap();
        assert_eq!(on_disk, token);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join(TOKEN_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_token_replaces_planted_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let target = elsewhere.path().join("victim");
        std::fs::write(&target, "untouched").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join(TOKEN_FILE)).unwrap();

        let token = resolve_token(None, dir.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "untouched");
        let meta = std::fs::symlink_metadata(dir.path().join(TOKEN_FILE)).unwrap();
        assert!(meta.file_type().is_file());
        assert_eq!(std::fs::read_to_string(dir.path().join(TOKEN_FILE)).unwrap(), token);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_token_refuses_shared_dir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777)).unwrap();
        let err = resolve_token(None, dir.path()).await.unwrap_err();
        assert!(matches!(err, ConsentApiError::Bridge(BridgeError::InsecureDir { .. })));
        assert!(!dir.path().join(TOKEN_FILE).exists());
    }

    #[tokio::test]
    async fn test_configured_token_wins() {
        let dir = tempfile::tempdir().unwrap();
        let token = resolve_token(Some("fixed"), dir.path()).await.unwrap();
        assert_eq!(token, "fixed");
        assert!(!dir.path().join(TOKEN_FILE).exists());
    }
}
