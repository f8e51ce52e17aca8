//! HTTP API
//!
//! Read endpoints are open; refresh is loopback-only; the peer
//! endpoints (announce, have, request-download) are open to the LAN but
//! gated by the peer blacklist and development-mode matching.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use urpm_errors::{Error, UserFacingError};
use urpm_net::{HaveRequest, HaveResponse};
use urpm_types::{Announcement, PeerInfo};

use crate::state::DaemonState;

/// Build the router with every API route
pub fn router(state: Arc<DaemonState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/ping", get(ping))
        .route("/api/status", get(status))
        .route("/api/media", get(media))
        .route("/api/available", get(available).post(available_query))
        .route("/api/updates", get(updates))
        .route("/api/peers", get(peers))
        .route("/api/refresh", post(refresh))
        .route("/api/announce", post(announce))
        .route("/api/have", post(have))
        .route("/api/request-download", post(request_download))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the task is aborted.
///
/// # Errors
///
/// Returns `DaemonError::BindFailed` when the port is taken.
pub async fn serve(state: Arc<DaemonState>) -> Result<(), Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.api_port()));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        urpm_errors::DaemonError::BindFailed {
            addr: addr.to_string(),
            message: e.to_string(),
        }
    })?;
    info!(%addr, "API listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| Error::internal(format!("API server exited: {e}")))
}

struct ApiError(Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Daemon(urpm_errors::DaemonError::Unauthorized(_)) => StatusCode::FORBIDDEN,
            Error::Daemon(urpm_errors::DaemonError::BadRequest(_)) => StatusCode::BAD_REQUEST,
            Error::State(urpm_errors::StateError::MediaNotFound { .. })
            | Error::State(urpm_errors::StateError::PackageNotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.0.user_message(),
            "code": self.0.user_code(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

async fn root(State(state): State<Arc<DaemonState>>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "urpmd",
        "version": env!("CARGO_PKG_VERSION"),
        "machine_id": state.machine_id,
        "development": state.config.general.development,
    }))
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "pong": true }))
}

async fn status(
    State(state): State<Arc<DaemonState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let peers = state.catalog.list_peers().await?;
    let media = state.catalog.list_media().await?;
    Ok(Json(json!({
        "machine_id": state.machine_id,
        "release": state.release,
        "uptime_secs": chrono::Utc::now().timestamp() - state.started_at,
        "development": state.config.general.development,
        "media_count": media.len(),
        "peer_count": peers.len(),
    })))
}

async fn media(
    State(state): State<Arc<DaemonState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let media = state.catalog.list_media().await?;
    Ok(Json(json!({ "media": media })))
}

#[derive(Debug, Deserialize)]
struct AvailableParams {
    pattern: Option<String>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PackageRow {
    nevra: String,
    summary: String,
    group: String,
    size: u64,
}

async fn available(
    State(state): State<Arc<DaemonState>>,
    Query(params): Query<AvailableParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    list_available(&state, params).await
}

async fn available_query(
    State(state): State<Arc<DaemonState>>,
    Json(params): Json<AvailableParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    list_available(&state, params).await
}

async fn list_available(
    state: &DaemonState,
    params: AvailableParams,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = params.limit.unwrap_or(200).clamp(1, 5000);
    let pattern = params.pattern.unwrap_or_default();
    let packages = state.catalog.search_packages(&pattern).await?;
    let rows: Vec<PackageRow> = packages
        .into_iter()
        .take(usize::try_from(limit).unwrap_or(200))
        .map(|p| PackageRow {
            nevra: p.meta.nevra.to_string(),
            summary: p.meta.summary,
            group: p.meta.group,
            size: p.meta.size,
        })
        .collect();
    Ok(Json(json!({ "packages": rows })))
}

async fn updates(
    State(state): State<Arc<DaemonState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Catalog-side only: the daemon never opens the RPM database for
    // write, and a read failure degrades to an empty installed set
    let installed = urpm_rpm::query_installed(state.config.general.root.as_deref())
        .await
        .unwrap_or_default();
    let holds: std::collections::HashSet<String> = state
        .catalog
        .holds()
        .await?
        .into_iter()
        .map(|(n, _)| n)
        .collect();

    let mut rows = Vec::new();
    for pkg in installed {
        if holds.contains(&pkg.nevra.name) {
            continue;
        }
        let candidates = state.catalog.packages_by_name(&pkg.nevra.name).await?;
        if let Some(best) = candidates.first() {
            if best.meta.nevra.evr() > pkg.nevra.evr() {
                rows.push(json!({
                    "name": pkg.nevra.name,
                    "installed": pkg.nevra.to_string(),
                    "available": best.meta.nevra.to_string(),
                }));
            }
        }
    }
    Ok(Json(json!({ "updates": rows })))
}

async fn peers(
    State(state): State<Arc<DaemonState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let peers = state.catalog.list_peers().await?;
    Ok(Json(json!({ "peers": peers })))
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    media: Option<String>,
}

async fn refresh(
    State(state): State<Arc<DaemonState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(params): Json<RefreshParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Local trust: metadata refresh is operator-initiated
    if !addr.ip().is_loopback() {
        return Err(ApiError(
            urpm_errors::DaemonError::Unauthorized(format!("refresh from {addr}")).into(),
        ));
    }

    let sync = state.engine.media_sync();
    match params.media {
        Some(name) => {
            let outcome = sync.refresh(&name).await?;
            Ok(Json(json!({
                "refreshed": name,
                "inserted": outcome.packages_inserted,
                "deleted": outcome.packages_deleted,
            })))
        }
        None => {
            let outcomes = sync.refresh_all().await?;
            Ok(Json(json!({
                "refreshed": outcomes.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>(),
            })))
        }
    }
}

async fn announce(
    State(state): State<Arc<DaemonState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(announcement): Json<Announcement>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if announcement.machine_id == state.machine_id {
        return Ok(Json(json!({ "ok": true, "own": true })));
    }
    // Development-mode peers only see development-mode peers
    if announcement.development_mode != state.config.general.development {
        return Ok(Json(json!({ "ok": false, "reason": "mode mismatch" })));
    }

    let peer = PeerInfo {
        host: addr.ip().to_string(),
        port: announcement.http_port,
        machine_id: announcement.machine_id.clone(),
        release: announcement.release.clone(),
        arch: announcement.arch.clone(),
        last_seen: chrono::Utc::now().timestamp(),
        blacklisted: false,
        development_mode: announcement.development_mode,
        served_media: announcement.served_media.clone(),
    };
    state.catalog.upsert_peer(&peer).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn have(
    State(state): State<Arc<DaemonState>>,
    Json(request): Json<HaveRequest>,
) -> Result<Json<HaveResponse>, ApiError> {
    if request.files.len() > 1000 {
        return Err(ApiError(
            urpm_errors::DaemonError::BadRequest("too many files in one query".into()).into(),
        ));
    }

    let cache_dir = &state.engine.cache_dir;
    let media = state.catalog.list_media().await?;

    let mut have = Vec::new();
    for file in &request.files {
        if file.contains("..") || file.contains('/') {
            continue;
        }
        for m in &media {
            if !m.shared_with_peers {
                continue;
            }
            if tokio::fs::metadata(cache_dir.join(&m.short_id).join(file))
                .await
                .is_ok()
            {
                have.push(file.clone());
                break;
            }
        }
    }
    Ok(Json(HaveResponse { have }))
}

async fn request_download(
    State(state): State<Arc<DaemonState>>,
    Json(request): Json<HaveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut scheduled = 0;
    for file in &request.files {
        let Some(nevra) = file.strip_suffix(".rpm") else {
            continue;
        };
        let Ok(found) = state.catalog.package_by_nevra(nevra).await else {
            continue;
        };

        let media = state.catalog.list_media().await?;
        let Some(short_id) = media
            .iter()
            .find(|m| m.id == found.media_id)
            .map(|m| m.short_id.clone())
        else {
            continue;
        };

        let acquirer = state.engine.acquirer();
        let item = urpm_resolver_item(&found);
        scheduled += 1;
        tokio::spawn(async move {
            if let Err(e) = acquirer.acquire_all(&[(item, short_id)]).await {
                warn!(error = %e, "peer-requested pre-download failed");
            }
        });
    }
    Ok(Json(json!({ "scheduled": scheduled })))
}

fn urpm_resolver_item(found: &urpm_store::CatalogPackage) -> urpm_resolver::TransactionItem {
    urpm_resolver::TransactionItem {
        nevra: found.meta.nevra.clone(),
        media_id: Some(found.media_id),
        digest: found.meta.digest.clone(),
        file_size: found.meta.file_size,
    }
}
