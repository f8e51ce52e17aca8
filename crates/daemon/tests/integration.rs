//! Daemon API tests driven through the router

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use urpm_daemon::{server, DaemonState};
use urpm_engine::Engine;
use urpm_rpm::MockRpm;
use urpm_store::{Catalog, NewMedia};

async fn test_state() -> (tempfile::TempDir, Arc<DaemonState>) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(&dir.path().join("packages.db")).await.unwrap();
    catalog
        .add_media(&NewMedia {
            name: "Core Release".into(),
            short_id: "core_release".into(),
            update: false,
            priority: 50,
            relative_path: "media/core/release".into(),
            sync_files: true,
        })
        .await
        .unwrap();

    let mut config = urpm_config::Config::default();
    config.general.development = true;

    let (tx, _rx) = urpm_events::channel();
    let engine = Arc::new(Engine {
        catalog: catalog.clone(),
        net: urpm_net::NetClient::with_defaults().unwrap(),
        selector: Arc::new(urpm_net::MirrorSelector::new()),
        rpm: Arc::new(MockRpm::new()),
        cache_dir: dir.path().join("cache"),
        lock_path: dir.path().join("urpm.lock"),
        config: config.clone(),
        tx,
        cancel: Arc::new(std::sync::atomic::AtomicBool::new(false)),
    });

    let state = DaemonState::new(catalog, engine, config).await.unwrap();
    (dir, state)
}

fn request(method: &str, path: &str, body: Option<serde_json::Value>, from: [u8; 4]) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    let mut request = builder.body(body).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((from, 45678))));
    request
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ping_and_root() {
    let (_dir, state) = test_state().await;
    let app = server::router(Arc::clone(&state));

    let response = app
        .clone()
        .oneshot(request("GET", "/api/ping", None, [127, 0, 0, 1]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["pong"], true);

    let response = app
        .oneshot(request("GET", "/", None, [127, 0, 0, 1]))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["service"], "urpmd");
    assert_eq!(body["development"], true);
}

#[tokio::test]
async fn media_listing() {
    let (_dir, state) = test_state().await;
    let app = server::router(state);

    let response = app
        .oneshot(request("GET", "/api/media", None, [127, 0, 0, 1]))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["media"][0]["name"], "Core Release");
}

#[tokio::test]
async fn announce_upserts_peer_and_filters_mode() {
    let (_dir, state) = test_state().await;
    let app = server::router(Arc::clone(&state));

    // Mode mismatch (we are development): ignored
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/announce",
            Some(serde_json::json!({
                "machine_id": "prod-peer",
                "http_port": 9876,
                "release": "10",
                "arch": "x86_64",
                "served_media": [],
                "development_mode": false,
            })),
            [192, 168, 1, 50],
        ))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["ok"], false);

    // Matching mode: stored with the caller's source address
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/announce",
            Some(serde_json::json!({
                "machine_id": "dev-peer",
                "http_port": 9877,
                "release": "10",
                "arch": "x86_64",
                "served_media": ["core_release"],
                "development_mode": true,
            })),
            [192, 168, 1, 51],
        ))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["ok"], true);

    let peers = state.catalog.list_peers().await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].machine_id, "dev-peer");
    assert_eq!(peers[0].host, "192.168.1.51");
}

#[tokio::test]
async fn have_reports_cached_artifacts_only() {
    let (_dir, state) = test_state().await;

    // Seed one artifact into the shared cache
    let dir = state.engine.cache_dir.join("core_release");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("jq-1.7-1.x86_64.rpm"), b"rpm")
        .await
        .unwrap();

    let app = server::router(state);
    let response = app
        .oneshot(request(
            "POST",
            "/api/have",
            Some(serde_json::json!({
                "files": ["jq-1.7-1.x86_64.rpm", "missing-1-1.noarch.rpm", "../etc/passwd"],
            })),
            [192, 168, 1, 51],
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["have"], serde_json::json!(["jq-1.7-1.x86_64.rpm"]));
}

#[tokio::test]
async fn refresh_requires_loopback() {
    let (_dir, state) = test_state().await;
    let app = server::router(state);

    let response = app
        .oneshot(request(
            "POST",
            "/api/refresh",
            Some(serde_json::json!({ "media": "Core Release" })),
            [192, 168, 1, 51],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn available_search() {
    let (_dir, state) = test_state().await;
    let media = state.catalog.media_by_name("Core Release").await.unwrap();
    state
        .catalog
        .synthesis_import(media.id)
        .run(b"@summary@A JSON processor\n@info@jq-1.7-1.x86_64@0@500000@Development/Tools\n")
        .await
        .unwrap();

    let app = server::router(state);
    let response = app
        .oneshot(request(
            "GET",
            "/api/available?pattern=json",
            None,
            [127, 0, 0, 1],
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["packages"][0]["nevra"], "jq-1.7-1.x86_64");
}
