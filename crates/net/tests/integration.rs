//! Download behavior against a minimal in-process HTTP peer
//!
//! The test server speaks just enough HTTP/1.1 to serve a payload,
//! honor Range requests, and hang up mid-body on request - which is
//! exactly what a disappearing LAN peer looks like.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use urpm_net::{file_sha256, Download, NetClient, NetConfig};

const PAYLOAD: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz0123456789abcdef";

/// One-connection-at-a-time test server. `truncate_first` makes the
/// first full-file response die after 4 bytes.
async fn spawn_server(truncate_first: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cut = Arc::new(std::sync::atomic::AtomicBool::new(truncate_first));

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let cut = Arc::clone(&cut);

            let mut buf = vec![0u8; 4096];
            let mut request = Vec::new();
            loop {
                let Ok(n) = stream.read(&mut buf).await else {
                    return;
                };
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let request = String::from_utf8_lossy(&request);

            let range_from = request.lines().find_map(|line| {
                line.strip_prefix("Range: bytes=")?
                    .split('-')
                    .next()?
                    .parse::<usize>()
                    .ok()
            });

            let response = match range_from {
                Some(from) => {
                    let body = &PAYLOAD[from..];
                    let head = format!(
                        "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
                        body.len(),
                        from,
                        PAYLOAD.len() - 1,
                        PAYLOAD.len()
                    );
                    let mut out = head.into_bytes();
                    out.extend_from_slice(body);
                    out
                }
                None => {
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        PAYLOAD.len()
                    );
                    let mut out = head.into_bytes();
                    if cut.swap(false, std::sync::atomic::Ordering::SeqCst) {
                        // Promise the full body, deliver 4 bytes, vanish
                        out.extend_from_slice(&PAYLOAD[..4]);
                    } else {
                        out.extend_from_slice(PAYLOAD);
                    }
                    out
                }
            };

            let _ = stream.write_all(&response).await;
            let _ = stream.shutdown().await;
        }
    });

    format!("http://{addr}")
}

fn quick_client() -> NetClient {
    NetClient::new(NetConfig {
        retry_count: 0,
        connect_timeout: std::time::Duration::from_secs(2),
        inactivity_timeout: std::time::Duration::from_secs(2),
        ..NetConfig::default()
    })
    .unwrap()
}

fn payload_sha256() -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(PAYLOAD);
    hex::encode(hasher.finalize())
}

#[tokio::test]
async fn plain_download_verifies_digest() {
    let base = spawn_server(false).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("x-1.rpm");
    let (tx, _rx) = urpm_events::channel();

    let result = Download::new(&format!("{base}/x-1.rpm"))
        .unwrap()
        .execute(&quick_client(), &dest, Some(&payload_sha256()), &tx)
        .await
        .unwrap();

    assert_eq!(result.size, PAYLOAD.len() as u64);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), PAYLOAD);
}

#[tokio::test]
async fn interrupted_download_resumes_by_range() {
    let base = spawn_server(true).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("x-1.rpm");
    let (tx, mut rx) = urpm_events::channel();
    let client = quick_client();

    // First attempt: the peer dies after 4 bytes
    let first = Download::new(&format!("{base}/x-1.rpm"))
        .unwrap()
        .execute(&client, &dest, Some(&payload_sha256()), &tx)
        .await;
    assert!(first.is_err());

    // The partial file survives for the resume
    let part = dest.with_extension("part");
    assert_eq!(tokio::fs::metadata(&part).await.unwrap().len(), 4);

    // Second attempt resumes from byte 4; no byte is fetched twice
    let second = Download::new(&format!("{base}/x-1.rpm"))
        .unwrap()
        .execute(&client, &dest, Some(&payload_sha256()), &tx)
        .await
        .unwrap();
    assert_eq!(second.size, PAYLOAD.len() as u64);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), PAYLOAD);

    let mut resumed_from = None;
    while let Ok(event) = rx.try_recv() {
        if let urpm_events::Event::DownloadStarted {
            resumed_from: from, ..
        } = event
        {
            resumed_from = Some(from);
        }
    }
    assert_eq!(resumed_from, Some(4));
}

#[tokio::test]
async fn digest_mismatch_removes_the_file() {
    let base = spawn_server(false).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("x-1.rpm");
    let (tx, _rx) = urpm_events::channel();

    let err = Download::new(&format!("{base}/x-1.rpm"))
        .unwrap()
        .execute(&quick_client(), &dest, Some("00ff00ff"), &tx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("digest mismatch"));
    assert!(!dest.exists());
    assert!(!dest.with_extension("part").exists());
}

#[tokio::test]
async fn sha256_helper_matches_download_digest() {
    let base = spawn_server(false).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("x-1.rpm");
    let (tx, _rx) = urpm_events::channel();

    let result = Download::new(&format!("{base}/x-1.rpm"))
        .unwrap()
        .execute(&quick_client(), &dest, None, &tx)
        .await
        .unwrap();

    assert_eq!(file_sha256(&dest).await.unwrap(), result.sha256);
    assert_eq!(result.sha256, payload_sha256());
}
