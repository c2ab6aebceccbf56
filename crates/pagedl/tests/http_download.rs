use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use pagedl_engine::{DownloadConfig, DownloadEngine, DownloadOutcome};
use tempfile::TempDir;

const BODY_LEN: usize = 256 * 1024 + 17;

#[derive(Clone)]
struct Media {
    body: Arc<Vec<u8>>,
    requests: Arc<AtomicUsize>,
}

fn body() -> Vec<u8> {
    (0..BODY_LEN).map(|i| (i % 251) as u8).collect()
}

fn parse_range(headers: &HeaderMap, len: usize) -> Option<(usize, usize)> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end = match end {
        "" => len - 1,
        end => end.parse::<usize>().ok()?.min(len - 1),
    };
    (start <= end).then_some((start, end))
}

async fn ranged(State(media): State<Media>, headers: HeaderMap) -> Response {
    media.requests.fetch_add(1, Ordering::SeqCst);
    let len = media.body.len();
    match parse_range(&headers, len) {
        Some((start, end)) => {
            let mut response =
                (StatusCode::PARTIAL_CONTENT, media.body[start..=end].to_vec()).into_response();
            let range = format!("bytes {start}-{end}/{len}");
            response
                .headers_mut()
                .insert(header::CONTENT_RANGE, HeaderValue::from_str(&range).unwrap());
            response
        }
        None => media.body.to_vec().into_response(),
    }
}

async fn whole(State(media): State<Media>) -> Response {
    media.requests.fetch_add(1, Ordering::SeqCst);
    media.body.to_vec().into_response()
}

/// Honours the first range without a total, then streams chunks with no length.
async fn unknown_length(State(media): State<Media>, headers: HeaderMap) -> Response {
    media.requests.fetch_add(1, Ordering::SeqCst);
    if headers.contains_key(header::RANGE) {
        let mut response = (StatusCode::PARTIAL_CONTENT, media.body[..1].to_vec()).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_RANGE, HeaderValue::from_static("bytes 0-0/*"));
        return response;
    }
    let chunks: Vec<Result<Bytes, std::io::Error>> = media
        .body
        .chunks(16 * 1024)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Body::from_stream(futures::stream::iter(chunks)).into_response()
}

/// Reports a length for `bytes=0-0` but answers every other range in full.
async fn ignores_ranges(State(media): State<Media>, headers: HeaderMap) -> Response {
    media.requests.fetch_add(1, Ordering::SeqCst);
    let len = media.body.len();
    let first_byte = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "bytes=0-0");
    if first_byte {
        let mut response = (StatusCode::PARTIAL_CONTENT, media.body[..1].to_vec()).into_response();
        let range = format!("bytes 0-0/{len}");
        response
            .headers_mut()
            .insert(header::CONTENT_RANGE, HeaderValue::from_str(&range).unwrap());
        return response;
    }
    media.body.to_vec().into_response()
}

async fn serve() -> (SocketAddr, Media) {
    let media = Media {
        body: Arc::new(body()),
        requests: Arc::new(AtomicUsize::new(0)),
    };
    let app = Router::new()
        .route("/ranged.m4s", get(ranged))
        .route("/whole.m4s", get(whole))
        .route("/unknown-length.m4s", get(unknown_length))
        .route("/ignores-ranges.m4s", get(ignores_ranges))
        .with_state(media.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, media)
}

fn engine(concurrency: usize) -> DownloadEngine {
    DownloadEngine::new(Arc::new(DownloadConfig {
        concurrency,
        show_progress: false,
        ..Default::default()
    }))
    .unwrap()
}

#[tokio::test]
async fn ranged_download_reassembles_the_body() {
    let (addr, media) = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("nested").join("video.m4s");

    let outcome = engine(4)
        .download(&format!("http://{addr}/ranged.m4s"), &dest)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        DownloadOutcome::Downloaded {
            bytes: BODY_LEN as u64
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), *media.body);
    // One probe plus one request per range.
    assert_eq!(media.requests.load(Ordering::SeqCst), 5);
    assert!(!dir.path().join("nested").join("video.m4s.part").exists());
}

#[tokio::test]
async fn server_without_ranges_is_read_sequentially() {
    let (addr, media) = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("audio.m4s");

    engine(8)
        .download(&format!("http://{addr}/whole.m4s"), &dest)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), *media.body);
    assert_eq!(media.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn existing_file_issues_no_request() {
    let (addr, media) = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("video.m4s");
    std::fs::write(&dest, b"already here").unwrap();

    let outcome = engine(4)
        .download(&format!("http://{addr}/ranged.m4s"), &dest)
        .await
        .unwrap();

    assert_eq!(outcome, DownloadOutcome::Skipped);
    assert_eq!(media.requests.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read(&dest).unwrap(), b"already here");
}

#[tokio::test]
async fn missing_resource_is_a_transport_error() {
    let (addr, _media) = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("gone.m4s");

    let err = engine(2)
        .download(&format!("http://{addr}/gone.m4s"), &dest)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("404"), "{err}");
    assert!(!dest.exists());
}

#[tokio::test]
async fn unknown_length_is_streamed_in_one_request() {
    let (addr, media) = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("video.m4s");

    let outcome = engine(4)
        .download(&format!("http://{addr}/unknown-length.m4s"), &dest)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        DownloadOutcome::Downloaded {
            bytes: BODY_LEN as u64
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), *media.body);
    // The length check, then the chunked body.
    assert_eq!(media.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ignored_ranges_fall_back_to_one_stream() {
    let (addr, media) = serve().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("video.m4s");

    let outcome = engine(4)
        .download(&format!("http://{addr}/ignores-ranges.m4s"), &dest)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        DownloadOutcome::Downloaded {
            bytes: BODY_LEN as u64
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), *media.body);
    assert!(media.requests.load(Ordering::SeqCst) >= 3);
    assert!(!dir.path().join("video.m4s.part").exists());
}
