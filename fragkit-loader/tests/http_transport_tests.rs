//! End-to-end tests for HttpTransport against an in-process axum server
//!
//! The server mimics a fragment endpoint: `GET /fragments/<ids>/?<query>`
//! answers with the framed record stream for the comma-separated ids.

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use fragkit_common::config::{FailurePolicy, LoaderConfig, LoggingConfig};
use fragkit_common::framing::{encode_records, FragmentRecord};
use fragkit_common::Error as CommonError;
use fragkit_loader::{
    BatchRequest, FragmentLoader, FragmentTransport, HttpTransport, LoaderError, MemoryHost,
    TransportError,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct ServerState {
    /// (ids path segment, raw query) per request
    seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

async fn fragments(
    State(state): State<ServerState>,
    Path(ids): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    state.seen.lock().unwrap().push((ids.clone(), query));

    if ids.split(',').any(|id| id == "500") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "server exploded").into_response();
    }

    let records: Vec<FragmentRecord> = ids
        .split(',')
        .map(|id| FragmentRecord::new(id, format!("<div id=\"c{}\">\nfragment {}\n</div>", id, id)))
        .collect();
    encode_records(&records).unwrap().into_response()
}

/// Start the fake endpoint on an ephemeral port
async fn start_server() -> (SocketAddr, ServerState) {
    let state = ServerState::default();
    let app = Router::new()
        .route("/fragments/:ids/", get(fragments))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

fn config_for(addr: SocketAddr) -> LoaderConfig {
    LoaderConfig {
        base_url: format!("http://{}/fragments/", addr),
        lines_of_context: Some("5".to_string()),
        cache_token: Some("tok42".to_string()),
        request_timeout_secs: 5,
        user_agent: "fragkit-test".to_string(),
        failure_policy: FailurePolicy::Continue,
        logging: LoggingConfig::default(),
    }
}

#[tokio::test]
async fn test_loader_over_http() {
    let (addr, server) = start_server().await;
    let host = Arc::new(MemoryHost::new());
    host.add_container("12");
    host.add_container("13");

    let loader = FragmentLoader::from_config(host.clone(), &config_for(addr)).unwrap();
    loader.enqueue("12", "file7", None).unwrap();
    loader.enqueue("13", "file7", None).unwrap();

    let results = loader.flush().wait().await;
    let outcome = results[0].as_ref().unwrap();
    assert_eq!(outcome.rendered, vec!["12".to_string(), "13".to_string()]);

    assert_eq!(
        host.markup_for("12").as_deref(),
        Some("<div id=\"c12\">\nfragment 12\n</div>")
    );

    let seen = server.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "12,13");
    assert_eq!(
        seen[0].1.as_deref(),
        Some("lines_of_context=5&allow_expansion=1&tok42")
    );
}

#[tokio::test]
async fn test_http_error_status_is_reported() {
    let (addr, _server) = start_server().await;
    let transport = HttpTransport::new(config_for(addr)).unwrap();

    let request = BatchRequest {
        batch_key: "file7".to_string(),
        item_ids: vec!["500".to_string()],
    };
    match transport.fetch(&request).await {
        Err(TransportError::Status(code, body)) => {
            assert_eq!(code, 500);
            assert_eq!(body, "server exploded");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_refused_fails_batch() {
    // Reserve a port, then free it so nothing is listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let host = Arc::new(MemoryHost::new());
    host.add_container("12");
    let loader = FragmentLoader::from_config(host.clone(), &config_for(addr)).unwrap();

    loader.enqueue("12", "file7", None).unwrap();
    let results = loader.flush().wait().await;

    assert!(matches!(
        &results[0],
        Err(LoaderError::Transport {
            source: TransportError::Network(_),
            ..
        })
    ));
    assert_eq!(host.markup_for("12"), None);
    assert_eq!(loader.stats().failed_batches, 1);
}

#[tokio::test]
async fn test_from_config_rejects_bad_base_url() {
    let host = Arc::new(MemoryHost::new());
    let mut config = config_for("127.0.0.1:9".parse().unwrap());
    config.base_url = "ftp://127.0.0.1:9/fragments/".to_string();

    assert!(matches!(
        FragmentLoader::from_config(host, &config),
        Err(LoaderError::Common(CommonError::Config(_)))
    ));
}

#[tokio::test]
async fn test_from_config_adds_trailing_slash() {
    let (addr, server) = start_server().await;
    let host = Arc::new(MemoryHost::new());
    host.add_container("12");

    let mut config = config_for(addr);
    config.base_url = format!("http://{}/fragments", addr);
    let loader = FragmentLoader::from_config(host.clone(), &config).unwrap();

    loader.enqueue("12", "file7", None).unwrap();
    let results = loader.flush().wait().await;
    assert!(results[0].is_ok());
    assert_eq!(server.seen.lock().unwrap()[0].0, "12");
}
