//! AuditClient against an in-process axum server. No external backend.

use audit_client::{AuditClient, AuditError, AuditFiles, UploadFiles};
use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn ndjson_audit(Json(body): Json<Value>) -> Response {
    let sales = body
        .get("sales")
        .and_then(Value::as_str)
        .unwrap_or("default.csv")
        .to_string();
    let stream = async_stream::stream! {
        yield Ok::<_, std::io::Error>(format!("{{\"type\":\"log\",\"message\":\"scanning {sales}\"}}\n"));
        yield Ok("{\"type\":\"result\",\"da".to_string());
        yield Ok("ta\":[{\"signal_id\":\"SIG-1\"}]}\n".to_string());
    };
    Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn collect(client: &AuditClient, files: &AuditFiles) -> String {
    let mut chunks = client.start_audit(files).await.unwrap();
    let mut body = Vec::new();
    while let Some(chunk) = chunks.next().await {
        body.extend(chunk.unwrap());
    }
    String::from_utf8(body).unwrap()
}

#[tokio::test]
async fn start_audit_streams_the_whole_body() {
    let base = serve(Router::new().route("/api/audit", post(ndjson_audit))).await;
    let client = AuditClient::new(format!("{base}/"));

    let body = collect(&client, &AuditFiles::default()).await;

    assert_eq!(
        body,
        "{\"type\":\"log\",\"message\":\"scanning default.csv\"}\n\
         {\"type\":\"result\",\"data\":[{\"signal_id\":\"SIG-1\"}]}\n"
    );
}

#[tokio::test]
async fn start_audit_sends_filename_overrides() {
    let base = serve(Router::new().route("/api/audit", post(ndjson_audit))).await;
    let client = AuditClient::new(base);

    let files = AuditFiles {
        sales: Some("q3.csv".to_string()),
        ..Default::default()
    };
    let body = collect(&client, &files).await;

    assert!(body.starts_with("{\"type\":\"log\",\"message\":\"scanning q3.csv\"}"));
}

#[tokio::test]
async fn start_audit_non_success_is_api_error() {
    let app = Router::new().route(
        "/api/audit",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "graph exploded").into_response() }),
    );
    let base = serve(app).await;

    let err = AuditClient::new(base)
        .start_audit(&AuditFiles::default())
        .await
        .err()
        .unwrap();

    match err {
        AuditError::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "graph exploded");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_signals_returns_raw_records() {
    let app = Router::new().route(
        "/api/signals",
        get(|| async {
            Json(json!({
                "status": "success",
                "count": 2,
                "signals": [{"signal_id": "SIG-1"}, {"title": "no id"}]
            }))
        }),
    );
    let base = serve(app).await;

    let catalog = AuditClient::new(base).fetch_signals().await.unwrap();

    assert_eq!(catalog.count, Some(2));
    assert_eq!(catalog.signals.len(), 2);
}

#[tokio::test]
async fn fetch_signals_error_status_is_backend_error() {
    let app = Router::new().route(
        "/api/signals",
        get(|| async { Json(json!({"status": "error", "message": "disk full", "signals": []})) }),
    );
    let base = serve(app).await;

    let err = AuditClient::new(base).fetch_signals().await.unwrap_err();

    assert!(matches!(err, AuditError::Backend(ref m) if m == "disk full"));
}

#[tokio::test]
async fn connection_refused_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = AuditClient::new(format!("http://{addr}"))
        .fetch_signals()
        .await
        .unwrap_err();

    assert!(matches!(err, AuditError::Network(_)));
}

fn write_inputs(tag: &str) -> UploadFiles {
    let dir = std::env::temp_dir().join(format!("audit-client-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let sales = dir.join("sales.csv");
    let context = dir.join("context.txt");
    let backlog = dir.join("backlog.json");
    std::fs::write(&sales, "region,revenue\nAPAC,100\n").unwrap();
    std::fs::write(&context, "Zenith Labs acquisition").unwrap();
    std::fs::write(&backlog, "[]").unwrap();
    UploadFiles {
        sales,
        context,
        backlog,
    }
}

#[tokio::test]
async fn upload_returns_stored_filenames() {
    let app = Router::new().route(
        "/api/upload",
        post(|| async {
            Json(json!({
                "status": "success",
                "filenames": {"sales": "sales.csv", "context": "context.txt", "backlog": "backlog.json"}
            }))
        }),
    );
    let base = serve(app).await;

    let filenames = AuditClient::new(base)
        .upload(&write_inputs("ok"))
        .await
        .unwrap();

    assert_eq!(filenames.sales.as_deref(), Some("sales.csv"));
    assert_eq!(filenames.backlog.as_deref(), Some("backlog.json"));
}

#[tokio::test]
async fn upload_error_body_is_backend_error() {
    let app = Router::new().route(
        "/api/upload",
        post(|| async { Json(json!({"error": "read-only volume"})) }),
    );
    let base = serve(app).await;

    let err = AuditClient::new(base)
        .upload(&write_inputs("err"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuditError::Backend(ref m) if m == "read-only volume"));
}

#[tokio::test]
async fn upload_missing_file_is_file_error() {
    let client = AuditClient::new("http://127.0.0.1:9");
    let mut files = write_inputs("missing");
    files.context = files.context.with_file_name("does-not-exist.txt");

    let err = client.upload(&files).await.unwrap_err();

    assert!(matches!(err, AuditError::File { .. }));
}
