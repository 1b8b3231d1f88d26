//! End-to-end backup runs against an in-process fake InfluxDB.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Local;
use futures_util::stream::{self, StreamExt};
use influx_backup::backup::BackupExecutor;
use influx_backup::watermark::WATERMARK_FILE;
use influx_backup::{BackupError, RunSettings};
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeInflux {
    measurements: Vec<String>,
    show_error: Option<String>,
    /// Answered with a 500
    failing: Option<String>,
    /// Body stream breaks after the first chunk
    broken: Option<String>,
    /// Body sends one chunk, then never finishes
    stalled: Option<String>,
    /// Notified once the stalled export has started
    stall_started: Arc<Notify>,
    requests: Vec<Recorded>,
}

#[derive(Debug, Clone)]
struct Recorded {
    db: String,
    q: String,
    auth: Option<String>,
}

type Shared = Arc<Mutex<FakeInflux>>;

const FIRST_CHUNK: &str = r#"{"results":[{"statement_id":0,"series":["#;

async fn query(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let db = params.get("db").cloned().unwrap_or_default();
    let q = params.get("q").cloned().unwrap_or_default();
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut fake = state.lock().unwrap();
    fake.requests.push(Recorded {
        db,
        q: q.clone(),
        auth,
    });

    if q == "SHOW MEASUREMENTS" {
        if let Some(err) = &fake.show_error {
            return Json(json!({"results": [{"statement_id": 0, "error": err}]})).into_response();
        }
        if fake.measurements.is_empty() {
            return Json(json!({"results": [{"statement_id": 0}]})).into_response();
        }
        let values: Vec<_> = fake.measurements.iter().map(|m| json!([m])).collect();
        return Json(json!({
            "results": [{
                "statement_id": 0,
                "series": [{"name": "measurements", "columns": ["name"], "values": values}]
            }]
        }))
        .into_response();
    }

    let name = select_target(&q);
    if fake.failing.as_deref() == Some(name.as_str()) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }

    if fake.broken.as_deref() == Some(name.as_str()) {
        let chunks = stream::iter(vec![
            Ok(FIRST_CHUNK.to_string()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
        ]);
        return Body::from_stream(chunks).into_response();
    }

    if fake.stalled.as_deref() == Some(name.as_str()) {
        fake.stall_started.notify_one();
        let chunks = stream::iter(vec![Ok::<_, io::Error>(FIRST_CHUNK.to_string())])
            .chain(stream::pending());
        return Body::from_stream(chunks).into_response();
    }

    Json(json!({
        "results": [{
            "statement_id": 0,
            "series": [{"name": name, "columns": ["time", "value"], "values": [[1, 0.5]]}]
        }]
    }))
    .into_response()
}

/// Measurement name out of `SELECT * FROM "<name>" WHERE ...`, unescaped.
fn select_target(q: &str) -> String {
    let mut name = String::new();
    let mut chars = q.chars().skip_while(|c| *c != '"').skip(1);
    while let Some(c) = chars.next() {
        match c {
            '\\' => name.extend(chars.next()),
            '"' => break,
            c => name.push(c),
        }
    }
    name
}

async fn spawn_fake(fake: FakeInflux) -> (SocketAddr, Shared) {
    let state: Shared = Arc::new(Mutex::new(fake));
    let app = Router::new()
        .route("/query", get(query))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

fn settings(addr: SocketAddr, destination: &Path) -> RunSettings {
    RunSettings {
        base_url: reqwest::Url::parse(&format!("http://{}", addr)).unwrap(),
        username: "admin".to_string(),
        password: "secret".to_string(),
        database: "telegraf".to_string(),
        destination: destination.to_path_buf(),
    }
}

fn fake_with(measurements: &[&str]) -> FakeInflux {
    FakeInflux {
        measurements: measurements.iter().map(|m| m.to_string()).collect(),
        ..FakeInflux::default()
    }
}

/// Run directories under `dest`, sorted.
fn run_dirs(dest: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dest)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn export_queries(state: &Shared) -> Vec<String> {
    state
        .lock()
        .unwrap()
        .requests
        .iter()
        .filter(|r| r.q.starts_with("SELECT"))
        .map(|r| r.q.clone())
        .collect()
}

#[tokio::test]
async fn test_incremental_run_uses_previous_watermark() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().to_path_buf();
    fs::write(dest.join(WATERMARK_FILE), "1000\n").unwrap();
    let (addr, state) = spawn_fake(fake_with(&["cpu", "mem"])).await;

    let started = Local::now();
    let report = BackupExecutor::new(settings(addr, &dest))
        .unwrap()
        .execute_at(started)
        .await
        .unwrap();

    let dirs = run_dirs(&dest);
    assert_eq!(dirs.len(), 1);
    assert_eq!(
        dirs[0].file_name().unwrap().to_string_lossy(),
        started.format("%Y_%m_%d_%H_%M_%S").to_string()
    );
    assert_eq!(report.run_dir, dirs[0]);
    assert!(dirs[0].join("cpu.json").is_file());
    assert!(dirs[0].join("mem.json").is_file());

    let cpu: serde_json::Value =
        serde_json::from_slice(&fs::read(dirs[0].join("cpu.json")).unwrap()).unwrap();
    assert_eq!(cpu["results"][0]["series"][0]["name"], "cpu");

    assert_eq!(
        export_queries(&state),
        vec![
            r#"SELECT * FROM "cpu" WHERE time > 1000s"#.to_string(),
            r#"SELECT * FROM "mem" WHERE time > 1000s"#.to_string(),
        ]
    );

    let stored: i64 = fs::read_to_string(dest.join(WATERMARK_FILE))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(stored, started.timestamp());
    assert!(stored >= 1000);
    assert_eq!(report.previous_watermark.as_secs(), 1000);
    assert_eq!(report.new_watermark.as_secs(), stored);
    assert_eq!(report.measurements.len(), 2);
}

#[tokio::test]
async fn test_first_run_creates_destination_and_backs_up_everything() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("backups");
    let (addr, state) = spawn_fake(fake_with(&["cpu"])).await;

    let report = BackupExecutor::new(settings(addr, &dest))
        .unwrap()
        .execute()
        .await
        .unwrap();

    assert!(dest.is_dir());
    assert!(report.run_dir.join("cpu.json").is_file());
    assert_eq!(report.previous_watermark.as_secs(), 0);
    assert_eq!(
        export_queries(&state),
        vec![r#"SELECT * FROM "cpu" WHERE time > 0s"#.to_string()]
    );
    assert_eq!(
        fs::read_to_string(dest.join(WATERMARK_FILE)).unwrap(),
        format!("{}\n", report.new_watermark)
    );
}

#[tokio::test]
async fn test_failed_export_rolls_back_run_dir() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().to_path_buf();
    fs::write(dest.join(WATERMARK_FILE), "1000\n").unwrap();
    let mut fake = fake_with(&["cpu", "mem", "disk"]);
    fake.failing = Some("mem".to_string());
    let (addr, state) = spawn_fake(fake).await;

    let result = BackupExecutor::new(settings(addr, &dest))
        .unwrap()
        .execute()
        .await;

    match result {
        Err(BackupError::Export { measurement, .. }) => assert_eq!(measurement, "mem"),
        other => panic!("expected export error, got {:?}", other),
    }
    assert!(run_dirs(&dest).is_empty());
    assert_eq!(
        fs::read_to_string(dest.join(WATERMARK_FILE)).unwrap(),
        "1000\n"
    );
    // fail fast: the third measurement is never requested
    assert_eq!(export_queries(&state).len(), 2);
}

#[tokio::test]
async fn test_failed_first_run_removes_destination() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("backups");
    let mut fake = fake_with(&["cpu", "mem", "disk"]);
    fake.failing = Some("disk".to_string());
    let (addr, _state) = spawn_fake(fake).await;

    let result = BackupExecutor::new(settings(addr, &dest))
        .unwrap()
        .execute()
        .await;

    assert!(matches!(result, Err(BackupError::Export { .. })));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_failed_first_run_in_existing_dir_keeps_other_files() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().to_path_buf();
    fs::write(dest.join("README"), "operator notes").unwrap();
    let mut fake = fake_with(&["cpu"]);
    fake.failing = Some("cpu".to_string());
    let (addr, _state) = spawn_fake(fake).await;

    let result = BackupExecutor::new(settings(addr, &dest))
        .unwrap()
        .execute()
        .await;

    assert!(result.is_err());
    assert!(dest.join("README").is_file());
    assert!(!dest.join(WATERMARK_FILE).exists());
    assert!(run_dirs(&dest).is_empty());
}

#[tokio::test]
async fn test_measurement_listing_error_aborts_run() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().to_path_buf();
    fs::write(dest.join(WATERMARK_FILE), "42\n").unwrap();
    let fake = FakeInflux {
        show_error: Some("database not found: telegraf".to_string()),
        ..FakeInflux::default()
    };
    let (addr, _state) = spawn_fake(fake).await;

    let result = BackupExecutor::new(settings(addr, &dest))
        .unwrap()
        .execute()
        .await;

    match result {
        Err(BackupError::Query(msg)) => assert!(msg.contains("database not found")),
        other => panic!("expected query error, got {:?}", other),
    }
    assert!(run_dirs(&dest).is_empty());
    assert_eq!(fs::read_to_string(dest.join(WATERMARK_FILE)).unwrap(), "42\n");
}

#[tokio::test]
async fn test_corrupt_watermark_stops_before_any_request() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().to_path_buf();
    fs::write(dest.join(WATERMARK_FILE), "abc").unwrap();
    let (addr, state) = spawn_fake(fake_with(&["cpu"])).await;

    let result = BackupExecutor::new(settings(addr, &dest))
        .unwrap()
        .execute()
        .await;

    assert!(matches!(result, Err(BackupError::CorruptWatermark { .. })));
    assert_eq!(fs::read_to_string(dest.join(WATERMARK_FILE)).unwrap(), "abc");
    assert!(run_dirs(&dest).is_empty());
    assert!(state.lock().unwrap().requests.is_empty());
}

#[tokio::test]
async fn test_requests_carry_credentials_and_database() {
    let temp_dir = TempDir::new().unwrap();
    let (addr, state) = spawn_fake(fake_with(&["cpu"])).await;

    BackupExecutor::new(settings(addr, temp_dir.path()))
        .unwrap()
        .execute()
        .await
        .unwrap();

    let requests = state.lock().unwrap().requests.clone();
    assert_eq!(requests.len(), 2);
    for request in requests {
        assert_eq!(request.db, "telegraf");
        // base64("admin:secret")
        assert_eq!(request.auth.as_deref(), Some("Basic YWRtaW46c2VjcmV0"));
    }
}

#[tokio::test]
async fn test_empty_database_commits_empty_run() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().to_path_buf();
    fs::write(dest.join(WATERMARK_FILE), "1000\n").unwrap();
    let (addr, _state) = spawn_fake(FakeInflux::default()).await;

    let report = BackupExecutor::new(settings(addr, &dest))
        .unwrap()
        .execute()
        .await
        .unwrap();

    assert!(report.measurements.is_empty());
    assert!(report.run_dir.is_dir());
    assert!(report.new_watermark.as_secs() >= 1000);
}

/// Export files in `dir`, sorted.
fn export_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn test_similar_measurement_names_get_separate_files() {
    let temp_dir = TempDir::new().unwrap();
    let (addr, _state) = spawn_fake(fake_with(&["a/b", "a_b", "a%2Fb"])).await;

    let report = BackupExecutor::new(settings(addr, temp_dir.path()))
        .unwrap()
        .execute()
        .await
        .unwrap();

    let files = export_files(&report.run_dir);
    assert_eq!(files, vec!["a%252Fb.json", "a%2Fb.json", "a_b.json"]);
    assert_eq!(files.len(), report.measurements.len());

    let slash: serde_json::Value =
        serde_json::from_slice(&fs::read(report.run_dir.join("a%2Fb.json")).unwrap()).unwrap();
    assert_eq!(slash["results"][0]["series"][0]["name"], "a/b");
    let underscore: serde_json::Value =
        serde_json::from_slice(&fs::read(report.run_dir.join("a_b.json")).unwrap()).unwrap();
    assert_eq!(underscore["results"][0]["series"][0]["name"], "a_b");
}

#[tokio::test]
async fn test_duplicate_measurement_rolls_back_instead_of_overwriting() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().to_path_buf();
    fs::write(dest.join(WATERMARK_FILE), "1000\n").unwrap();
    let (addr, _state) = spawn_fake(fake_with(&["cpu", "cpu"])).await;

    let result = BackupExecutor::new(settings(addr, &dest))
        .unwrap()
        .execute()
        .await;

    match result {
        Err(BackupError::Export { measurement, .. }) => assert_eq!(measurement, "cpu"),
        other => panic!("expected export error, got {:?}", other),
    }
    assert!(run_dirs(&dest).is_empty());
    assert_eq!(
        fs::read_to_string(dest.join(WATERMARK_FILE)).unwrap(),
        "1000\n"
    );
}

#[tokio::test]
async fn test_body_broken_mid_transfer_rolls_back() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().to_path_buf();
    fs::write(dest.join(WATERMARK_FILE), "1000\n").unwrap();
    let mut fake = fake_with(&["cpu", "mem", "disk"]);
    fake.broken = Some("mem".to_string());
    let (addr, state) = spawn_fake(fake).await;

    let result = BackupExecutor::new(settings(addr, &dest))
        .unwrap()
        .execute()
        .await;

    match result {
        Err(BackupError::Export { measurement, .. }) => assert_eq!(measurement, "mem"),
        other => panic!("expected export error, got {:?}", other),
    }
    assert!(run_dirs(&dest).is_empty());
    assert_eq!(
        fs::read_to_string(dest.join(WATERMARK_FILE)).unwrap(),
        "1000\n"
    );
    assert_eq!(export_queries(&state).len(), 2);
}

#[tokio::test]
async fn test_cancel_during_export_rolls_back() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().to_path_buf();
    fs::write(dest.join(WATERMARK_FILE), "1000\n").unwrap();
    let mut fake = fake_with(&["cpu", "mem", "disk"]);
    fake.stalled = Some("mem".to_string());
    let stall_started = fake.stall_started.clone();
    let (addr, state) = spawn_fake(fake).await;

    let cancel = CancellationToken::new();
    let executor = BackupExecutor::with_cancel(settings(addr, &dest), cancel.clone()).unwrap();

    let (result, completed_before_cancel) = tokio::join!(executor.execute(), async {
        stall_started.notified().await;
        // cpu.json is written by now and mem.json is in flight
        let dirs = run_dirs(&dest);
        let completed = dirs
            .first()
            .map(|dir| dir.join("cpu.json").is_file())
            .unwrap_or(false);
        cancel.cancel();
        completed
    });

    assert!(completed_before_cancel);
    assert!(matches!(result, Err(BackupError::Cancelled)));
    assert!(run_dirs(&dest).is_empty());
    assert_eq!(
        fs::read_to_string(dest.join(WATERMARK_FILE)).unwrap(),
        "1000\n"
    );
    assert_eq!(export_queries(&state).len(), 2);
}
