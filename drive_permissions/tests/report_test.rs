//! End-to-end report runs against a mocked Drive API.

use std::fs;
use std::time::Duration;

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use tempfile::TempDir;

use drive_permissions::report::{self, ReportOptions, ALL_FILES_CSV, PERMISSIONS_CSV};
use drive_permissions::{
    Authenticator, DriveClient, DriveError, EnricherConfig, EnumeratorConfig, StoredCredential,
};

fn client(server: &ServerGuard) -> DriveClient {
    let auth = Authenticator::from_stored(
        StoredCredential {
            client_id: "client".to_string(),
            client_secret: None,
            refresh_token: None,
            token_uri: "http://127.0.0.1:9/token".to_string(),
            access_token: "test-token".to_string(),
            token_expiry: 4_102_444_800,
        },
        None,
    );
    DriveClient::new(auth).with_base_url(server.url())
}

fn options(dir: &TempDir) -> ReportOptions {
    ReportOptions {
        output_dir: dir.path().to_path_buf(),
        enumerator: EnumeratorConfig::default(),
        enricher: EnricherConfig {
            delay: Duration::ZERO,
            shared_only: false,
        },
    }
}

async fn mock_json(server: &mut ServerGuard, path: &str, body: Value) -> Mock {
    server
        .mock("GET", path)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

async fn mock_about(server: &mut ServerGuard) -> Mock {
    mock_json(
        server,
        "/about",
        json!({"user": {"emailAddress": "me@x.com", "displayName": "Me"}}),
    )
    .await
}

fn line_count(path: &std::path::Path) -> usize {
    fs::read_to_string(path).unwrap().lines().count()
}

#[tokio::test]
async fn test_run_writes_both_reports() {
    let mut server = Server::new_async().await;
    let _about = mock_about(&mut server).await;
    let _list = mock_json(
        &mut server,
        "/files",
        json!({"files": [
            {"kind": "drive#file", "id": "a", "name": "Budget.xlsx", "mimeType": "application/vnd.ms-excel"},
            {"kind": "drive#file", "id": "b", "name": "Shared", "mimeType": "application/vnd.google-apps.folder"}
        ]}),
    )
    .await;
    let _a = mock_json(
        &mut server,
        "/files/a",
        json!({
            "name": "Budget.xlsx",
            "shared": true,
            "mimeType": "application/vnd.ms-excel",
            "permissions": [
                {"type": "user", "id": "1", "role": "owner", "emailAddress": "me@x.com", "displayName": "Me"},
                {"type": "anyone", "id": "anyoneWithLink", "role": "reader"}
            ]
        }),
    )
    .await;
    let _b = mock_json(
        &mut server,
        "/files/b",
        json!({
            "name": "Shared",
            "shared": true,
            "mimeType": "application/vnd.google-apps.folder",
            "permissions": [
                {"type": "user", "id": "2", "role": "writer", "emailAddress": "a@b.com", "displayName": "A"}
            ]
        }),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let outcome = report::run(&client(&server), &options(&dir)).await.unwrap();

    assert_eq!(outcome.files_listed, 2);
    assert_eq!(outcome.rows_written, 2);

    let all_files = fs::read_to_string(dir.path().join(ALL_FILES_CSV)).unwrap();
    let mut lines = all_files.lines();
    assert_eq!(lines.next(), Some("kind,id,name,mimeType"));
    assert_eq!(lines.next(), Some("drive#file,a,Budget.xlsx,application/vnd.ms-excel"));

    let permissions = fs::read_to_string(dir.path().join(PERMISSIONS_CSV)).unwrap();
    let lines: Vec<&str> = permissions.lines().collect();
    assert_eq!(
        lines,
        vec![
            "FileType,FileName,SharedUsers",
            "File,Budget.xlsx,Shareable Link (Read)",
            "Folder,Shared,A (a@b.com)",
        ]
    );
    assert!(!permissions.contains("me@x.com"));
}

#[tokio::test]
async fn test_failed_lookup_keeps_listing_and_skips_permissions() {
    let mut server = Server::new_async().await;
    let _about = mock_about(&mut server).await;

    let listing: Vec<Value> = (1..=100)
        .map(|i| json!({"id": format!("f{}", i), "name": format!("file{}", i), "mimeType": "text/plain"}))
        .collect();
    let _list = mock_json(&mut server, "/files", json!({ "files": listing })).await;

    let mut details = Vec::new();
    for i in 1..50 {
        let mock = mock_json(
            &mut server,
            &format!("/files/f{}", i),
            json!({"name": format!("file{}", i), "shared": false, "mimeType": "text/plain"}),
        )
        .await;
        details.push(mock);
    }
    let failing = server
        .mock("GET", "/files/f50")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": {"code": 500, "message": "Internal Error"}}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = report::run(&client(&server), &options(&dir))
        .await
        .unwrap_err();

    failing.assert_async().await;
    assert!(matches!(err, DriveError::ApiError { status: 500, .. }));
    assert_eq!(line_count(&dir.path().join(ALL_FILES_CSV)), 101);
    assert!(!dir.path().join(PERMISSIONS_CSV).exists());
}

#[tokio::test]
async fn test_account_without_email_is_rejected() {
    let mut server = Server::new_async().await;
    let _about = mock_json(&mut server, "/about", json!({"user": {"displayName": "Robot"}})).await;

    let dir = tempfile::tempdir().unwrap();
    let err = report::run(&client(&server), &options(&dir))
        .await
        .unwrap_err();

    assert!(matches!(err, DriveError::AuthenticationError(_)));
    assert!(!dir.path().join(ALL_FILES_CSV).exists());
}
