//! FileMaker client behaviour against an in-process fake Data API.

mod common;

use serde_json::{json, Map};
use std::sync::atomic::Ordering;

use common::{client_for, start, FakeFileMaker};
use fieldclock_backend::filemaker::FileMakerError;

#[actix_web::test]
async fn test_session_token_reused_across_requests() {
    let state = FakeFileMaker::with_projects(150);
    let client = client_for(start(state.clone()).await);

    client.get_records("Projects", 1, 10).await.unwrap();
    client.get_records("Projects", 11, 10).await.unwrap();

    assert_eq!(state.logins.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn test_expired_token_triggers_single_relogin() {
    let state = FakeFileMaker::with_projects(150);
    let client = client_for(start(state.clone()).await);

    client.get_records("Projects", 1, 5).await.unwrap();
    state.expire_next.store(true, Ordering::SeqCst);

    let records = client.get_records("Projects", 1, 5).await.unwrap();

    assert_eq!(records.len(), 5);
    assert_eq!(state.logins.load(Ordering::SeqCst), 2);
    assert_eq!(state.record_requests.load(Ordering::SeqCst), 3);
}

#[actix_web::test]
async fn test_persistent_unauthorized_gives_up_after_one_retry() {
    let state = FakeFileMaker::with_projects(150);
    let client = client_for(start(state.clone()).await);

    let err = client.get_records("Locked", 1, 5).await.unwrap_err();

    assert!(matches!(err, FileMakerError::Unauthorized));
    assert_eq!(state.logins.load(Ordering::SeqCst), 2);
    assert_eq!(state.record_requests.load(Ordering::SeqCst), 2);
}

#[actix_web::test]
async fn test_get_all_records_pages_until_short_page() {
    let state = FakeFileMaker::with_projects(150);
    let client = client_for(start(state.clone()).await);

    let records = client.get_all_records("Projects").await.unwrap();

    assert_eq!(records.len(), 150);
    assert_eq!(records[0].record_id, "1");
    assert_eq!(records[149].record_id, "150");
    assert_eq!(state.record_requests.load(Ordering::SeqCst), 2);
}

#[actix_web::test]
async fn test_get_all_records_with_exactly_full_last_page() {
    let state = FakeFileMaker::with_projects(100);
    let client = client_for(start(state.clone()).await);

    let records = client.get_all_records("Projects").await.unwrap();

    assert_eq!(records.len(), 100);
    assert_eq!(records[99].record_id, "100");
    assert_eq!(state.record_requests.load(Ordering::SeqCst), 2);
}

#[actix_web::test]
async fn test_get_all_records_on_empty_layout() {
    let state = FakeFileMaker::with_projects(0);
    let client = client_for(start(state.clone()).await);

    let records = client.get_all_records("Projects").await.unwrap();

    assert!(records.is_empty());
    assert_eq!(state.record_requests.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn test_find_without_matches_is_empty() {
    let state = FakeFileMaker::with_projects(150);
    let client = client_for(start(state.clone()).await);

    let mut query = Map::new();
    query.insert("ProjectNumber".to_string(), json!("==P-0"));
    let records = client.find("Projects", query, 10).await.unwrap();

    assert!(records.is_empty());
}

#[actix_web::test]
async fn test_create_record_sends_field_data() {
    let state = FakeFileMaker::with_projects(150);
    let client = client_for(start(state.clone()).await);

    let mut fields = Map::new();
    fields.insert("EmployeeID".to_string(), json!("E-17"));
    fields.insert("Hours".to_string(), json!("8.50"));
    let record_id = client.create_record("TimeEntries", fields).await.unwrap();

    assert_eq!(record_id, "99");
    let created = state.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0]["fieldData"]["EmployeeID"], "E-17");
    assert_eq!(created[0]["fieldData"]["Hours"], "8.50");
}

#[actix_web::test]
async fn test_update_missing_record_reports_api_error() {
    let state = FakeFileMaker::with_projects(150);
    let client = client_for(start(state.clone()).await);

    client.update_record("Projects", "7", Map::new()).await.unwrap();
    let err = client.update_record("Projects", "404", Map::new()).await.unwrap_err();

    match err {
        FileMakerError::Api { status, code, .. } => {
            assert_eq!(status, 500);
            assert_eq!(code, "101");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[actix_web::test]
async fn test_logout_closes_session_once() {
    let state = FakeFileMaker::with_projects(150);
    let client = client_for(start(state.clone()).await);

    client.logout().await.unwrap();
    assert_eq!(state.logouts.load(Ordering::SeqCst), 0);

    client.get_records("Projects", 1, 1).await.unwrap();
    client.logout().await.unwrap();
    client.logout().await.unwrap();

    assert_eq!(state.logouts.load(Ordering::SeqCst), 1);
}
