//! In-process fake of the FileMaker Data API shared by the integration tests.
#![allow(dead_code)]

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use fieldclock_backend::config::FileMakerConfig;
use fieldclock_backend::filemaker::FileMakerClient;

pub struct FakeFileMaker {
    pub total_projects: usize,
    pub logins: AtomicUsize,
    pub logouts: AtomicUsize,
    pub record_requests: AtomicUsize,
    pub expire_next: AtomicBool,
    pub created: Mutex<Vec<Value>>,
}

impl FakeFileMaker {
    pub fn with_projects(total_projects: usize) -> web::Data<Self> {
        web::Data::new(FakeFileMaker {
            total_projects,
            logins: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            record_requests: AtomicUsize::new(0),
            expire_next: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
        })
    }
}

fn ok(response: Value) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "response": response,
        "messages": [{"code": "0", "message": "OK"}]
    }))
}

fn api_error(code: &str, message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({
        "response": {},
        "messages": [{"code": code, "message": message}]
    }))
}

fn invalid_token() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({
        "response": {},
        "messages": [{"code": "952", "message": "Invalid FileMaker Data API token (*)"}]
    }))
}

fn bearer(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn login(state: web::Data<FakeFileMaker>, req: HttpRequest) -> HttpResponse {
    let basic = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.starts_with("Basic "));
    if !basic {
        return HttpResponse::Unauthorized().json(json!({
            "response": {},
            "messages": [{"code": "212", "message": "Invalid user account and/or password"}]
        }));
    }
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    ok(json!({ "token": format!("token-{}", n) }))
}

async fn logout(state: web::Data<FakeFileMaker>) -> HttpResponse {
    state.logouts.fetch_add(1, Ordering::SeqCst);
    ok(json!({}))
}

async fn get_records(
    state: web::Data<FakeFileMaker>,
    path: web::Path<(String, String)>,
    query: web::Query<HashMap<String, String>>,
    req: HttpRequest,
) -> HttpResponse {
    state.record_requests.fetch_add(1, Ordering::SeqCst);
    let (_database, layout) = path.into_inner();

    if bearer(&req).is_none() || layout == "Locked" || state.expire_next.swap(false, Ordering::SeqCst) {
        return invalid_token();
    }

    let total = state.total_projects;
    let offset: usize = query.get("_offset").and_then(|v| v.parse().ok()).unwrap_or(1);
    let limit: usize = query.get("_limit").and_then(|v| v.parse().ok()).unwrap_or(100);
    // The real Data API refuses an offset past the found set instead of
    // returning an empty page.
    if offset > total {
        return api_error("401", "No records match the request");
    }

    let data: Vec<Value> = (offset..=total)
        .take(limit)
        .map(|i| {
            json!({
                "fieldData": {"ProjectNumber": format!("P-{}", i), "ProjectName": format!("Site {}", i)},
                "portalData": {},
                "recordId": i.to_string(),
                "modId": "0"
            })
        })
        .collect();

    ok(json!({
        "dataInfo": {
            "database": "Operations",
            "layout": layout,
            "table": layout,
            "totalRecordCount": total,
            "foundCount": total,
            "returnedCount": data.len()
        },
        "data": data
    }))
}

async fn create_record(state: web::Data<FakeFileMaker>, body: web::Json<Value>) -> HttpResponse {
    state.created.lock().unwrap().push(body.into_inner());
    ok(json!({ "recordId": "99", "modId": "0" }))
}

async fn update_record(path: web::Path<(String, String, String)>) -> HttpResponse {
    let (_database, _layout, record_id) = path.into_inner();
    if record_id == "404" {
        return api_error("101", "Record is missing");
    }
    ok(json!({ "modId": "1" }))
}

async fn find() -> HttpResponse {
    api_error("401", "No records match the request")
}

/// Starts the fake on an ephemeral port and returns its base URL.
pub async fn start(state: web::Data<FakeFileMaker>) -> String {
    let server = HttpServer::new(move || {
        let base = "/fmi/data/vLatest/databases/{database}";
        App::new()
            .app_data(state.clone())
            .route(&format!("{}/sessions", base), web::post().to(login))
            .route(&format!("{}/sessions/{{token}}", base), web::delete().to(logout))
            .route(&format!("{}/layouts/{{layout}}/records", base), web::get().to(get_records))
            .route(&format!("{}/layouts/{{layout}}/records", base), web::post().to(create_record))
            .route(
                &format!("{}/layouts/{{layout}}/records/{{record_id}}", base),
                web::patch().to(update_record),
            )
            .route(&format!("{}/layouts/{{layout}}/_find", base), web::post().to(find))
    })
    .workers(1)
    .disable_signals()
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    tokio::spawn(server.run());
    format!("http://{}", addr)
}

pub fn filemaker_config(host: String) -> FileMakerConfig {
    FileMakerConfig {
        host,
        database: "Operations".to_string(),
        username: "sync".to_string(),
        password: "sync-password".to_string(),
        projects_layout: "Projects".to_string(),
        time_layout: "TimeEntries".to_string(),
    }
}

pub fn client_for(host: String) -> FileMakerClient {
    FileMakerClient::new(&filemaker_config(host)).unwrap()
}
