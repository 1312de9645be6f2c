//! In-process fake of the generation backend, served by axum on an ephemeral
//! port so `ApiClient` is exercised over real HTTP.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use tracker::store::StoreEvent;

type Reply = (StatusCode, Json<Value>);

/// Rows per list page, kept small so multi-page answers are easy to set up.
pub const PAGE_SIZE: usize = 2;

#[derive(Default)]
pub struct Backend {
    pub token: Option<String>,
    /// Resume id handed out by the generate endpoint.
    pub resume_id: String,
    pub resume_statuses: Mutex<VecDeque<Value>>,
    pub critique_statuses: Mutex<VecDeque<Value>>,
    pub resumes: Mutex<Vec<Value>>,
    /// `None` makes the candidate list answer 500.
    pub candidates: Mutex<Option<Vec<Value>>>,
    pub applications: Mutex<Vec<Value>>,
    pub critique_busy: AtomicBool,
    pub status_hits: AtomicUsize,
    pub favorite_hits: AtomicUsize,
    pub candidate_queries: Mutex<Vec<HashMap<String, String>>>,
    /// Scheme and authority the fake is reachable at, for `next` links.
    origin: Mutex<String>,
}

impl Backend {
    pub fn new() -> Self {
        Self {
            resume_id: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        }
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..Self::new()
        }
    }

    pub fn status_hits(&self) -> usize {
        self.status_hits.load(Ordering::SeqCst)
    }

    pub fn favorite_hits(&self) -> usize {
        self.favorite_hits.load(Ordering::SeqCst)
    }

    fn check_auth(&self, headers: &HeaderMap) -> Result<(), Reply> {
        let Some(token) = &self.token else {
            return Ok(());
        };
        let expected = format!("Bearer {token}");
        match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            Some(value) if value == expected => Ok(()),
            _ => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Authentication credentials were not provided."})),
            )),
        }
    }
}

/// Starts the fake on 127.0.0.1:0 and returns the API root URL.
pub async fn serve(backend: Arc<Backend>) -> String {
    let app = Router::new()
        .route("/api/agents/generate/", post(generate_resume))
        .route("/api/agents/status/:id/", get(resume_status))
        .route("/api/resumes/", get(list_resumes))
        .route("/api/candidates/", get(list_candidates))
        .route(
            "/api/candidates/:id/generate_critique/",
            post(generate_critique),
        )
        .route("/api/critiques/by_task/:task_id/", get(critique_status))
        .route("/api/applications/", get(list_applications))
        .route(
            "/api/applications/:id/toggle_favorite/",
            post(toggle_favorite),
        )
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    *backend.origin.lock() = format!("http://{addr}");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

/// Waits (real time, bounded) for the first event matching `pred`.
pub async fn wait_for(
    events: &mut broadcast::Receiver<StoreEvent>,
    pred: impl Fn(&StoreEvent) -> bool,
) -> StoreEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive in time")
}

pub fn application(id: uuid::Uuid, is_favorite: bool) -> Value {
    json!({
        "id": id,
        "job_title": "Backend Engineer",
        "company": "Acme",
        "status": "APPLIED",
        "is_favorite": is_favorite,
        "created_at": "2024-03-01T10:00:00Z",
        "updated_at": "2024-03-01T10:00:00Z"
    })
}

// ── Handlers ────────────────────────────────────────────────────────────────

async fn generate_resume(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    if let Err(reply) = backend.check_auth(&headers) {
        return reply;
    }
    let title = body["title"].as_str().unwrap_or_default();
    if title.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"title": ["This field may not be blank."]})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "status": "processing",
            "resume_id": backend.resume_id,
            "task_id": "celery-1",
            "message": "Resume generation started"
        })),
    )
}

async fn resume_status(State(backend): State<Arc<Backend>>, Path(_id): Path<String>) -> Reply {
    backend.status_hits.fetch_add(1, Ordering::SeqCst);
    let next = backend.resume_statuses.lock().pop_front();
    (
        StatusCode::OK,
        Json(next.unwrap_or_else(|| json!({"status": "PROCESSING"}))),
    )
}

/// One page of `rows`, shaped like the backend's page-number pagination.
fn paginate(backend: &Backend, path: &str, rows: &[Value], query: &HashMap<String, String>) -> Reply {
    let page = query
        .get("page")
        .and_then(|p| p.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);
    let start = (page - 1) * PAGE_SIZE;
    let results: Vec<Value> = rows.iter().skip(start).take(PAGE_SIZE).cloned().collect();
    let next = (start + PAGE_SIZE < rows.len())
        .then(|| format!("{}/api/{path}?page={}", backend.origin.lock(), page + 1));
    (
        StatusCode::OK,
        Json(json!({
            "count": rows.len(),
            "next": next,
            "previous": null,
            "results": results
        })),
    )
}

async fn list_resumes(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    if let Err(reply) = backend.check_auth(&headers) {
        return reply;
    }
    let resumes = backend.resumes.lock().clone();
    paginate(&backend, "resumes/", &resumes, &query)
}

async fn list_candidates(
    State(backend): State<Arc<Backend>>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    backend.candidate_queries.lock().push(query);
    match backend.candidates.lock().clone() {
        Some(candidates) => (StatusCode::OK, Json(Value::Array(candidates))),
        None => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
    }
}

async fn generate_critique(
    State(backend): State<Arc<Backend>>,
    Path(_candidate_id): Path<String>,
) -> Reply {
    if backend.critique_busy.load(Ordering::SeqCst) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "Critique generation already in progress"})),
        );
    }
    (StatusCode::ACCEPTED, Json(json!({"task_id": "task-1"})))
}

async fn critique_status(
    State(backend): State<Arc<Backend>>,
    Path(_task_id): Path<String>,
) -> Reply {
    backend.status_hits.fetch_add(1, Ordering::SeqCst);
    let next = backend.critique_statuses.lock().pop_front();
    (
        StatusCode::OK,
        Json(next.unwrap_or_else(|| json!({"status": "PROCESSING", "error_message": ""}))),
    )
}

async fn list_applications(
    State(backend): State<Arc<Backend>>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    let applications = backend.applications.lock().clone();
    paginate(&backend, "applications/", &applications, &query)
}

async fn toggle_favorite(State(backend): State<Arc<Backend>>, Path(id): Path<String>) -> Reply {
    backend.favorite_hits.fetch_add(1, Ordering::SeqCst);
    let mut applications = backend.applications.lock();
    match applications.iter_mut().find(|app| app["id"] == id.as_str()) {
        Some(app) => {
            let flipped = !app["is_favorite"].as_bool().unwrap_or(false);
            app["is_favorite"] = Value::Bool(flipped);
            (StatusCode::OK, Json(json!({"is_favorite": flipped})))
        }
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))),
    }
}
