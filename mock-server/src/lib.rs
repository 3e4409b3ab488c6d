//! Stub of the remote private API, for integration tests.
//!
//! Serves a fixed population of users under `/api/v1/`, honors exclusion
//! lists on search, walks the bloks registration wizard and the TOTP setup,
//! and throttles the suggestion endpoints. Every request is appended to a
//! journal the tests can read back.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Number of users the stub knows about.
pub const POPULATION: u64 = 75;
/// Exclusion lists longer than this are refused with HTTP 431.
pub const MAX_EXCLUDED: usize = 500;
/// Page size of follow listings.
pub const FOLLOW_PAGE: usize = 10;
/// Size of every follow listing.
pub const FOLLOW_TOTAL: u64 = 25;

const THROTTLE_MESSAGE: &str = "Please wait a few minutes before you try again.";
const REG_PREFIX: &str = "com.bloks.www.bloks.caa.reg.";

/// The wizard screens in order: (app screen, screen the reply presents next).
const REGISTRATION: [(&str, &str); 7] = [
    ("contactpoint_email", "confirmation"),
    ("confirmation", "password"),
    ("password", "birthday"),
    ("birthday", "name_ig_and_soap"),
    ("name_ig_and_soap", "username"),
    ("username", "create.account"),
    ("create.account", ""),
];

/// One request as seen by the stub.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    /// Form fields; a `signed_body` envelope is unwrapped into its JSON payload.
    pub form: Map<String, Value>,
}

#[derive(Clone, Debug)]
struct RegistrationRecord {
    correlation: Map<String, Value>,
    last_step: u64,
}

#[derive(Default)]
struct Inner {
    journal: Vec<JournalEntry>,
    registrations: HashMap<String, RegistrationRecord>,
    fail_registration_step: Option<u64>,
}

/// Shared stub state. Clone it before serving to inspect the journal.
#[derive(Clone, Default)]
pub struct MockState {
    inner: Arc<RwLock<Inner>>,
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.inner.read().await.journal.clone()
    }

    /// For callers outside an async context.
    pub fn journal_blocking(&self) -> Vec<JournalEntry> {
        self.inner.blocking_read().journal.clone()
    }

    /// Make the given registration step reply without its milestone.
    pub fn fail_registration_step_blocking(&self, step: u64) {
        self.inner.blocking_write().fail_registration_step = Some(step);
    }

    pub async fn fail_registration_step(&self, step: u64) {
        self.inner.write().await.fail_registration_step = Some(step);
    }

    async fn record(&self, entry: JournalEntry) {
        tracing::debug!(method = %entry.method, path = %entry.path, "request");
        self.inner.write().await.journal.push(entry);
    }
}

pub fn app() -> Router {
    router(MockState::new())
}

pub fn router(state: MockState) -> Router {
    Router::new()
        .route("/api/v1/users/search/", get(search_users))
        // GET friendships/<user>/<following|followers>/, POST friendships/<action>/<user>/
        .route(
            "/api/v1/friendships/{first}/{second}/",
            get(follow_listing).post(change_friendship),
        )
        .route("/api/v1/accounts/current_user/", get(current_user))
        .route("/api/v1/bloks/apps/{app}/", post(bloks_app))
        .route("/api/v1/accounts/generate_two_factor_totp_key/", post(totp_key))
        .route("/api/v1/accounts/enable_totp_two_factor/", post(totp_enable))
        .route("/api/v1/scores/bootstrap/users/", get(throttled))
        .route("/api/v1/discover/chaining/", get(throttled))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, MockState::new()).await
}

pub async fn serve(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state)).await
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn entry(
    method: &Method,
    uri: &Uri,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    form: &HashMap<String, String>,
) -> JournalEntry {
    JournalEntry {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: query.clone(),
        headers: headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect(),
        form: decode_form(form),
    }
}

fn decode_form(form: &HashMap<String, String>) -> Map<String, Value> {
    if let Some(signed) = form.get("signed_body") {
        if let Some((_, payload)) = signed.split_once('.') {
            if let Ok(Value::Object(map)) = serde_json::from_str(payload) {
                return map;
            }
        }
    }
    form.iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

fn fail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"status": "fail", "message": message}))).into_response()
}

fn is_authenticated(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer IGT:2:") && v.len() > "Bearer IGT:2:".len())
}

fn user(pk: u64) -> Value {
    json!({
        "pk": pk,
        "username": format!("user{pk}"),
        "full_name": format!("User {pk}"),
        "is_private": pk % 5 == 0,
    })
}

// ---------------------------------------------------------------------------
// Search and listings
// ---------------------------------------------------------------------------

async fn search_users(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record(entry(&method, &uri, &query, &headers, &HashMap::new())).await;
    if !is_authenticated(&headers) {
        return fail(StatusCode::FORBIDDEN, "login_required");
    }

    let excluded: Vec<u64> = query
        .get("exclude_list")
        .map(|raw| {
            raw.trim_matches(['[', ']'])
                .split(',')
                .filter_map(|id| id.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();
    if excluded.len() > MAX_EXCLUDED {
        return StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE.into_response();
    }
    if !excluded.is_empty() && !query.contains_key("rank_token") {
        return fail(StatusCode::BAD_REQUEST, "rank_token is required with exclude_list");
    }

    let needle = query.get("q").map(|q| q.to_lowercase()).unwrap_or_default();
    let count: usize = query.get("count").and_then(|c| c.parse().ok()).unwrap_or(30);
    let matches: Vec<u64> = (1..=POPULATION)
        .filter(|pk| format!("user{pk}").contains(&needle))
        .filter(|pk| !excluded.contains(pk))
        .collect();

    let page: Vec<Value> = matches.iter().take(count).map(|pk| user(*pk)).collect();
    let has_more = matches.len() > count;
    let mut body = json!({
        "has_more": has_more,
        "num_results": page.len(),
        "users": page,
        "rank_token": query.get("rank_token").cloned().unwrap_or_default(),
        "status": "ok",
    });
    if has_more {
        body["next_max_id"] = json!(Uuid::new_v4().to_string());
    }
    Json(body).into_response()
}

async fn follow_listing(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path((user_id, which)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record(entry(&method, &uri, &query, &headers, &HashMap::new())).await;
    if !is_authenticated(&headers) {
        return fail(StatusCode::FORBIDDEN, "login_required");
    }
    if which != "following" && which != "followers" {
        return fail(StatusCode::NOT_FOUND, "unknown listing");
    }
    if !query.contains_key("rank_token") {
        return fail(StatusCode::BAD_REQUEST, "rank_token is required");
    }
    let Ok(owner) = user_id.parse::<u64>() else {
        return fail(StatusCode::NOT_FOUND, "user not found");
    };

    let offset: usize = query.get("max_id").and_then(|m| m.parse().ok()).unwrap_or(0);
    let base = (if which == "following" { 1000 } else { 2000 }) + owner * 100;
    let users: Vec<Value> = (0..FOLLOW_TOTAL)
        .skip(offset)
        .take(FOLLOW_PAGE)
        .map(|i| user(base + i))
        .collect();
    let next = offset + FOLLOW_PAGE;
    let mut body = json!({"users": users, "big_list": false, "status": "ok"});
    if (next as u64) < FOLLOW_TOTAL {
        body["next_max_id"] = json!(next.to_string());
    }
    Json(body).into_response()
}

// ---------------------------------------------------------------------------
// Relationships and account
// ---------------------------------------------------------------------------

async fn change_friendship(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path((action, user_id)): Path<(String, String)>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let recorded = entry(&method, &uri, &HashMap::new(), &headers, &form);
    let target = recorded.form.get("user_id").cloned();
    state.record(recorded).await;
    if !is_authenticated(&headers) {
        return fail(StatusCode::FORBIDDEN, "login_required");
    }
    if target.as_ref().and_then(Value::as_str) != Some(user_id.as_str()) {
        return fail(StatusCode::BAD_REQUEST, "user_id mismatch");
    }
    let status = match action.as_str() {
        "create" => json!({"following": true}),
        "destroy" | "remove_follower" | "ignore" => json!({"following": false}),
        "block" => json!({"blocking": true}),
        "unblock" => json!({"blocking": false}),
        "approve" => json!({"followed_by": true}),
        "favorite" => json!({"following": true, "is_bestie": true}),
        "unfavorite" => json!({"following": true, "is_bestie": false}),
        _ => return fail(StatusCode::NOT_FOUND, "unknown action"),
    };
    Json(json!({"friendship_status": status, "status": "ok"})).into_response()
}

async fn current_user(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record(entry(&method, &uri, &query, &headers, &HashMap::new())).await;
    if !is_authenticated(&headers) {
        return fail(StatusCode::FORBIDDEN, "login_required");
    }
    let pk = headers
        .get("ig-u-ds-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(1);
    Json(json!({"user": user(pk), "status": "ok"})).into_response()
}

async fn throttled(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record(entry(&method, &uri, &query, &headers, &HashMap::new())).await;
    fail(StatusCode::TOO_MANY_REQUESTS, THROTTLE_MESSAGE)
}

// ---------------------------------------------------------------------------
// Registration wizard
// ---------------------------------------------------------------------------

fn bloks_reply(tree: String) -> Value {
    json!({"layout": {"bloks_payload": {"tree": tree}}, "status": "ok"})
}

async fn bloks_app(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(app): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.record(entry(&method, &uri, &HashMap::new(), &headers, &form)).await;

    let Some(screen) = app.strip_prefix(REG_PREFIX).and_then(|s| s.strip_suffix(".async")) else {
        return fail(StatusCode::NOT_FOUND, "unknown bloks app");
    };
    let Some(index) = REGISTRATION.iter().position(|(s, _)| *s == screen) else {
        return fail(StatusCode::NOT_FOUND, "unknown registration screen");
    };
    let step = index as u64 + 1;

    let Some(params) = form
        .get("params")
        .and_then(|p| serde_json::from_str::<Value>(p).ok())
    else {
        return fail(StatusCode::BAD_REQUEST, "params missing");
    };
    let server = params["server_params"].as_object().cloned().unwrap_or_default();
    let correlation: Map<String, Value> = ["waterfall_id", "headers_flow_id", "event_request_id"]
        .iter()
        .filter_map(|k| Some((k.to_string(), server.get(*k)?.clone())))
        .collect();
    if correlation.len() != 3 {
        return fail(StatusCode::BAD_REQUEST, "correlation ids missing");
    }
    if server.get("INTERNAL__latency_qpl_instance_id").and_then(Value::as_u64) != Some(step) {
        return fail(StatusCode::BAD_REQUEST, "step counter mismatch");
    }
    let flow_id = correlation["headers_flow_id"].as_str().unwrap_or_default().to_string();
    let header_flow = headers.get("x-bloks-flow-id").and_then(|v| v.to_str().ok());
    if header_flow != Some(flow_id.as_str()) {
        return fail(StatusCode::BAD_REQUEST, "flow id header mismatch");
    }

    let mut inner = state.inner.write().await;
    if step == 1 {
        inner.registrations.insert(
            flow_id.clone(),
            RegistrationRecord {
                correlation: correlation.clone(),
                last_step: 0,
            },
        );
    }
    let Some(record) = inner.registrations.get(&flow_id).cloned() else {
        return fail(StatusCode::BAD_REQUEST, "unknown flow");
    };
    if record.correlation != correlation || record.last_step + 1 != step {
        return fail(StatusCode::BAD_REQUEST, "flow state mismatch");
    }
    if inner.fail_registration_step == Some(step) {
        return Json(bloks_reply(
            r#"(bk.action.caa.ShowError, "Something went wrong")"#.to_string(),
        ))
        .into_response();
    }
    if let Some(record) = inner.registrations.get_mut(&flow_id) {
        record.last_step = step;
    }
    drop(inner);

    let (_, next) = REGISTRATION[index];
    if next.is_empty() {
        let username = params["client_input_params"]["username"]
            .as_str()
            .unwrap_or("new_user")
            .to_string();
        let pk = 90_000 + step;
        let inner_json = json!({"logged_in_user": {"pk": pk, "username": username}}).to_string();
        let tree = format!(
            "(bk.action.caa.HandleLoginResponse, {})",
            serde_json::to_string(&inner_json).unwrap_or_default()
        );
        let token = format!("Bearer IGT:2:{}", Uuid::new_v4().simple());
        return (
            [
                ("ig-set-authorization", token),
                ("ig-set-ig-u-ds-user-id", pk.to_string()),
            ],
            Json(bloks_reply(tree)),
        )
            .into_response();
    }

    let reg_info = json!({"step": step, "flow": flow_id}).to_string();
    let tree = format!(
        r#"(bk.action.core.TakeLast, (bk.action.caa.PresentScreen, "{REG_PREFIX}{next}"), "server_params", (bk.action.map.Make, (bk.action.array.Make, "reg_info", "flow_step", "waterfall_id"), (bk.action.array.Make, {}, {step}, "server-overwrite-attempt")))"#,
        serde_json::to_string(&reg_info).unwrap_or_default()
    );
    Json(bloks_reply(tree)).into_response()
}

// ---------------------------------------------------------------------------
// TOTP setup
// ---------------------------------------------------------------------------

async fn totp_key(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.record(entry(&method, &uri, &HashMap::new(), &headers, &form)).await;
    if !is_authenticated(&headers) {
        return fail(StatusCode::FORBIDDEN, "login_required");
    }
    Json(json!({"totp_seed": "JBSWY3DPEHPK3PXP", "status": "ok"})).into_response()
}

async fn totp_enable(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let recorded = entry(&method, &uri, &HashMap::new(), &headers, &form);
    let code = recorded.form.get("verification_code").cloned();
    state.record(recorded).await;
    if !is_authenticated(&headers) {
        return fail(StatusCode::FORBIDDEN, "login_required");
    }
    match code.as_ref().and_then(Value::as_str) {
        Some(c) if c.len() == 6 && c.chars().all(|ch| ch.is_ascii_digit()) => Json(json!({
            "backup_codes": ["1111 2222", "3333 4444", "5555 6666"],
            "status": "ok",
        }))
        .into_response(),
        _ => fail(StatusCode::BAD_REQUEST, "invalid verification code"),
    }
}
