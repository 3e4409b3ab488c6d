//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use privapi_core::settings::keys;
use privapi_core::{
    ApiClient, ClientConfig, HttpClient, HttpRequest, HttpResponse, MemorySettings, SettingsStore,
    TransportError,
};
use serde_json::{Map, Value};

/// Transport spy: records every request and replays scripted replies.
///
/// Once the script runs out it answers `200 {"status":"ok"}`.
#[derive(Default)]
pub struct Spy {
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl Spy {
    pub fn reply(&self, status: u16, body: &str) -> &Self {
        self.replies.lock().push_back(Ok(HttpResponse::new(status, body)));
        self
    }

    pub fn reply_with(&self, response: HttpResponse) -> &Self {
        self.replies.lock().push_back(Ok(response));
        self
    }

    pub fn fail(&self, err: TransportError) -> &Self {
        self.replies.lock().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().clone()
    }
}

impl HttpClient for Spy {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(200, r#"{"status":"ok"}"#)))
    }
}

fn config() -> ClientConfig {
    ClientConfig::default().with_base_url("http://127.0.0.1:9/api/v1/")
}

/// Anonymous client wired to a fresh spy.
pub fn client() -> (ApiClient, Arc<Spy>) {
    let spy = Arc::new(Spy::default());
    let client = ApiClient::new(config(), spy.clone(), Arc::new(MemorySettings::new()));
    (client, spy)
}

/// Client with a session already established as user 42.
pub fn logged_in() -> (ApiClient, Arc<Spy>) {
    let spy = Arc::new(Spy::default());
    let settings = Arc::new(MemorySettings::new());
    settings.set(keys::AUTHORIZATION, "Bearer IGT:2:spy");
    settings.set(keys::ACCOUNT_ID, "42");
    let client = ApiClient::new(config(), spy.clone(), settings);
    (client, spy)
}

/// Decoded query string of a rendered request.
pub fn query(request: &HttpRequest) -> Vec<(String, String)> {
    url::Url::parse(&request.url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

pub fn query_value(request: &HttpRequest, name: &str) -> Option<String> {
    query(request).into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

/// Form fields of a POST, with a `signed_body` envelope unwrapped.
pub fn form(request: &HttpRequest) -> Map<String, Value> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(request.body.as_deref().unwrap_or_default()).unwrap();
    match pairs.iter().find(|(k, _)| k == "signed_body") {
        Some((_, signed)) => {
            let (_, payload) = signed.split_once('.').unwrap();
            serde_json::from_str(payload).unwrap()
        }
        None => pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect(),
    }
}

/// Installs a test-writer subscriber honoring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
