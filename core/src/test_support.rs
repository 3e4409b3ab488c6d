//! Scripted transport shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::settings::{keys, MemorySettings, SettingsStore};

/// Replays queued replies in order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn push(&self, reply: HttpResponse) {
        self.replies.lock().push_back(Ok(reply));
    }

    pub(crate) fn push_error(&self, err: TransportError) {
        self.replies.lock().push_back(Err(err));
    }

    pub(crate) fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().clone()
    }
}

impl HttpClient for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(200, r#"{"status":"ok"}"#)))
    }
}

pub(crate) fn scripted_client(replies: Vec<(u16, &str)>) -> (ApiClient, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    for (status, body) in replies {
        transport.push(HttpResponse::new(status, body));
    }
    let client = ApiClient::new(
        ClientConfig::default().with_base_url("http://localhost/api/v1/"),
        transport.clone(),
        Arc::new(MemorySettings::new()),
    );
    (client, transport)
}

/// Same as [`scripted_client`] with a session already established as user 42.
pub(crate) fn logged_in_client(replies: Vec<(u16, &str)>) -> (ApiClient, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    for (status, body) in replies {
        transport.push(HttpResponse::new(status, body));
    }
    let settings = Arc::new(MemorySettings::new());
    settings.set(keys::AUTHORIZATION, "Bearer IGT:2:test");
    settings.set(keys::ACCOUNT_ID, "42");
    let client = ApiClient::new(
        ClientConfig::default().with_base_url("http://localhost/api/v1/"),
        transport.clone(),
        settings,
    );
    (client, transport)
}

/// Decoded form fields of a POST, unwrapping the signed envelope if present.
pub(crate) fn form_fields(request: &HttpRequest) -> serde_json::Map<String, serde_json::Value> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(request.body.as_deref().unwrap_or_default()).unwrap();
    if let Some((_, signed)) = pairs.iter().find(|(k, _)| k == "signed_body") {
        let payload = signed.split_once('.').unwrap().1;
        return serde_json::from_str(payload).unwrap();
    }
    pairs
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect()
}

/// Query pairs of a rendered URL.
pub(crate) fn query_pairs(request: &HttpRequest) -> Vec<(String, String)> {
    url::Url::parse(&request.url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}
