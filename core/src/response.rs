//! Response envelope: raw text, decoded tree and typed views of one reply.
//!
//! # Design
//! The envelope is immutable. The JSON tree is decoded at most once and
//! cached, so repeated views are cheap and structurally equal. Typed views
//! go through serde: required fields are the ones without a `#[serde(default)]`,
//! and a missing one surfaces as `ApiError::SchemaValidation` naming the field
//! rather than a half-filled value.

use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::http::HttpResponse;

/// Body substituted for throttled replies on silent-failure requests.
const SUBSTITUTE_BODY: &str = "{}";

/// One reply from the remote service.
#[derive(Debug)]
pub struct Response {
    status: u16,
    raw: String,
    headers: Vec<(String, String)>,
    substituted: bool,
    tree: OnceLock<std::result::Result<Value, String>>,
}

impl Response {
    pub fn from_http(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            raw: response.body,
            headers: response.headers,
            substituted: false,
            tree: OnceLock::new(),
        }
    }

    /// Best-effort empty reply used in place of a swallowed failure.
    pub(crate) fn substitute() -> Self {
        Self {
            status: 200,
            raw: SUBSTITUTE_BODY.to_string(),
            headers: Vec::new(),
            substituted: true,
            tree: OnceLock::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True when this reply stands in for a suppressed failure.
    pub fn is_substituted(&self) -> bool {
        self.substituted
    }

    pub fn as_raw_text(&self) -> &str {
        &self.raw
    }

    pub fn as_tree(&self) -> Result<&Value> {
        self.tree
            .get_or_init(|| serde_json::from_str(&self.raw).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|msg| ApiError::MalformedResponse(msg.clone()))
    }

    pub fn as_typed<T: DeserializeOwned>(&self) -> Result<T> {
        let tree = self.as_tree()?;
        serde_path_to_error::deserialize(tree).map_err(|e| {
            let path = e.path().to_string();
            let message = e.into_inner().to_string();
            ApiError::SchemaValidation {
                field: field_path(&path, &message),
                message,
            }
        })
    }

    /// Map a failure reply onto the error taxonomy. Success replies pass.
    pub fn check_status(&self) -> Result<()> {
        let tree = self.as_tree().ok();
        let failed_envelope =
            tree.and_then(|t| t.get("status")).and_then(Value::as_str) == Some("fail");
        if (200..300).contains(&self.status) && !failed_envelope {
            return Ok(());
        }
        Err(classify(self.status, &self.raw, tree))
    }
}

const THROTTLE_MARKERS: &[&str] = &["Please wait a few minutes", "rate limited", "throttled"];

fn classify(status: u16, raw: &str, tree: Option<&Value>) -> ApiError {
    if status == 431 || status == 414 {
        return ApiError::RequestHeadersTooLarge;
    }

    let field = |name: &str| tree.and_then(|t| t.get(name));
    let text = |name: &str| field(name).and_then(Value::as_str).map(str::to_string);

    // `message` is usually a string but some endpoints send an object.
    let message = match field("message") {
        Some(Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => text("error_type").unwrap_or_else(|| excerpt(raw, 200).to_string()),
    };

    if status == 429 || THROTTLE_MARKERS.iter().any(|m| message.contains(m)) {
        return ApiError::Throttled { message };
    }

    match message.as_str() {
        "login_required" => ApiError::LoginRequired,
        "challenge_required" | "checkpoint_required" => {
            let challenge = field("challenge");
            let url = ["api_path", "url"].iter().find_map(|key| {
                challenge
                    .and_then(|c| c.get(*key))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
            ApiError::ChallengeRequired { message, url }
        }
        "feedback_required" => ApiError::FeedbackRequired {
            message: text("feedback_message").unwrap_or(message),
        },
        _ if status == 404 => ApiError::NotFound,
        _ => ApiError::Remote { status, message },
    }
}

/// Dotted path of the offending value, e.g. `user.username`.
///
/// A missing field is never entered, so its name is appended to the path of
/// the object that lacks it.
fn field_path(path: &str, message: &str) -> String {
    let missing = message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.strip_suffix('`'));
    match (path, missing) {
        (".", Some(name)) => name.to_string(),
        (".", None) => "<root>".to_string(),
        (parent, Some(name)) => format!("{parent}.{name}"),
        (parent, None) => parent.to_string(),
    }
}

/// Leading slice of `text` no longer than `max` bytes, cut on a char boundary.
pub(crate) fn excerpt(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        pk: u64,
        #[serde(default)]
        full_name: String,
    }

    fn response(status: u16, body: &str) -> Response {
        Response::from_http(HttpResponse::new(status, body))
    }

    #[test]
    fn views_are_consistent() {
        let resp = response(200, r#"{"pk": 5}"#);
        assert_eq!(resp.as_raw_text(), r#"{"pk": 5}"#);
        let first = resp.as_tree().unwrap().clone();
        let second = resp.as_tree().unwrap().clone();
        assert_eq!(first, second);
        let typed: Sample = resp.as_typed().unwrap();
        assert_eq!(typed, Sample { pk: 5, full_name: String::new() });
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = response(200, "<html>").as_tree().unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
    }

    #[test]
    fn missing_required_field_names_the_field() {
        let err = response(200, r#"{"full_name": "x"}"#).as_typed::<Sample>().unwrap_err();
        match err {
            ApiError::SchemaValidation { field, .. } => assert_eq!(field, "pk"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn wrong_type_reports_the_nested_path() {
        use crate::models::{CurrentUserResponse, UserInfoResponse};

        let field = |err: ApiError| match err {
            ApiError::SchemaValidation { field, .. } => field,
            other => panic!("unexpected error: {other:?}"),
        };
        let err = response(200, r#"{"user":{"pk":1,"username":5}}"#)
            .as_typed::<UserInfoResponse>()
            .unwrap_err();
        assert_eq!(field(err), "user.username");

        let err = response(200, r#"{"user":{"pk":true,"username":"a"}}"#)
            .as_typed::<UserInfoResponse>()
            .unwrap_err();
        assert_eq!(field(err), "user.pk");

        let err = response(200, r#"{"user":{"pk":1,"username":"a","gender":300}}"#)
            .as_typed::<CurrentUserResponse>()
            .unwrap_err();
        assert_eq!(field(err), "user.gender");
    }

    #[test]
    fn nested_missing_field_reports_the_full_path() {
        let err = response(200, r#"{"user":{"pk":1}}"#)
            .as_typed::<crate::models::UserInfoResponse>()
            .unwrap_err();
        match err {
            ApiError::SchemaValidation { field, message } => {
                assert_eq!(field, "user.username");
                assert!(message.contains("missing field"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            response(200, r#""5""#).as_typed::<Sample>(),
            Err(ApiError::SchemaValidation { ref field, .. }) if field == "<root>"
        ));
    }

    #[test]
    fn success_passes_status_check() {
        assert!(response(200, r#"{"status":"ok"}"#).check_status().is_ok());
        assert!(response(200, "not json").check_status().is_ok());
    }

    #[test]
    fn throttling_by_status_and_message() {
        assert!(matches!(
            response(429, "").check_status(),
            Err(ApiError::Throttled { .. })
        ));
        let body = r#"{"status":"fail","message":"Please wait a few minutes before you try again."}"#;
        assert!(matches!(
            response(400, body).check_status(),
            Err(ApiError::Throttled { .. })
        ));
    }

    #[test]
    fn failed_envelope_with_200_is_an_error() {
        let err = response(200, r#"{"status":"fail","message":"user not found"}"#)
            .check_status()
            .unwrap_err();
        assert!(matches!(err, ApiError::Remote { status: 200, ref message } if message == "user not found"));
    }

    #[test]
    fn challenge_carries_url() {
        let body = r#"{"status":"fail","message":"challenge_required","challenge":{"api_path":"/challenge/1/abc/"}}"#;
        match response(400, body).check_status().unwrap_err() {
            ApiError::ChallengeRequired { url, .. } => assert_eq!(url.as_deref(), Some("/challenge/1/abc/")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn login_feedback_headers_and_not_found() {
        assert!(matches!(
            response(403, r#"{"status":"fail","message":"login_required"}"#).check_status(),
            Err(ApiError::LoginRequired)
        ));
        assert!(matches!(
            response(400, r#"{"status":"fail","message":"feedback_required","feedback_message":"slow down"}"#)
                .check_status(),
            Err(ApiError::FeedbackRequired { ref message }) if message == "slow down"
        ));
        assert!(matches!(response(431, "").check_status(), Err(ApiError::RequestHeadersTooLarge)));
        assert!(matches!(response(404, "").check_status(), Err(ApiError::NotFound)));
    }

    #[test]
    fn generic_error_uses_body_excerpt_without_message() {
        let err = response(500, "upstream exploded").check_status().unwrap_err();
        assert!(matches!(err, ApiError::Remote { status: 500, ref message } if message == "upstream exploded"));
    }

    #[test]
    fn substitute_is_empty_object() {
        let resp = Response::substitute();
        assert!(resp.is_substituted());
        assert_eq!(resp.as_tree().unwrap(), &serde_json::json!({}));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "h");
        assert_eq!(excerpt("short", 200), "short");
    }
}
