//! Check request rendering and reply classification against the JSON
//! vectors stored in `test-vectors/`.
//!
//! Form bodies are compared as decoded key/value pairs, so the vectors do not
//! depend on the exact percent-encoding of punctuation.

use privapi_core::{ApiError, HttpMethod, HttpResponse, KeyedSigner, Request, Response};
use serde_json::Value;

fn pairs(value: &Value) -> Vec<(String, String)> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|pair| {
            let pair = pair.as_array().unwrap();
            (pair[0].as_str().unwrap().to_string(), pair[1].as_str().unwrap().to_string())
        })
        .collect()
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        other => panic!("unknown method: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[test]
fn request_rendering_vectors() {
    let raw = include_str!("../../test-vectors/requests.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let signer = KeyedSigner::new(vectors["signing_key"].as_str().unwrap().as_bytes().to_vec(), "4");
    let base_url = vectors["base_url"].as_str().unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let flags = &case["flags"];
        let mut request = Request::new(case["endpoint"].as_str().unwrap())
            .set_signed_post(flags["signed_post"].as_bool().unwrap_or(true))
            .set_signed_get(flags["signed_get"].as_bool().unwrap_or(false));
        for (k, v) in pairs(&case["query"]) {
            request = request.add_param(&k, v);
        }
        for (k, v) in pairs(&case["post"]) {
            request = request.add_post(&k, v);
        }

        let rendered = request.render(base_url, &signer, &[]).unwrap();
        let expected = &case["expected"];
        assert_eq!(
            rendered.method,
            parse_method(expected["method"].as_str().unwrap()),
            "{name}: method"
        );
        if let Some(url) = expected["url"].as_str() {
            assert_eq!(rendered.url, url, "{name}: url");
        }
        if expected.get("query").is_some() {
            let query: Vec<(String, String)> = url::Url::parse(&rendered.url)
                .unwrap()
                .query_pairs()
                .into_owned()
                .collect();
            assert_eq!(query, pairs(&expected["query"]), "{name}: query");
        }
        match expected["form"].as_array() {
            Some(_) => {
                let form: Vec<(String, String)> =
                    serde_urlencoded::from_bytes(rendered.body.as_deref().unwrap()).unwrap();
                assert_eq!(form, pairs(&expected["form"]), "{name}: form");
            }
            None => assert!(rendered.body.is_none(), "{name}: GET must not carry a body"),
        }
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

fn class(result: &Result<(), ApiError>) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(ApiError::Throttled { .. }) => "Throttled",
        Err(ApiError::LoginRequired) => "LoginRequired",
        Err(ApiError::ChallengeRequired { .. }) => "ChallengeRequired",
        Err(ApiError::FeedbackRequired { .. }) => "FeedbackRequired",
        Err(ApiError::RequestHeadersTooLarge) => "RequestHeadersTooLarge",
        Err(ApiError::NotFound) => "NotFound",
        Err(ApiError::Remote { .. }) => "Remote",
        Err(other) => panic!("unexpected class: {other:?}"),
    }
}

#[test]
fn reply_classification_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let status = case["status"].as_u64().unwrap() as u16;
        let response = Response::from_http(HttpResponse::new(status, case["body"].as_str().unwrap()));
        assert_eq!(
            class(&response.check_status()),
            case["expected"].as_str().unwrap(),
            "{name}"
        );
    }
}
