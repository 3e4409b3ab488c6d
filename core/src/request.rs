//! Outgoing request builder.
//!
//! # Design
//! A `Request` is a plain configuration value: endpoint, flags, ordered
//! parameters and extra headers. Nothing happens until the client renders it
//! with `render`, which is pure and deterministic for a given signer, so the
//! same request always produces the same bytes. The body encoding is derived
//! at render time from the flags, which means toggling signing after fields
//! have been added re-renders every field rather than dropping any.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use url::Url;

use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest};
use crate::params::{ParamValue, Params};
use crate::signing::{signed_body, Signer};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// How the request carries its parameters on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// GET, parameters in the query string only.
    Query,
    /// POST with plain form fields.
    Form,
    /// POST with a single `signed_body` envelope.
    SignedForm,
}

/// One outgoing call, before rendering.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "a Request does nothing until it is sent"]
pub struct Request {
    endpoint: String,
    needs_auth: bool,
    signed_post: bool,
    signed_get: bool,
    body_compressed: bool,
    silent_failure: bool,
    query: Params,
    post: Params,
    headers: Vec<(String, String)>,
}

impl Request {
    /// `endpoint` is relative to the configured base URL and may embed path
    /// parameters, e.g. `friendships/create/123/`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            needs_auth: true,
            signed_post: true,
            signed_get: false,
            body_compressed: false,
            silent_failure: false,
            query: Params::new(),
            post: Params::new(),
            headers: Vec::new(),
        }
    }

    pub fn add_param(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.query.set(key, value);
        self
    }

    pub fn add_post(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.post.set(key, value);
        self
    }

    /// Add the header, replacing an earlier one with the same name.
    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn set_needs_auth(mut self, needs_auth: bool) -> Self {
        self.needs_auth = needs_auth;
        self
    }

    pub fn set_signed_post(mut self, signed: bool) -> Self {
        self.signed_post = signed;
        self
    }

    pub fn set_signed_get(mut self, signed: bool) -> Self {
        self.signed_get = signed;
        self
    }

    pub fn set_body_compressed(mut self, compressed: bool) -> Self {
        self.body_compressed = compressed;
        self
    }

    pub fn set_silent_failure(mut self, silent: bool) -> Self {
        self.silent_failure = silent;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn needs_auth(&self) -> bool {
        self.needs_auth
    }

    pub fn is_silent_failure(&self) -> bool {
        self.silent_failure
    }

    pub fn query(&self) -> &Params {
        &self.query
    }

    pub fn post_fields(&self) -> &Params {
        &self.post
    }

    pub fn method(&self) -> HttpMethod {
        if self.post.is_empty() {
            HttpMethod::Get
        } else {
            HttpMethod::Post
        }
    }

    pub fn body_mode(&self) -> BodyMode {
        match (self.method(), self.signed_post) {
            (HttpMethod::Get, _) => BodyMode::Query,
            (HttpMethod::Post, false) => BodyMode::Form,
            (HttpMethod::Post, true) => BodyMode::SignedForm,
        }
    }

    /// Render into exactly one wire-level request.
    ///
    /// `base_headers` are the device/session headers supplied by the client;
    /// headers added on the request itself win over them.
    pub fn render(
        &self,
        base_url: &str,
        signer: &dyn Signer,
        base_headers: &[(String, String)],
    ) -> Result<HttpRequest> {
        let mut url = Url::parse(base_url)
            .and_then(|base| base.join(&self.endpoint))
            .map_err(|e| ApiError::Serialization(format!("invalid URL for {}: {e}", self.endpoint)))?;

        let query = if self.signed_get && !self.query.is_empty() {
            envelope_pairs(signer, &self.query)
        } else {
            self.query.form_pairs()
        };
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut headers: Vec<(String, String)> = base_headers
            .iter()
            .filter(|(name, _)| !self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name)))
            .cloned()
            .collect();

        let body = match self.body_mode() {
            BodyMode::Query => None,
            mode => {
                let pairs = if mode == BodyMode::SignedForm {
                    envelope_pairs(signer, &self.post)
                } else {
                    self.post.form_pairs()
                };
                let encoded = serde_urlencoded::to_string(&pairs)
                    .map_err(|e| ApiError::Serialization(e.to_string()))?;
                headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()));
                if self.body_compressed {
                    headers.push(("Content-Encoding".to_string(), "gzip".to_string()));
                    Some(gzip(encoded.as_bytes())?)
                } else {
                    Some(encoded.into_bytes())
                }
            }
        };

        headers.extend(self.headers.iter().cloned());

        Ok(HttpRequest {
            method: self.method(),
            url: url.into(),
            headers,
            body,
        })
    }
}

fn envelope_pairs(signer: &dyn Signer, params: &Params) -> Vec<(String, String)> {
    let mut pairs = vec![(
        "signed_body".to_string(),
        signed_body(signer, &params.to_json_string()),
    )];
    if let Some(version) = signer.key_version() {
        pairs.push(("ig_sig_key_version".to_string(), version.to_string()));
    }
    pairs
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let map_err = |e: std::io::Error| ApiError::Serialization(format!("gzip failed: {e}"));
    encoder.write_all(data).map_err(map_err)?;
    encoder.finish().map_err(map_err)
}
