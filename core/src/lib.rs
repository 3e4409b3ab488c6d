//! Client core for a mobile app's private HTTP API.
//!
//! # Overview
//! Every remote operation is one `Request` rendered into a plain-data
//! `HttpRequest`, executed by an injected `HttpClient`, and read back through
//! a `Response` envelope. The crate never opens a socket itself unless the
//! bundled `ureq` transport is used, which keeps the substrate deterministic
//! and easy to drive from tests.
//!
//! # Design
//! - `ApiClient` holds the session dependencies (transport, settings store,
//!   signer, bloks interpreter) as trait objects; there is no global state.
//! - `request` and `response` are the builder and envelope every endpoint
//!   shares; `pagination` adds the exclusion-list protocol used by search.
//! - `flow` drives the multi-step wizards. Callers own the `FlowState` and
//!   thread it through each step.
//! - `endpoints` is the catalog of thin typed wrappers, grouped by concern
//!   and reached through `ApiClient::account()`, `people()`,
//!   `registration()` and `two_factor()`.
//! - Typed replies live in `models` and are defined independently from the
//!   mock server; the integration tests catch drift between the two.

pub mod bloks;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod flow;
pub mod http;
pub mod models;
pub mod pagination;
pub mod params;
pub mod request;
pub mod response;
pub mod settings;
pub mod signing;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use bloks::{BloksInterpreter, BloksScraper};
pub use client::ApiClient;
pub use config::{ClientConfig, Device};
pub use error::{ApiError, Result, TransportError, ValidationError};
pub use flow::{FlowKind, FlowState, FlowStep, ProfileField, RegistrationStep, TotpStep};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
#[cfg(feature = "ureq")]
pub use http::UreqClient;
pub use pagination::{paginate_with_exclusion, Page, PaginationCursor, RankToken};
pub use request::{BodyMode, Request};
pub use response::Response;
pub use settings::{MemorySettings, SettingsStore};
pub use signing::{KeyedSigner, Signer};
pub use tokio_util::sync::CancellationToken;
pub use validation::{Birthday, Gender};
