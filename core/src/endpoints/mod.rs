//! The endpoint catalog: thin, typed wrappers over the request builder.
//!
//! Each group borrows the client and exposes one method per remote
//! operation. Methods validate their input, build one `Request`, send it and
//! decode the reply; the wizard groups drive the flow coordinator instead.

mod account;
mod people;
mod registration;
mod two_factor;

pub use account::Account;
pub use people::People;
pub use registration::Registration;
pub use two_factor::TwoFactor;

use serde::de::DeserializeOwned;

use crate::client::ApiClient;
use crate::error::Result;
use crate::request::Request;

fn fetch<T: DeserializeOwned>(client: &ApiClient, request: Request) -> Result<T> {
    client.send(&request)?.as_typed()
}

/// Like [`fetch`], but a substituted reply (swallowed throttling) is `None`.
fn fetch_optional<T: DeserializeOwned>(client: &ApiClient, request: Request) -> Result<Option<T>> {
    let response = client.send(&request)?;
    if response.is_substituted() {
        return Ok(None);
    }
    response.as_typed().map(Some)
}

/// `_uuid`, `_uid` and `device_id`, the fields most authenticated writes carry.
fn with_session_fields(client: &ApiClient, request: Request) -> Request {
    let request = request.add_post("_uuid", client.device().uuid.as_str());
    let request = match client.account_id() {
        Some(id) => request.add_post("_uid", id),
        None => request,
    };
    request.add_post("device_id", client.device().device_id.as_str())
}
