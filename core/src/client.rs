//! The session-holding client that sends rendered requests.
//!
//! # Design
//! `ApiClient` owns no process-wide state: the transport, settings store,
//! signer and bloks interpreter are all handed in, so independent accounts can
//! run side by side. `send` is the single choke point every endpoint goes
//! through: local checks, rendering, one transport call, credential capture,
//! and failure classification, in that order.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bloks::{BloksInterpreter, BloksScraper};
use crate::config::{ClientConfig, Device};
use crate::endpoints::{Account, People, Registration, TwoFactor};
use crate::error::{ApiError, Result};
use crate::http::{HttpClient, HttpResponse};
use crate::request::Request;
use crate::response::Response;
use crate::settings::{keys, SettingsStore};
use crate::signing::{KeyedSigner, Signer};

/// Client bound to one account's settings and one device identity.
pub struct ApiClient {
    config: ClientConfig,
    device: Device,
    http: Arc<dyn HttpClient>,
    settings: Arc<dyn SettingsStore>,
    signer: Arc<dyn Signer>,
    bloks: Arc<dyn BloksInterpreter>,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        http: Arc<dyn HttpClient>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let device = Device::load_or_generate(settings.as_ref());
        Self {
            config,
            device,
            http,
            settings,
            signer: Arc::new(KeyedSigner::default()),
            bloks: Arc::new(BloksScraper),
            cancel: CancellationToken::new(),
        }
    }

    /// Client using the bundled blocking transport.
    #[cfg(feature = "ureq")]
    pub fn with_ureq(config: ClientConfig, settings: Arc<dyn SettingsStore>) -> Self {
        let http = Arc::new(crate::http::UreqClient::new(config.timeout()));
        Self::new(config, http, settings)
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_bloks(mut self, bloks: Arc<dyn BloksInterpreter>) -> Self {
        self.bloks = bloks;
        self
    }

    /// Share `cancel` with the caller; once it fires every later send fails
    /// with [`ApiError::Cancelled`] before reaching the transport.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn account(&self) -> Account<'_> {
        Account::new(self)
    }

    pub fn people(&self) -> People<'_> {
        People::new(self)
    }

    pub fn registration(&self) -> Registration<'_> {
        Registration::new(self)
    }

    pub fn two_factor(&self) -> TwoFactor<'_> {
        TwoFactor::new(self)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }

    pub fn bloks(&self) -> &dyn BloksInterpreter {
        self.bloks.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.settings
            .get(keys::AUTHORIZATION)
            .is_some_and(|v| !v.is_empty())
    }

    /// Numeric id of the logged-in account, when known.
    pub fn account_id(&self) -> Option<String> {
        self.settings.get(keys::ACCOUNT_ID).filter(|v| !v.is_empty())
    }

    /// Forget the session credentials; device identity is kept.
    pub fn clear_session(&self) {
        self.settings.remove(keys::AUTHORIZATION);
        self.settings.remove(keys::ACCOUNT_ID);
    }

    /// Headers every request carries.
    pub fn base_headers(&self) -> Vec<(String, String)> {
        let c = &self.config;
        let mut headers = vec![
            ("User-Agent".to_string(), c.user_agent()),
            ("X-IG-App-ID".to_string(), c.app_id.clone()),
            ("X-IG-Capabilities".to_string(), c.capabilities.clone()),
            ("X-IG-Connection-Type".to_string(), c.connection_type.clone()),
            ("X-IG-App-Locale".to_string(), c.locale.clone()),
            ("X-IG-Device-Locale".to_string(), c.locale.clone()),
            ("X-IG-Device-ID".to_string(), self.device.uuid.clone()),
            ("X-IG-Android-ID".to_string(), self.device.device_id.clone()),
            ("X-Bloks-Version-Id".to_string(), c.bloks_versioning_id.clone()),
            ("Accept-Language".to_string(), c.locale.replace('_', "-")),
        ];
        if let Some(mid) = self.settings.get(keys::MID) {
            headers.push(("X-MID".to_string(), mid));
        }
        if let Some(auth) = self.settings.get(keys::AUTHORIZATION).filter(|v| !v.is_empty()) {
            headers.push(("Authorization".to_string(), auth));
            if let Some(id) = self.account_id() {
                headers.push(("IG-U-DS-USER-ID".to_string(), id));
            }
        }
        headers
    }

    /// Send one request and classify the reply.
    ///
    /// With silent failure set on the request, a throttled reply is replaced
    /// by an empty substitute (see [`Response::is_substituted`]).
    pub fn send(&self, request: &Request) -> Result<Response> {
        if self.cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        if request.needs_auth() && !self.is_logged_in() {
            return Err(ApiError::AuthenticationRequired {
                endpoint: request.endpoint().to_string(),
            });
        }

        let rendered = request.render(&self.config.base_url, self.signer.as_ref(), &self.base_headers())?;
        debug!(
            method = rendered.method.as_str(),
            endpoint = request.endpoint(),
            mode = ?request.body_mode(),
            "sending request"
        );

        let reply = self.http.execute(&rendered)?;
        self.capture_session(&reply);

        let response = Response::from_http(reply);
        match response.check_status() {
            Ok(()) => Ok(response),
            Err(ApiError::Throttled { message }) if request.is_silent_failure() => {
                warn!(endpoint = request.endpoint(), %message, "throttled, substituting empty response");
                Ok(Response::substitute())
            }
            Err(err) => Err(err),
        }
    }

    fn capture_session(&self, reply: &HttpResponse) {
        if let Some(auth) = reply.header("ig-set-authorization") {
            // The server clears the token with a bare "Bearer IGT:2:".
            let token = auth.rsplit(':').next().unwrap_or_default();
            if !token.is_empty() {
                info!("session credentials updated");
                self.settings.set(keys::AUTHORIZATION, auth);
            }
        }
        if let Some(id) = reply.header("ig-set-ig-u-ds-user-id").filter(|v| !v.is_empty()) {
            self.settings.set(keys::ACCOUNT_ID, id);
        }
        if let Some(mid) = reply.header("ig-set-x-mid").filter(|v| !v.is_empty()) {
            self.settings.set(keys::MID, mid);
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("device_id", &self.device.device_id)
            .field("logged_in", &self.is_logged_in())
            .finish_non_exhaustive()
    }
}
