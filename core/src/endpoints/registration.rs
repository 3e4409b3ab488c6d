//! The bloks account registration wizard.
//!
//! ```text
//! start(email)            -> contact point accepted, code sent
//! submit_confirmation_code
//! submit_password
//! submit_birthday
//! submit_name
//! submit_username
//! create_account          -> CreatedAccount, session established
//! ```
//!
//! Every step posts to `bloks/apps/<app>/` without signing. The correlation
//! ids minted by `start` and the server parameters scraped from each reply
//! travel in `server_params` on every later step.

use serde_json::{json, Map, Value};

use crate::client::ApiClient;
use crate::error::{ApiError, Result};
use crate::flow::{advance, FlowKind, FlowState, FlowStep, ProfileField, RegistrationStep, Settled};
use crate::models::CreatedAccount;
use crate::request::Request;
use crate::response::Response;
use crate::validation::{check_email, check_not_empty, check_password, Birthday};

const CORRELATION_IDS: [&str; 3] = ["waterfall_id", "headers_flow_id", "event_request_id"];

/// Entry point for the registration wizard.
pub struct Registration<'a> {
    client: &'a ApiClient,
}

impl<'a> Registration<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Submit the contact point and open a new flow.
    pub fn start(&self, email: &str) -> Result<FlowState> {
        check_email(email)?;
        let mut state = FlowState::start(FlowKind::Registration, &CORRELATION_IDS);
        let device = self.client.device();
        let input = json!({
            "email": email,
            "device_id": device.device_id,
            "family_device_id": device.phone_id,
            "accounts_list": [],
            "confirmed_cp_and_code": {},
        });
        let email = email.to_string();
        self.step(&mut state, RegistrationStep::ContactPoint, input, |_| {
            Ok(Settled::new(()).confirm(ProfileField::ContactPoint, email))
        })?;
        Ok(state)
    }

    pub fn submit_confirmation_code(&self, state: &mut FlowState, code: &str) -> Result<()> {
        check_not_empty("confirmation code", code)?;
        let input = json!({
            "code": code,
            "contactpoint": state.profile(ProfileField::ContactPoint),
        });
        let code = code.to_string();
        self.step(state, RegistrationStep::Confirmation, input, |_| {
            Ok(Settled::new(()).confirm(ProfileField::ConfirmationCode, code))
        })
    }

    /// The password is checked against the local policy before anything is
    /// sent, and only its encrypted envelope is kept in the state.
    pub fn submit_password(&self, state: &mut FlowState, password: &str) -> Result<()> {
        check_password(password)?;
        let encrypted = self.client.signer().encrypt_password(password);
        let input = json!({ "encrypted_password": encrypted });
        self.step(state, RegistrationStep::Password, input, |_| {
            Ok(Settled::new(()).confirm(ProfileField::Password, encrypted))
        })
    }

    pub fn submit_birthday(&self, state: &mut FlowState, birthday: Birthday) -> Result<()> {
        let input = json!({
            "birthday_or_current_date_string": birthday.to_string(),
            "should_skip_youth_tos": 0,
            "is_youth_regulation_flow_complete": 0,
        });
        self.step(state, RegistrationStep::Birthday, input, |_| {
            Ok(Settled::new(()).confirm(ProfileField::Birthday, birthday.to_string()))
        })
    }

    pub fn submit_name(&self, state: &mut FlowState, full_name: &str) -> Result<()> {
        check_not_empty("full name", full_name)?;
        let input = json!({ "name": full_name });
        let full_name = full_name.to_string();
        self.step(state, RegistrationStep::Name, input, |_| {
            Ok(Settled::new(()).confirm(ProfileField::FullName, full_name))
        })
    }

    pub fn submit_username(&self, state: &mut FlowState, username: &str) -> Result<()> {
        check_not_empty("username", username)?;
        let input = json!({ "username": username });
        let username = username.to_string();
        self.step(state, RegistrationStep::Username, input, |_| {
            Ok(Settled::new(()).confirm(ProfileField::Username, username))
        })
    }

    /// Final step. Submits every confirmed field and returns the new account.
    pub fn create_account(&self, state: &mut FlowState) -> Result<CreatedAccount> {
        let field = |f| state.profile(f).unwrap_or_default().to_string();
        let input = json!({
            "contactpoint": field(ProfileField::ContactPoint),
            "confirmation_code": field(ProfileField::ConfirmationCode),
            "encrypted_password": field(ProfileField::Password),
            "birthday_or_current_date_string": field(ProfileField::Birthday),
            "name": field(ProfileField::FullName),
            "username": field(ProfileField::Username),
            "device_id": self.client.device().device_id,
        });
        let bloks = self.client.bloks();
        self.step(state, RegistrationStep::Create, input, |response| {
            let body = response.as_raw_text();
            let user = bloks
                .parse(body, "logged_in_user")
                .iter()
                .map(|fragment| bloks.extract_map(fragment, "logged_in_user"))
                .find(|map| map.contains_key("pk"))
                .ok_or_else(|| ApiError::SchemaValidation {
                    field: "logged_in_user".to_string(),
                    message: "reply names logged_in_user but carries no account map".to_string(),
                })?;
            let account: CreatedAccount = serde_json::from_value(Value::Object(user)).map_err(|e| {
                ApiError::SchemaValidation {
                    field: "logged_in_user".to_string(),
                    message: e.to_string(),
                }
            })?;
            Ok(Settled::new(account))
        })
    }

    fn step<T>(
        &self,
        state: &mut FlowState,
        step: RegistrationStep,
        client_input: Value,
        settle: impl FnOnce(&Response) -> Result<Settled<T>>,
    ) -> Result<T> {
        advance(self.client, state, step, |state| self.bloks_request(state, step, client_input), settle)
    }

    fn bloks_request(&self, state: &FlowState, step: RegistrationStep, client_input: Value) -> Request {
        let config = self.client.config();
        let mut server_params: Map<String, Value> = state.server_params().clone();
        for (name, id) in state.correlation_ids() {
            server_params.insert(name.clone(), Value::from(id.as_str()));
        }
        server_params.insert("INTERNAL__latency_qpl_instance_id".to_string(), Value::from(step.index()));

        let params = json!({
            "client_input_params": client_input,
            "server_params": server_params,
        });
        let context = json!({
            "bloks_version": config.bloks_versioning_id,
            "styles_id": "instagram",
        });
        let request = Request::new(format!("bloks/apps/{}/", step.app()))
            .set_needs_auth(false)
            .set_signed_post(false)
            .add_post("params", params.to_string())
            .add_post("bk_client_context", context.to_string())
            .add_post("bloks_versioning_id", config.bloks_versioning_id.as_str());
        match state.correlation_id("headers_flow_id") {
            Some(flow_id) => request.add_header("X-Bloks-Flow-Id", flow_id),
            None => request,
        }
    }
}
