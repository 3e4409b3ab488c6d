//! Account creation checks, profile and security settings.

use uuid::Uuid;

use super::{fetch, fetch_optional, with_session_fields};
use crate::client::ApiClient;
use crate::error::Result;
use crate::models::{
    AccountCreateResponse, CheckConfirmationCodeResponse, CheckEmailResponse, CheckUsernameResponse,
    CurrentUserResponse, GenericResponse, PresenceStatusResponse, SecurityInfoResponse,
    SendVerifyEmailResponse,
};
use crate::request::Request;
use crate::validation::{check_biography, check_email, check_not_empty, check_password, Gender};

/// Operations on the account itself.
pub struct Account<'a> {
    client: &'a ApiClient,
}

impl<'a> Account<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Classic (non-bloks) account creation.
    pub fn create(&self, username: &str, password: &str, email: &str) -> Result<AccountCreateResponse> {
        check_not_empty("username", username)?;
        check_password(password)?;
        check_email(email)?;
        let device = self.client.device();
        let request = Request::new("accounts/create/")
            .set_needs_auth(false)
            .add_post("phone_id", device.phone_id.as_str())
            .add_post("enc_password", self.client.signer().encrypt_password(password))
            .add_post("username", username)
            .add_post("first_name", "")
            .add_post("email", email)
            .add_post("device_id", device.device_id.as_str())
            .add_post("guid", device.uuid.as_str())
            .add_post("adid", device.advertising_id.as_str())
            .add_post("waterfall_id", Uuid::new_v4().to_string())
            .add_post("force_sign_up_code", "");
        fetch(self.client, request)
    }

    pub fn check_username(&self, username: &str) -> Result<CheckUsernameResponse> {
        check_not_empty("username", username)?;
        let request = Request::new("users/check_username/")
            .set_needs_auth(false)
            .add_post("_uuid", self.client.device().uuid.as_str())
            .add_post("username", username);
        fetch(self.client, request)
    }

    pub fn check_email(&self, email: &str) -> Result<CheckEmailResponse> {
        check_email(email)?;
        let device = self.client.device();
        let request = Request::new("users/check_email/")
            .set_needs_auth(false)
            .add_post("android_device_id", device.device_id.as_str())
            .add_post("login_nonce_map", "{}")
            .add_post("login_nonces", "[]")
            .add_post("email", email)
            .add_post("qe_id", device.uuid.as_str())
            .add_post("waterfall_id", Uuid::new_v4().to_string());
        fetch(self.client, request)
    }

    pub fn send_email_verification_code(&self, email: &str) -> Result<SendVerifyEmailResponse> {
        check_email(email)?;
        let device = self.client.device();
        let request = Request::new("accounts/send_verify_email/")
            .set_needs_auth(false)
            .set_signed_post(false)
            .add_post("phone_id", device.phone_id.as_str())
            .add_post("device_id", device.device_id.as_str())
            .add_post("email", email)
            .add_post("waterfall_id", Uuid::new_v4().to_string())
            .add_post("auto_confirm_only", "false");
        fetch(self.client, request)
    }

    pub fn check_confirmation_code(&self, email: &str, code: &str) -> Result<CheckConfirmationCodeResponse> {
        check_email(email)?;
        check_not_empty("code", code)?;
        let request = Request::new("accounts/check_confirmation_code/")
            .set_needs_auth(false)
            .set_signed_post(false)
            .add_post("code", code)
            .add_post("device_id", self.client.device().device_id.as_str())
            .add_post("email", email)
            .add_post("waterfall_id", Uuid::new_v4().to_string());
        fetch(self.client, request)
    }

    pub fn current_user(&self) -> Result<CurrentUserResponse> {
        fetch(self.client, Request::new("accounts/current_user/").add_param("edit", true))
    }

    pub fn set_biography(&self, text: &str) -> Result<GenericResponse> {
        check_biography(text)?;
        let request = with_session_fields(self.client, Request::new("accounts/set_biography/"))
            .add_post("raw_text", text);
        fetch(self.client, request)
    }

    /// `gender` is one of `male`, `female`, `unspecified` or `custom:<text>`.
    pub fn set_gender(&self, gender: &str) -> Result<GenericResponse> {
        let gender: Gender = gender.parse()?;
        let request = Request::new("accounts/set_gender/")
            .set_signed_post(false)
            .add_post("gender", u32::from(gender.code()))
            .add_post("_uuid", self.client.device().uuid.as_str())
            .add_post("custom_gender", gender.custom_text().unwrap_or_default());
        fetch(self.client, request)
    }

    pub fn set_private(&self) -> Result<GenericResponse> {
        fetch(self.client, with_session_fields(self.client, Request::new("accounts/set_private/")))
    }

    pub fn set_public(&self) -> Result<GenericResponse> {
        fetch(self.client, with_session_fields(self.client, Request::new("accounts/set_public/")))
    }

    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<GenericResponse> {
        check_not_empty("old password", old_password)?;
        check_password(new_password)?;
        let signer = self.client.signer();
        let new = signer.encrypt_password(new_password);
        let request = with_session_fields(self.client, Request::new("accounts/change_password/"))
            .add_post("enc_old_password", signer.encrypt_password(old_password))
            .add_post("enc_new_password1", new.as_str())
            .add_post("enc_new_password2", new.as_str());
        fetch(self.client, request)
    }

    pub fn security_info(&self) -> Result<SecurityInfoResponse> {
        let request = with_session_fields(self.client, Request::new("accounts/account_security_info/"));
        fetch(self.client, request)
    }

    /// Hide or show the account's activity status.
    pub fn set_presence_disabled(&self, disabled: bool) -> Result<GenericResponse> {
        let request = with_session_fields(self.client, Request::new("accounts/set_presence_disabled/"))
            .add_post("disabled", if disabled { "1" } else { "0" });
        fetch(self.client, request)
    }

    pub fn get_presence_status(&self) -> Result<PresenceStatusResponse> {
        let request = Request::new("accounts/get_presence_disabled/")
            .set_signed_get(true)
            .add_param("_uuid", self.client.device().uuid.as_str());
        fetch(self.client, request)
    }

    /// Fetch launcher configuration. The body is sent gzip-compressed.
    pub fn send_launcher_sync(&self) -> Result<GenericResponse> {
        let id = self
            .client
            .account_id()
            .unwrap_or_else(|| self.client.device().uuid.clone());
        let request = Request::new("launcher/sync/")
            .set_needs_auth(false)
            .set_body_compressed(true)
            .add_post("id", id)
            .add_post("server_config_retrieval", "1");
        fetch(self.client, request)
    }

    /// Returns `None` when the service throttles the call.
    pub fn contact_point_prefill(&self, usage: &str) -> Result<Option<GenericResponse>> {
        check_not_empty("usage", usage)?;
        let request = Request::new("accounts/contact_point_prefill/")
            .set_needs_auth(false)
            .set_silent_failure(true)
            .add_post("phone_id", self.client.device().phone_id.as_str())
            .add_post("usage", usage);
        fetch_optional(self.client, request)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use crate::error::{ApiError, ValidationError};
    use crate::http::HttpMethod;
    use crate::test_support::{form_fields, logged_in_client, query_pairs, scripted_client};

    #[test]
    fn create_validates_password_before_io() {
        let (client, transport) = scripted_client(vec![]);
        let short = client.account().create("someone", "abc12", "a@b.co").unwrap_err();
        assert!(matches!(short, ApiError::Validation(ValidationError::PasswordTooShort { min: 6 })));
        let common = client.account().create("someone", "password1", "a@b.co").unwrap_err();
        assert!(matches!(common, ApiError::Validation(ValidationError::PasswordBlacklisted)));
        let email = client.account().create("someone", "s3cure-enough", "nope").unwrap_err();
        assert!(matches!(email, ApiError::Validation(ValidationError::InvalidEmail(_))));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn create_sends_encrypted_password() {
        let (client, transport) = scripted_client(vec![(200, r#"{"account_created":true,"status":"ok"}"#)]);
        let reply = client.account().create("someone", "s3cure-enough", "a@b.co").unwrap();
        assert!(reply.account_created);

        let fields = form_fields(&transport.calls()[0]);
        let enc = fields["enc_password"].as_str().unwrap();
        assert!(enc.starts_with("#PWD_INSTAGRAM:0:"));
        assert!(enc.ends_with(":s3cure-enough"));
        assert_eq!(fields["username"], "someone");
    }

    #[test]
    fn biography_limit_is_enforced_locally() {
        let (client, transport) = logged_in_client(vec![]);
        let err = client.account().set_biography(&"x".repeat(151)).unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::BiographyTooLong { .. })));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn biography_is_sent_signed_with_session_fields() {
        let (client, transport) = logged_in_client(vec![(200, r#"{"status":"ok"}"#)]);
        client.account().set_biography("hello").unwrap();
        let fields = form_fields(&transport.calls()[0]);
        assert_eq!(fields["raw_text"], "hello");
        assert_eq!(fields["_uid"], "42");
    }

    #[test]
    fn gender_choices_are_checked() {
        let (client, transport) = logged_in_client(vec![(200, r#"{"status":"ok"}"#)]);
        assert!(matches!(
            client.account().set_gender("robot"),
            Err(ApiError::Validation(ValidationError::InvalidChoice { field: "gender", .. }))
        ));
        assert!(transport.calls().is_empty());

        client.account().set_gender("custom:they").unwrap();
        let fields = form_fields(&transport.calls()[0]);
        assert_eq!(fields["gender"], "4");
        assert_eq!(fields["custom_gender"], "they");
    }

    #[test]
    fn current_user_is_an_authenticated_get() {
        let (client, transport) = logged_in_client(vec![(200, r#"{"user":{"pk":42,"username":"me"},"status":"ok"}"#)]);
        let me = client.account().current_user().unwrap();
        assert_eq!(me.user.pk, "42");
        let call = &transport.calls()[0];
        assert_eq!(call.method, HttpMethod::Get);
        assert_eq!(query_pairs(call), vec![("edit".to_string(), "true".to_string())]);
    }

    #[test]
    fn launcher_sync_is_compressed() {
        let (client, transport) = scripted_client(vec![]);
        client.account().send_launcher_sync().unwrap();
        let call = &transport.calls()[0];
        assert_eq!(call.header("Content-Encoding"), Some("gzip"));
        let mut inflated = String::new();
        GzDecoder::new(call.body.as_deref().unwrap())
            .read_to_string(&mut inflated)
            .unwrap();
        assert!(inflated.starts_with("signed_body="));
    }

    #[test]
    fn prefill_throttling_yields_none() {
        let (client, _) = scripted_client(vec![(429, r#"{"status":"fail","message":"rate limited"}"#)]);
        assert_eq!(client.account().contact_point_prefill("prefill").unwrap(), None);
    }

    #[test]
    fn change_password_checks_new_password() {
        let (client, transport) = logged_in_client(vec![]);
        assert!(client.account().change_password("old-secret", "123456").is_err());
        assert!(transport.calls().is_empty());
    }
}
