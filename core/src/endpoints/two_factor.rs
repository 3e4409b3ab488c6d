//! Authenticator-app (TOTP) two-factor setup.

use super::with_session_fields;
use crate::client::ApiClient;
use crate::error::Result;
use crate::flow::{advance, FlowKind, FlowState, ProfileField, Settled, TotpStep};
use crate::models::{BackupCodesResponse, TotpSeedResponse};
use crate::request::Request;
use crate::validation::check_not_empty;

const FLOW_ID: &str = "totp_flow_id";

/// Two-step setup: generate a seed, then confirm it with a code from the
/// authenticator app.
pub struct TwoFactor<'a> {
    client: &'a ApiClient,
}

impl<'a> TwoFactor<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Ask the server for a new TOTP seed. The caller shows it to the user
    /// and keeps the returned state for [`TwoFactor::enable`].
    pub fn start(&self) -> Result<(FlowState, String)> {
        let mut state = FlowState::start(FlowKind::TotpSetup, &[FLOW_ID]);
        let seed = advance(
            self.client,
            &mut state,
            TotpStep::GenerateKey,
            |state| self.request("accounts/generate_two_factor_totp_key/", state),
            |response| {
                let seed = response.as_typed::<TotpSeedResponse>()?.totp_seed;
                Ok(Settled::new(seed.clone()).confirm(ProfileField::TotpSeed, seed))
            },
        )?;
        Ok((state, seed))
    }

    /// Confirm the seed and turn two-factor on. Returns the backup codes.
    pub fn enable(&self, state: &mut FlowState, verification_code: &str) -> Result<Vec<String>> {
        check_not_empty("verification code", verification_code)?;
        advance(
            self.client,
            state,
            TotpStep::Enable,
            |state| {
                self.request("accounts/enable_totp_two_factor/", state)
                    .add_post("verification_code", verification_code)
            },
            |response| Ok(Settled::new(response.as_typed::<BackupCodesResponse>()?.backup_codes)),
        )
    }

    fn request(&self, endpoint: &str, state: &FlowState) -> Request {
        let request = with_session_fields(self.client, Request::new(endpoint));
        match state.correlation_id(FLOW_ID) {
            Some(id) => request.add_post(FLOW_ID, id),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ApiError;
    use crate::flow::ProfileField;
    use crate::test_support::{form_fields, logged_in_client, scripted_client};

    #[test]
    fn requires_a_session() {
        let (client, transport) = scripted_client(vec![]);
        assert!(matches!(
            client.two_factor().start(),
            Err(ApiError::AuthenticationRequired { .. })
        ));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn seed_then_backup_codes() {
        let (client, transport) = logged_in_client(vec![
            (200, r#"{"totp_seed":"JBSWY3DPEHPK3PXP","status":"ok"}"#),
            (200, r#"{"backup_codes":["1111 2222","3333 4444"],"status":"ok"}"#),
        ]);
        let tf = client.two_factor();
        let (mut state, seed) = tf.start().unwrap();
        assert_eq!(seed, "JBSWY3DPEHPK3PXP");
        assert_eq!(state.profile(ProfileField::TotpSeed), Some("JBSWY3DPEHPK3PXP"));

        let codes = tf.enable(&mut state, "123456").unwrap();
        assert_eq!(codes, vec!["1111 2222", "3333 4444"]);
        assert!(state.is_completed());

        let calls = transport.calls();
        let flow_id = state.correlation_id("totp_flow_id").unwrap();
        for call in &calls {
            assert_eq!(form_fields(call)["totp_flow_id"], flow_id);
        }
        assert_eq!(form_fields(&calls[1])["verification_code"], "123456");
    }

    #[test]
    fn reply_without_backup_codes_aborts() {
        let (client, _) = logged_in_client(vec![
            (200, r#"{"totp_seed":"JBSWY3DPEHPK3PXP","status":"ok"}"#),
            (200, r#"{"status":"ok"}"#),
        ]);
        let tf = client.two_factor();
        let (mut state, _) = tf.start().unwrap();
        assert!(matches!(
            tf.enable(&mut state, "123456"),
            Err(ApiError::FlowProtocol { index: 2, .. })
        ));
        assert!(state.is_aborted());
        assert_eq!(state.step_counter(), 1);
    }
}
