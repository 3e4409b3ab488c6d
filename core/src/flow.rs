//! Multi-step wizard state and the coordinator that advances it.
//!
//! # Design
//! A wizard is a fixed table of steps. Each step knows its position, its
//! name and the literal marker the reply must contain for the step to count
//! as accepted. The remote side has no formal state field, so the marker
//! check is the whole protocol; it lives in one predicate per step so a
//! changed marker is a one-line fix.
//!
//! `FlowState` is owned by the caller and passed by `&mut` into each step.
//! The coordinator mutates it only after a step fully succeeds: a failed step
//! leaves counter, server parameters and profile untouched and marks the
//! state aborted. An aborted or completed state rejects every further step
//! before any I/O, since the server-side wizard is already partially
//! consumed and cannot be resumed.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::error::{ApiError, Result};
use crate::request::Request;
use crate::response::{excerpt, Response};

/// Which wizard a state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Registration,
    TotpSetup,
}

impl FlowKind {
    pub fn name(self) -> &'static str {
        match self {
            FlowKind::Registration => "registration",
            FlowKind::TotpSetup => "totp setup",
        }
    }
}

/// User-facing values a wizard collects along the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    ContactPoint,
    ConfirmationCode,
    /// Stored in its encrypted envelope form, never as plaintext.
    Password,
    Birthday,
    FullName,
    Username,
    TotpSeed,
}

/// One row of a wizard's step table.
pub trait FlowStep: Copy + fmt::Debug {
    const KIND: FlowKind;

    /// 1-based position in the wizard.
    fn index(self) -> u32;

    fn name(self) -> &'static str;

    /// Literal substring the reply must contain.
    fn marker(self) -> &'static str;

    /// Profile fields that must be confirmed before this step may be sent.
    fn requires(self) -> &'static [ProfileField];

    fn is_terminal(self) -> bool;

    fn milestone_reached(self, body: &str) -> bool {
        body.contains(self.marker())
    }
}

const BLOKS_APP_PREFIX: &str = "com.bloks.www.bloks.caa.reg.";

/// Steps of the bloks account registration wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStep {
    ContactPoint,
    Confirmation,
    Password,
    Birthday,
    Name,
    Username,
    Create,
}

impl RegistrationStep {
    pub const ALL: [RegistrationStep; 7] = [
        RegistrationStep::ContactPoint,
        RegistrationStep::Confirmation,
        RegistrationStep::Password,
        RegistrationStep::Birthday,
        RegistrationStep::Name,
        RegistrationStep::Username,
        RegistrationStep::Create,
    ];

    fn screen(self) -> &'static str {
        match self {
            RegistrationStep::ContactPoint => "contactpoint_email",
            RegistrationStep::Confirmation => "confirmation",
            RegistrationStep::Password => "password",
            RegistrationStep::Birthday => "birthday",
            RegistrationStep::Name => "name_ig_and_soap",
            RegistrationStep::Username => "username",
            RegistrationStep::Create => "create.account",
        }
    }

    /// Bloks app the step posts to.
    pub fn app(self) -> String {
        format!("{BLOKS_APP_PREFIX}{}.async", self.screen())
    }
}

impl FlowStep for RegistrationStep {
    const KIND: FlowKind = FlowKind::Registration;

    fn index(self) -> u32 {
        self as u32 + 1
    }

    fn name(self) -> &'static str {
        match self {
            RegistrationStep::ContactPoint => "contact_point",
            RegistrationStep::Confirmation => "confirmation",
            RegistrationStep::Password => "password",
            RegistrationStep::Birthday => "birthday",
            RegistrationStep::Name => "name",
            RegistrationStep::Username => "username",
            RegistrationStep::Create => "create",
        }
    }

    fn marker(self) -> &'static str {
        match self {
            RegistrationStep::ContactPoint => "com.bloks.www.bloks.caa.reg.confirmation",
            RegistrationStep::Confirmation => "com.bloks.www.bloks.caa.reg.password",
            RegistrationStep::Password => "com.bloks.www.bloks.caa.reg.birthday",
            RegistrationStep::Birthday => "com.bloks.www.bloks.caa.reg.name_ig_and_soap",
            RegistrationStep::Name => "com.bloks.www.bloks.caa.reg.username",
            RegistrationStep::Username => "com.bloks.www.bloks.caa.reg.create.account",
            RegistrationStep::Create => "logged_in_user",
        }
    }

    fn requires(self) -> &'static [ProfileField] {
        use ProfileField::*;
        match self {
            RegistrationStep::ContactPoint => &[],
            RegistrationStep::Confirmation => &[ContactPoint],
            RegistrationStep::Password => &[ContactPoint, ConfirmationCode],
            RegistrationStep::Birthday => &[ContactPoint, Password],
            RegistrationStep::Name => &[ContactPoint, Birthday],
            RegistrationStep::Username => &[ContactPoint, FullName],
            RegistrationStep::Create => &[ContactPoint, ConfirmationCode, Password, Birthday, FullName, Username],
        }
    }

    fn is_terminal(self) -> bool {
        self == RegistrationStep::Create
    }
}

/// Steps of the authenticator-app two-factor setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotpStep {
    GenerateKey,
    Enable,
}

impl FlowStep for TotpStep {
    const KIND: FlowKind = FlowKind::TotpSetup;

    fn index(self) -> u32 {
        self as u32 + 1
    }

    fn name(self) -> &'static str {
        match self {
            TotpStep::GenerateKey => "generate_key",
            TotpStep::Enable => "enable",
        }
    }

    fn marker(self) -> &'static str {
        match self {
            TotpStep::GenerateKey => "totp_seed",
            TotpStep::Enable => "backup_codes",
        }
    }

    fn requires(self) -> &'static [ProfileField] {
        match self {
            TotpStep::GenerateKey => &[],
            TotpStep::Enable => &[ProfileField::TotpSeed],
        }
    }

    fn is_terminal(self) -> bool {
        self == TotpStep::Enable
    }
}

/// Caller-held state of one wizard run.
///
/// Serializable so a caller can persist it between steps; the shape must be
/// handed back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    kind: FlowKind,
    correlation_ids: BTreeMap<String, String>,
    server_params: Map<String, Value>,
    step_counter: u32,
    profile: BTreeMap<ProfileField, String>,
    aborted: bool,
    completed: bool,
}

impl FlowState {
    /// Fresh state with a new v4 UUID for each correlation id name.
    pub(crate) fn start(kind: FlowKind, correlation_names: &[&str]) -> Self {
        Self {
            kind,
            correlation_ids: correlation_names
                .iter()
                .map(|name| (name.to_string(), Uuid::new_v4().to_string()))
                .collect(),
            server_params: Map::new(),
            step_counter: 0,
            profile: BTreeMap::new(),
            aborted: false,
            completed: false,
        }
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    pub fn correlation_ids(&self) -> &BTreeMap<String, String> {
        &self.correlation_ids
    }

    pub fn correlation_id(&self, name: &str) -> Option<&str> {
        self.correlation_ids.get(name).map(String::as_str)
    }

    pub fn server_params(&self) -> &Map<String, Value> {
        &self.server_params
    }

    /// Index of the last step that completed, 0 before the first.
    pub fn step_counter(&self) -> u32 {
        self.step_counter
    }

    pub fn profile(&self, field: ProfileField) -> Option<&str> {
        self.profile.get(&field).map(String::as_str)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Merge by replacement; correlation ids are never overwritten.
    fn merge_server_params(&mut self, extracted: Map<String, Value>) {
        for (key, value) in extracted {
            if !self.correlation_ids.contains_key(&key) {
                self.server_params.insert(key, value);
            }
        }
    }
}

/// Value produced by a successful step plus the profile fields it confirmed.
pub(crate) struct Settled<T> {
    value: T,
    confirmed: Vec<(ProfileField, String)>,
}

impl<T> Settled<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            value,
            confirmed: Vec::new(),
        }
    }

    pub(crate) fn confirm(mut self, field: ProfileField, value: impl Into<String>) -> Self {
        self.confirmed.push((field, value.into()));
        self
    }
}

fn protocol_error<S: FlowStep>(step: S, reason: impl Into<String>) -> ApiError {
    ApiError::FlowProtocol {
        flow: S::KIND.name(),
        step: step.name(),
        index: step.index(),
        reason: reason.into(),
    }
}

/// Reject a step that may not be sent from `state`. No I/O happens here.
pub(crate) fn check_ready<S: FlowStep>(state: &FlowState, step: S) -> Result<()> {
    if state.kind != S::KIND {
        return Err(protocol_error(step, format!("state belongs to a {} flow", state.kind.name())));
    }
    if state.aborted {
        return Err(protocol_error(step, "flow was aborted, start a new one"));
    }
    if state.completed {
        return Err(protocol_error(step, "flow already completed"));
    }
    if step.index() != state.step_counter + 1 {
        return Err(protocol_error(
            step,
            format!("out of order: last completed step is {}", state.step_counter),
        ));
    }
    if let Some(missing) = step.requires().iter().find(|f| !state.profile.contains_key(f)) {
        return Err(protocol_error(step, format!("{missing:?} has not been confirmed by an earlier step")));
    }
    Ok(())
}

/// Send one step and, on success, commit its effects to `state`.
///
/// `settle` runs after the milestone check and turns the reply into the
/// step's result; its failure aborts the flow like any other.
pub(crate) fn advance<S, T>(
    client: &ApiClient,
    state: &mut FlowState,
    step: S,
    build: impl FnOnce(&FlowState) -> Request,
    settle: impl FnOnce(&Response) -> Result<Settled<T>>,
) -> Result<T>
where
    S: FlowStep,
{
    check_ready(state, step)?;
    let request = build(state);

    let settled = client.send(&request).and_then(|response| {
        let body = response.as_raw_text();
        if !step.milestone_reached(body) {
            warn!(
                flow = S::KIND.name(),
                step = step.name(),
                marker = step.marker(),
                body = excerpt(body, 200),
                "milestone missing from reply"
            );
            return Err(protocol_error(
                step,
                format!("expected milestone {:?} missing from reply", step.marker()),
            ));
        }
        let extracted = extract_server_params(client, body);
        settle(&response).map(|settled| (settled, extracted))
    });

    let (settled, extracted) = match settled {
        Ok(ok) => ok,
        Err(err) => {
            warn!(flow = S::KIND.name(), step = step.name(), error = %err, "flow aborted");
            state.aborted = true;
            return Err(err);
        }
    };

    state.merge_server_params(extracted);
    state.step_counter = step.index();
    state.profile.extend(settled.confirmed);
    state.completed = step.is_terminal();
    debug!(
        flow = S::KIND.name(),
        step = step.name(),
        counter = state.step_counter,
        server_params = state.server_params.len(),
        "flow step accepted"
    );
    Ok(settled.value)
}

fn extract_server_params(client: &ApiClient, body: &str) -> Map<String, Value> {
    let bloks = client.bloks();
    bloks
        .parse(body, "server_params")
        .iter()
        .flat_map(|fragment| bloks.extract_map(fragment, "server_params"))
        .collect()
}
