//! Typed views of the replies the endpoint catalog decodes.
//!
//! Fields without `#[serde(default)]` are required: a reply missing one is
//! reported as `ApiError::SchemaValidation` naming the field. Entity ids are
//! kept as strings because the service sends them as numbers on some
//! endpoints and as strings on others.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pagination::{Page, RankToken};

/// Accepts an id encoded either as a JSON number or a JSON string.
pub(crate) mod id_format {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u64),
        Str(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match RawId::deserialize(d)? {
            RawId::Num(n) => n.to_string(),
            RawId::Str(s) => s,
        })
    }

    pub fn serialize<S: Serializer>(id: &str, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(with = "id_format")]
    pub pk: String,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
}

/// The logged-in account as returned by `accounts/current_user/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(with = "id_format")]
    pub pk: String,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub biography: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub gender: Option<u8>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUserResponse {
    pub user: CurrentUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub user: User,
}

/// Relationship between the logged-in account and one other user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FriendshipStatus {
    pub following: bool,
    pub followed_by: bool,
    pub blocking: bool,
    pub muting: bool,
    pub is_private: bool,
    pub incoming_request: bool,
    pub outgoing_request: bool,
    pub is_bestie: bool,
    pub is_restricted: bool,
    pub is_muting_reel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendshipResponse {
    pub friendship_status: FriendshipStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendshipsShowManyResponse {
    pub friendship_statuses: BTreeMap<String, FriendshipStatus>,
}

/// A page of users from a follow-style listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    #[serde(default)]
    pub next_max_id: Option<String>,
    #[serde(default)]
    pub big_list: bool,
}

impl Page for UserListResponse {
    fn next_max_id(&self) -> Option<&str> {
        self.next_max_id.as_deref()
    }

    fn item_ids(&self) -> Vec<String> {
        self.users.iter().map(|u| u.pk.clone()).collect()
    }
}

/// A page of user search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchUserResponse {
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub num_results: u32,
    pub users: Vec<User>,
    #[serde(default)]
    pub rank_token: String,
    #[serde(default)]
    pub next_max_id: Option<String>,
}

impl SearchUserResponse {
    /// The page returned when the exclusion list no longer fits in a request.
    pub fn exhausted(rank_token: &RankToken) -> Self {
        Self {
            has_more: false,
            num_results: 0,
            users: Vec::new(),
            rank_token: rank_token.to_string(),
            next_max_id: None,
        }
    }
}

impl Page for SearchUserResponse {
    fn next_max_id(&self) -> Option<&str> {
        self.next_max_id.as_deref()
    }

    fn item_ids(&self) -> Vec<String> {
        self.users.iter().map(|u| u.pk.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedUser {
    #[serde(with = "id_format")]
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedListResponse {
    pub blocked_list: Vec<BlockedUser>,
    #[serde(default)]
    pub next_max_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedUsersResponse {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapUsersResponse {
    pub users: Vec<User>,
    pub surfaces: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckUsernameResponse {
    pub username: String,
    pub available: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckEmailResponse {
    pub valid: bool,
    pub available: bool,
    #[serde(default)]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendVerifyEmailResponse {
    pub email_sent: bool,
    #[serde(default)]
    pub require_captcha: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfirmationCodeResponse {
    pub signup_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCreateResponse {
    pub account_created: bool,
    #[serde(default)]
    pub created_user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityInfoResponse {
    pub is_two_factor_enabled: bool,
    pub is_totp_two_factor_enabled: bool,
    pub is_phone_confirmed: bool,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStatusResponse {
    pub disabled: bool,
}

/// Replies that carry nothing beyond the envelope status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericResponse {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpSeedResponse {
    pub totp_seed: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

/// Account produced by the registration wizard's final step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedAccount {
    #[serde(with = "id_format")]
    pub pk: String,
    pub username: String,
}
