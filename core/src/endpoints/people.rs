//! Relationships between the logged-in account and other users.

use serde_json::Value;

use super::{fetch, fetch_optional, with_session_fields};
use crate::client::ApiClient;
use crate::error::{ApiError, Result};
use crate::models::{
    BlockedListResponse, BootstrapUsersResponse, FriendshipResponse, FriendshipStatus,
    FriendshipsShowManyResponse, GenericResponse, SearchUserResponse, SuggestedUsersResponse,
    UserInfoResponse, UserListResponse,
};
use crate::pagination::{paginate_with_exclusion, PaginationCursor, RankToken};
use crate::request::Request;
use crate::validation::{check_not_empty, check_query, path_segment, MediaKind};

/// Operations on other users.
pub struct People<'a> {
    client: &'a ApiClient,
}

impl<'a> People<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub fn get_info_by_id(&self, user_id: &str) -> Result<UserInfoResponse> {
        let user_id = path_segment("user id", user_id)?;
        fetch(self.client, Request::new(format!("users/{user_id}/info/")))
    }

    pub fn get_info_by_name(&self, username: &str) -> Result<UserInfoResponse> {
        let username = path_segment("username", username)?;
        fetch(self.client, Request::new(format!("users/{username}/usernameinfo/")))
    }

    pub fn get_friendship(&self, user_id: &str) -> Result<FriendshipStatus> {
        let user_id = path_segment("user id", user_id)?;
        fetch(self.client, Request::new(format!("friendships/show/{user_id}/")))
    }

    pub fn get_friendships(&self, user_ids: &[&str]) -> Result<FriendshipsShowManyResponse> {
        if user_ids.is_empty() {
            return Err(crate::error::ValidationError::EmptyField("user ids").into());
        }
        let request = Request::new("friendships/show_many/")
            .set_signed_post(false)
            .add_post("_uuid", self.client.device().uuid.as_str())
            .add_post("user_ids", user_ids.join(","));
        fetch(self.client, request)
    }

    pub fn follow(&self, user_id: &str) -> Result<FriendshipResponse> {
        self.change_friendship("create", user_id)
    }

    pub fn unfollow(&self, user_id: &str) -> Result<FriendshipResponse> {
        self.change_friendship("destroy", user_id)
    }

    pub fn block(&self, user_id: &str) -> Result<FriendshipResponse> {
        self.change_friendship("block", user_id)
    }

    pub fn unblock(&self, user_id: &str) -> Result<FriendshipResponse> {
        self.change_friendship("unblock", user_id)
    }

    pub fn remove_follower(&self, user_id: &str) -> Result<FriendshipResponse> {
        self.change_friendship("remove_follower", user_id)
    }

    pub fn approve_friendship(&self, user_id: &str) -> Result<FriendshipResponse> {
        self.change_friendship("approve", user_id)
    }

    pub fn reject_friendship(&self, user_id: &str) -> Result<FriendshipResponse> {
        self.change_friendship("ignore", user_id)
    }

    pub fn favorite(&self, user_id: &str) -> Result<FriendshipResponse> {
        self.change_friendship("favorite", user_id)
    }

    pub fn unfavorite(&self, user_id: &str) -> Result<FriendshipResponse> {
        self.change_friendship("unfavorite", user_id)
    }

    fn change_friendship(&self, action: &str, user_id: &str) -> Result<FriendshipResponse> {
        let segment = path_segment("user id", user_id)?;
        let request = with_session_fields(self.client, Request::new(format!("friendships/{action}/{segment}/")))
            .add_post("user_id", user_id)
            .add_post("radio_type", "wifi-none");
        fetch(self.client, request)
    }

    pub fn restrict(&self, user_id: &str) -> Result<GenericResponse> {
        self.restrict_action("restrict", user_id)
    }

    pub fn unrestrict(&self, user_id: &str) -> Result<GenericResponse> {
        self.restrict_action("unrestrict", user_id)
    }

    fn restrict_action(&self, action: &str, user_id: &str) -> Result<GenericResponse> {
        check_not_empty("user id", user_id)?;
        let request = Request::new(format!("restrict_action/{action}/"))
            .set_signed_post(false)
            .add_post("_uuid", self.client.device().uuid.as_str())
            .add_post("target_user_id", user_id);
        fetch(self.client, request)
    }

    /// `kind` is `post`, `story` or `all`.
    pub fn mute_user_media(&self, user_id: &str, kind: &str) -> Result<GenericResponse> {
        self.mute_action("mute_posts_or_story_from_follow", user_id, kind)
    }

    pub fn unmute_user_media(&self, user_id: &str, kind: &str) -> Result<GenericResponse> {
        self.mute_action("unmute_posts_or_story_from_follow", user_id, kind)
    }

    fn mute_action(&self, action: &str, user_id: &str, kind: &str) -> Result<GenericResponse> {
        check_not_empty("user id", user_id)?;
        let kind: MediaKind = kind.parse()?;
        let mut request = with_session_fields(self.client, Request::new(format!("friendships/{action}/")));
        if matches!(kind, MediaKind::Post | MediaKind::All) {
            request = request.add_post("target_posts_author_id", user_id);
        }
        if matches!(kind, MediaKind::Story | MediaKind::All) {
            request = request.add_post("target_reel_author_id", user_id);
        }
        fetch(self.client, request)
    }

    /// Add and remove users from the close friends list in one call.
    pub fn set_close_friends(&self, add: &[&str], remove: &[&str]) -> Result<GenericResponse> {
        let as_json = |ids: &[&str]| Value::from(ids.iter().map(|id| Value::from(*id)).collect::<Vec<_>>());
        let request = with_session_fields(self.client, Request::new("friendships/set_besties/"))
            .add_post("module", "favorites_home_list")
            .add_post("add", as_json(add))
            .add_post("remove", as_json(remove));
        fetch(self.client, request)
    }

    pub fn get_close_friends(&self) -> Result<UserListResponse> {
        fetch(self.client, Request::new("friendships/besties/"))
    }

    /// One page of the accounts `user_id` follows.
    ///
    /// A caller-supplied rank token is validated before any I/O; without one a
    /// fresh token is generated.
    pub fn get_following(
        &self,
        user_id: &str,
        rank_token: Option<&str>,
        query: Option<&str>,
        max_id: Option<&str>,
    ) -> Result<UserListResponse> {
        self.follow_listing("following", user_id, rank_token, query, max_id)
    }

    pub fn get_followers(
        &self,
        user_id: &str,
        rank_token: Option<&str>,
        query: Option<&str>,
        max_id: Option<&str>,
    ) -> Result<UserListResponse> {
        self.follow_listing("followers", user_id, rank_token, query, max_id)
    }

    fn follow_listing(
        &self,
        which: &str,
        user_id: &str,
        rank_token: Option<&str>,
        query: Option<&str>,
        max_id: Option<&str>,
    ) -> Result<UserListResponse> {
        let user_id = path_segment("user id", user_id)?;
        let token = match rank_token {
            Some(raw) => RankToken::parse(raw)?,
            None => RankToken::generate(),
        };
        let mut request = Request::new(format!("friendships/{user_id}/{which}/"))
            .add_param("rank_token", token.as_str());
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            request = request.add_param("query", query);
        }
        if let Some(max_id) = max_id {
            request = request.add_param("max_id", max_id);
        }
        fetch(self.client, request)
    }

    /// One page of user search results.
    ///
    /// `exclude` holds the ids already shown for this query. When it grows
    /// too large to fit in a request, the search ends with an empty page
    /// instead of an error.
    pub fn search(&self, query: &str, exclude: &[String], rank_token: Option<&str>) -> Result<SearchUserResponse> {
        check_query(query)?;
        let token = match rank_token {
            Some(raw) => RankToken::parse(raw)?,
            None => RankToken::generate(),
        };
        let request = Request::new("users/search/")
            .add_param("q", query)
            .add_param("timezone_offset", self.client.config().timezone_offset)
            .add_param("search_surface", "user_search_page");
        let request = paginate_with_exclusion(
            request,
            exclude,
            Some(&token),
            self.client.config().search_page_size,
        )?;

        match fetch::<SearchUserResponse>(self.client, request) {
            Ok(mut page) => {
                page.rank_token = token.to_string();
                Ok(page)
            }
            Err(ApiError::RequestHeadersTooLarge) => Ok(SearchUserResponse::exhausted(&token)),
            Err(err) => Err(err),
        }
    }

    /// Fetch the next search page for `cursor` and record it.
    pub fn search_next(&self, query: &str, cursor: &mut PaginationCursor) -> Result<SearchUserResponse> {
        let exclude: Vec<String> = cursor.exclude_ids().iter().cloned().collect();
        let page = self.search(query, &exclude, Some(cursor.rank_token().as_str()))?;
        cursor.advance(&page);
        Ok(page)
    }

    /// Accounts similar to `user_id`. Throttling is reported as an error.
    pub fn get_suggested_users(&self, user_id: &str) -> Result<SuggestedUsersResponse> {
        check_not_empty("user id", user_id)?;
        fetch(self.client, Request::new("discover/chaining/").add_param("target_id", user_id))
    }

    /// Returns `None` when the service throttles the call.
    pub fn get_bootstrap_users(&self) -> Result<Option<BootstrapUsersResponse>> {
        let request = Request::new("scores/bootstrap/users/")
            .set_silent_failure(true)
            .add_param("surfaces", r#"["autocomplete_user_list","coefficient_besties_list_ranking","coefficient_rank_recipient_user_suggestion"]"#);
        fetch_optional(self.client, request)
    }

    pub fn get_blocked_list(&self, max_id: Option<&str>) -> Result<BlockedListResponse> {
        let mut request = Request::new("users/blocked_list/");
        if let Some(max_id) = max_id {
            request = request.add_param("max_id", max_id);
        }
        fetch(self.client, request)
    }

    pub fn get_pending_friendships(&self) -> Result<UserListResponse> {
        fetch(self.client, Request::new("friendships/pending/"))
    }
}
