//! Rank tokens, exclusion sets and continuation cursors.
//!
//! # Design
//! The engine itself is stateless per call: it decorates one outgoing request
//! with the exclusion list and rank token. `PaginationCursor` is the caller's
//! side of the contract, the value they keep between calls. Its exclusion set
//! only ever grows, and the presence of `next_max_id` is the only signal that
//! more pages exist.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::request::Request;

static RANK_TOKEN_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+_)?[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap_or_else(|e| panic!("rank token pattern is invalid: {e}"))
});

/// Opaque token that keeps ordering stable across the pages of one listing.
///
/// Accepts a bare UUID or the `<user id>_<uuid>` form the service issues.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RankToken(String);

impl RankToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if RANK_TOKEN_SHAPE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::InvalidRankToken(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RankToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RankToken {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RankToken> for String {
    fn from(token: RankToken) -> Self {
        token.0
    }
}

/// Responses that participate in cursor-based pagination.
pub trait Page {
    /// Server continuation token; `None` means the listing is exhausted.
    fn next_max_id(&self) -> Option<&str>;

    /// Ids of the entities on this page.
    fn item_ids(&self) -> Vec<String>;
}

/// Caller-held state for one logical paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationCursor {
    rank_token: RankToken,
    exclude_ids: BTreeSet<String>,
    next_max_id: Option<String>,
    started: bool,
}

impl PaginationCursor {
    pub fn new() -> Self {
        Self::with_rank_token(RankToken::generate())
    }

    pub fn with_rank_token(rank_token: RankToken) -> Self {
        Self {
            rank_token,
            exclude_ids: BTreeSet::new(),
            next_max_id: None,
            started: false,
        }
    }

    pub fn rank_token(&self) -> &RankToken {
        &self.rank_token
    }

    pub fn exclude_ids(&self) -> &BTreeSet<String> {
        &self.exclude_ids
    }

    pub fn next_max_id(&self) -> Option<&str> {
        self.next_max_id.as_deref()
    }

    /// False once a page came back without a continuation token.
    pub fn has_more(&self) -> bool {
        !self.started || self.next_max_id.is_some()
    }

    /// Record a received page: merge its ids and take its continuation token.
    pub fn advance<P: Page>(&mut self, page: &P) {
        self.started = true;
        self.exclude_ids.extend(page.item_ids());
        self.next_max_id = page.next_max_id().map(str::to_string);
    }
}

impl Default for PaginationCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decorate `request` for an exclusion-based listing.
///
/// Without exclusions only the page size is sent. With exclusions the rank
/// token becomes mandatory, because the service ties the excluded ids to the
/// ranking it handed out with that token.
pub fn paginate_with_exclusion(
    request: Request,
    exclude_ids: &[String],
    rank_token: Option<&RankToken>,
    limit: u32,
) -> Result<Request, ValidationError> {
    let request = request.add_param("count", limit.to_string());
    if exclude_ids.is_empty() {
        return Ok(match rank_token {
            Some(token) => request.add_param("rank_token", token.as_str()),
            None => request,
        });
    }
    let token = rank_token.ok_or(ValidationError::MissingRankToken)?;
    Ok(request
        .add_param("exclude_list", format!("[{}]", exclude_ids.join(", ")))
        .add_param("rank_token", token.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;

    struct FakePage {
        ids: Vec<&'static str>,
        next: Option<&'static str>,
    }

    impl Page for FakePage {
        fn next_max_id(&self) -> Option<&str> {
            self.next
        }

        fn item_ids(&self) -> Vec<String> {
            self.ids.iter().map(|s| s.to_string()).collect()
        }
    }

    #[test]
    fn accepts_uuid_and_prefixed_tokens() {
        assert!(RankToken::parse("8b2e1b4e-8c55-4a42-9a8e-6d1b4e3f2a10").is_ok());
        assert!(RankToken::parse("1234_8b2e1b4e-8c55-4a42-9a8e-6d1b4e3f2a10").is_ok());
        assert!(RankToken::parse(&RankToken::generate().to_string()).is_ok());
    }

    #[test]
    fn rejects_malformed_tokens() {
        for bad in ["", "abc", "8b2e1b4e8c554a429a8e6d1b4e3f2a10", "x_8b2e1b4e-8c55-4a42-9a8e-6d1b4e3f2a10"] {
            assert_eq!(
                RankToken::parse(bad),
                Err(ValidationError::InvalidRankToken(bad.to_string()))
            );
        }
    }

    #[test]
    fn rank_token_deserialization_validates() {
        let ok: RankToken = serde_json::from_str(r#""8b2e1b4e-8c55-4a42-9a8e-6d1b4e3f2a10""#).unwrap();
        assert_eq!(ok.as_str(), "8b2e1b4e-8c55-4a42-9a8e-6d1b4e3f2a10");
        assert!(serde_json::from_str::<RankToken>(r#""nope""#).is_err());
    }

    #[test]
    fn cursor_exclusions_only_grow() {
        let mut cursor = PaginationCursor::new();
        assert!(cursor.has_more());

        cursor.advance(&FakePage { ids: vec!["1", "2"], next: Some("m1") });
        let after_first = cursor.exclude_ids().clone();
        cursor.advance(&FakePage { ids: vec!["3"], next: Some("m2") });
        assert!(cursor.exclude_ids().is_superset(&after_first));
        assert_eq!(cursor.exclude_ids().len(), 3);
        assert_eq!(cursor.next_max_id(), Some("m2"));

        cursor.advance(&FakePage { ids: vec![], next: None });
        assert_eq!(cursor.exclude_ids().len(), 3);
        assert!(!cursor.has_more());
    }

    #[test]
    fn first_page_sends_count_only() {
        let req = paginate_with_exclusion(Request::new("users/search/"), &[], None, 30).unwrap();
        assert_eq!(req.query().get("count"), Some(&ParamValue::Str("30".into())));
        assert!(req.query().get("exclude_list").is_none());
        assert!(req.query().get("rank_token").is_none());
    }

    #[test]
    fn exclusion_requires_rank_token() {
        let err = paginate_with_exclusion(Request::new("users/search/"), &["1".to_string()], None, 30)
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingRankToken);
    }

    #[test]
    fn exclusion_list_is_bracketed() {
        let token = RankToken::generate();
        let req = paginate_with_exclusion(
            Request::new("users/search/"),
            &["11".to_string(), "22".to_string()],
            Some(&token),
            30,
        )
        .unwrap();
        assert_eq!(req.query().get("exclude_list"), Some(&ParamValue::Str("[11, 22]".into())));
        assert_eq!(req.query().get("rank_token"), Some(&ParamValue::Str(token.to_string())));
    }
}
