use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Maximum stored length of a user agent string, in characters.
pub const USER_AGENT_MAX_LEN: usize = 255;

/// Counter attached one-to-one to a content object identified by
/// `(content_type, object_pk)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct HitCounter {
    pub id: i64,
    pub content_type: String,
    pub object_pk: String,
    pub created_at: i64,
}

/// One recorded visit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Hit {
    pub id: i64,
    pub counter_id: i64,
    pub user_id: Option<String>,
    pub session_key: String,
    pub ip: String,
    pub user_agent: String,
    pub domain: String,
    pub created_at: i64,
    pub is_active: bool,
}

/// Insert payload for [`Hit`].
#[derive(Debug, Clone)]
pub struct NewHit {
    pub counter_id: i64,
    pub user_id: Option<String>,
    pub session_key: String,
    pub ip: String,
    pub user_agent: String,
    pub domain: String,
    pub created_at: i64,
}

/// Truncate a user agent to [`USER_AGENT_MAX_LEN`] characters without
/// splitting a UTF-8 sequence.
pub fn truncate_user_agent(user_agent: &str) -> String {
    user_agent.chars().take(USER_AGENT_MAX_LEN).collect()
}
