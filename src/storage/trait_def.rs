use crate::models::{Hit, HitCounter, NewHit, Post};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the write (for hits: an active hit
    /// already exists for the same user or session)
    #[error("record already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Persist a new session key
    async fn create_session(&self, session_key: &str) -> StorageResult<()>;

    /// Check whether a session key has been persisted
    async fn session_exists(&self, session_key: &str) -> Result<bool>;

    /// Exact-match lookup against the IP blacklist
    async fn is_ip_blacklisted(&self, ip: &str) -> Result<bool>;

    /// Exact-match lookup against the user agent blacklist
    async fn is_user_agent_blacklisted(&self, user_agent: &str) -> Result<bool>;

    /// Add an IP to the blacklist. Returns false if it was already present.
    async fn add_blacklisted_ip(&self, ip: &str) -> Result<bool>;

    async fn remove_blacklisted_ip(&self, ip: &str) -> Result<bool>;

    async fn list_blacklisted_ips(&self) -> Result<Vec<String>>;

    /// Add a user agent to the blacklist. Returns false if it was already present.
    async fn add_blacklisted_user_agent(&self, user_agent: &str) -> Result<bool>;

    async fn remove_blacklisted_user_agent(&self, user_agent: &str) -> Result<bool>;

    async fn list_blacklisted_user_agents(&self) -> Result<Vec<String>>;

    /// Get a hit counter by primary key
    async fn get_hit_counter(&self, id: i64) -> Result<Option<HitCounter>>;

    /// Get the counter attached to a content object, creating it on first use
    async fn get_or_create_hit_counter(
        &self,
        content_type: &str,
        object_pk: &str,
    ) -> Result<HitCounter>;

    /// Count hits for a counter created at or after `active_since` that are still flagged active
    async fn count_active_hits(&self, counter_id: i64, active_since: i64) -> Result<i64>;

    /// Count active hits from an IP across all counters
    async fn count_active_hits_for_ip(&self, ip: &str, active_since: i64) -> Result<i64>;

    /// Insert a hit unless an active one exists for the same counter and user
    /// (authenticated) or counter and session key (anonymous). For anonymous
    /// hits any active hit on the session counts, including one recorded by
    /// an authenticated user.
    ///
    /// Hits for the same key created before `active_since` are deactivated in
    /// the same transaction. Returns [`StorageError::Conflict`] when an active
    /// hit already exists.
    async fn create_hit(&self, hit: &NewHit, active_since: i64) -> StorageResult<Hit>;

    /// List all hits recorded for a counter, newest first
    async fn list_hits(&self, counter_id: i64) -> Result<Vec<Hit>>;

    /// Clear the active flag on every hit created before `active_since`
    async fn expire_hits(&self, active_since: i64) -> Result<u64>;

    /// Delete hits created before `cutoff`
    async fn delete_hits_before(&self, cutoff: i64) -> Result<u64>;

    /// Create a blog post
    async fn create_post(&self, title: &str, content: &str) -> Result<Post>;

    /// Get a blog post by id
    async fn get_post(&self, id: i64) -> Result<Option<Post>>;
}
