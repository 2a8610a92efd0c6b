use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{debug, info};

use super::decision::{HitCountResponse, HitDecision};
use crate::auth::Visitor;
use crate::config::HitCountConfig;
use crate::models::{HitCounter, NewHit};
use crate::request::{SessionSigner, Visit};
use crate::storage::{Storage, StorageError};

/// Attempts at generating an unused session key before giving up
const SESSION_KEY_ATTEMPTS: usize = 3;

/// Decides whether a visit counts as a new hit and records it.
pub struct HitCountService {
    storage: Arc<dyn Storage>,
    config: HitCountConfig,
}

impl HitCountService {
    pub fn new(storage: Arc<dyn Storage>, config: HitCountConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &HitCountConfig {
        &self.config
    }

    /// Oldest `created_at` still inside the active window
    fn active_since(&self, now: i64) -> i64 {
        now - self.config.keep_hit_active_secs
    }

    /// Make sure the visit carries a persisted session key, creating one if needed
    pub async fn ensure_session(&self, visit: &mut Visit) -> Result<String> {
        if let Some(key) = visit.session_key() {
            return Ok(key.to_string());
        }

        for _ in 0..SESSION_KEY_ATTEMPTS {
            let key = SessionSigner::generate_key();
            match self.storage.create_session(&key).await {
                Ok(()) => {
                    debug!("Created new session");
                    visit.attach_new_session(key.clone());
                    return Ok(key);
                }
                Err(StorageError::Conflict) => continue,
                Err(StorageError::Other(e)) => return Err(e),
            }
        }

        bail!("failed to generate a unique session key")
    }

    /// Evaluate the visit and record a hit when it qualifies.
    ///
    /// Rejections are returned as a negative response; only storage failures
    /// produce an error.
    pub async fn hit_count(
        &self,
        visit: &mut Visit,
        counter: &HitCounter,
    ) -> Result<HitCountResponse> {
        let decision = self.evaluate(visit, counter).await?;

        debug!(
            counter_id = counter.id,
            ip = %visit.ip,
            counted = decision.is_counted(),
            "{}",
            decision.message()
        );

        Ok(decision.into())
    }

    /// Run the eligibility checks in order; the first match wins.
    pub async fn evaluate(&self, visit: &mut Visit, counter: &HitCounter) -> Result<HitDecision> {
        let session_key = self.ensure_session(visit).await?;

        if self.storage.is_ip_blacklisted(&visit.ip).await? {
            return Ok(HitDecision::IpBlacklisted);
        }

        if self
            .storage
            .is_user_agent_blacklisted(&visit.user_agent)
            .await?
        {
            return Ok(HitDecision::UserAgentBlacklisted);
        }

        let excluded = &self.config.exclude_user_groups;
        if let Visitor::Authenticated { groups, .. } = &visit.visitor {
            if !excluded.is_empty() && groups.iter().any(|g| excluded.contains(g)) {
                return Ok(HitDecision::ExcludedByGroup);
            }
        }

        let now = chrono::Utc::now().timestamp();
        let active_since = self.active_since(now);

        let limit = self.config.hits_per_ip_limit;
        if limit > 0
            && self
                .storage
                .count_active_hits_for_ip(&visit.ip, active_since)
                .await?
                >= i64::from(limit)
        {
            return Ok(HitDecision::IpLimitReached);
        }

        let authenticated = visit.visitor.is_authenticated();
        let user_id = match &visit.visitor {
            Visitor::Authenticated { user_id, .. } => Some(user_id.clone()),
            Visitor::Anonymous => None,
        };

        let hit = NewHit {
            counter_id: counter.id,
            user_id,
            session_key,
            ip: visit.ip.clone(),
            user_agent: visit.user_agent.clone(),
            domain: visit.host.clone(),
            created_at: now,
        };

        match self.storage.create_hit(&hit, active_since).await {
            Ok(_) if authenticated => Ok(HitDecision::CountedByUser),
            Ok(_) => Ok(HitDecision::CountedBySession),
            Err(StorageError::Conflict) if authenticated => Ok(HitDecision::UserHasActiveHit),
            Err(StorageError::Conflict) => Ok(HitDecision::SessionHasActiveHit),
            Err(StorageError::Other(e)) => Err(e),
        }
    }

    /// Number of active hits recorded for a counter
    pub async fn total_hits(&self, counter: &HitCounter) -> Result<i64> {
        let active_since = self.active_since(chrono::Utc::now().timestamp());
        self.storage.count_active_hits(counter.id, active_since).await
    }

    /// Clear the active flag on hits that fell out of the active window
    pub async fn expire_hits(&self) -> Result<u64> {
        let active_since = self.active_since(chrono::Utc::now().timestamp());
        let expired = self.storage.expire_hits(active_since).await?;
        info!(expired, "Expired hits outside the active window");
        Ok(expired)
    }

    /// Delete hits older than the keep-in-database horizon
    pub async fn cleanup(&self) -> Result<u64> {
        let cutoff = chrono::Utc::now().timestamp() - self.config.keep_hit_in_database_secs;
        let deleted = self.storage.delete_hits_before(cutoff).await?;
        info!(deleted, "Deleted old hits");
        Ok(deleted)
    }
}
