use serde::{Deserialize, Serialize};

/// Outcome of evaluating a visit against a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitDecision {
    IpBlacklisted,
    UserAgentBlacklisted,
    ExcludedByGroup,
    IpLimitReached,
    CountedByUser,
    UserHasActiveHit,
    CountedBySession,
    SessionHasActiveHit,
}

impl HitDecision {
    pub fn is_counted(self) -> bool {
        matches!(self, HitDecision::CountedByUser | HitDecision::CountedBySession)
    }

    pub fn message(self) -> &'static str {
        match self {
            HitDecision::IpBlacklisted => "Not counted: user IP has been blacklisted",
            HitDecision::UserAgentBlacklisted => "Not counted: user agent has been blacklisted",
            HitDecision::ExcludedByGroup => "Not counted: user excluded by group",
            HitDecision::IpLimitReached => "Not counted: hits per IP address limit reached",
            HitDecision::CountedByUser => "Hit counted: user authentication",
            HitDecision::UserHasActiveHit => "Not counted: authenticated user has active hit",
            HitDecision::CountedBySession => "Hit counted: session key",
            HitDecision::SessionHasActiveHit => "Not counted: session key has active hit",
        }
    }
}

/// Body returned by the JSON endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitCountResponse {
    pub hit_counted: bool,
    pub hit_message: String,
}

impl From<HitDecision> for HitCountResponse {
    fn from(decision: HitDecision) -> Self {
        Self {
            hit_counted: decision.is_counted(),
            hit_message: decision.message().to_string(),
        }
    }
}
