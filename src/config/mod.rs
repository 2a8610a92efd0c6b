use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub hitcount: HitCountConfig,
    pub session: SessionConfig,
    pub auth: AuthConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Hit counting rules applied by the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitCountConfig {
    /// Maximum number of active hits a single IP may accumulate; 0 disables the limit
    pub hits_per_ip_limit: u32,
    /// Authenticated users in any of these groups are never counted
    pub exclude_user_groups: Vec<String>,
    /// How long a hit stays active (blocks repeat hits and counts toward totals)
    pub keep_hit_active_secs: i64,
    /// How long hits are kept before `cleanup` deletes them
    pub keep_hit_in_database_secs: i64,
}

impl Default for HitCountConfig {
    fn default() -> Self {
        Self {
            hits_per_ip_limit: 0,
            exclude_user_groups: Vec::new(),
            keep_hit_active_secs: Self::DEFAULT_KEEP_HIT_ACTIVE_SECS,
            keep_hit_in_database_secs: Self::DEFAULT_KEEP_HIT_IN_DATABASE_SECS,
        }
    }
}

impl HitCountConfig {
    const DEFAULT_KEEP_HIT_ACTIVE_SECS: i64 = 7 * 24 * 60 * 60;
    const DEFAULT_KEEP_HIT_IN_DATABASE_SECS: i64 = 30 * 24 * 60 * 60;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// HMAC secret for session cookies. A random key is generated when unset,
    /// which invalidates every session cookie on restart.
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    None,
    Header,
    Jwt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    #[serde(default)]
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    None,
    Standard,
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub trusted_proxy_mode: TrustedProxyMode,
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    #[serde(default)]
    pub num_trusted_proxies: Option<usize>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
        }
    }
}

/// Split a comma-separated environment value, dropping blanks.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./hitcount.db".to_string());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let hits_per_ip_limit = std::env::var("HITCOUNT_HITS_PER_IP_LIMIT")
            .unwrap_or_else(|_| "0".to_string())
            .parse::<u32>()
            .context("HITCOUNT_HITS_PER_IP_LIMIT must be a non-negative integer")?;
        let exclude_user_groups = std::env::var("HITCOUNT_EXCLUDE_USER_GROUP")
            .map(|v| split_list(&v))
            .unwrap_or_default();
        let keep_hit_active_secs = match std::env::var("HITCOUNT_KEEP_HIT_ACTIVE_SECS") {
            Ok(v) => v
                .parse::<i64>()
                .context("HITCOUNT_KEEP_HIT_ACTIVE_SECS must be an integer")?,
            Err(_) => HitCountConfig::DEFAULT_KEEP_HIT_ACTIVE_SECS,
        };
        let keep_hit_in_database_secs = match std::env::var("HITCOUNT_KEEP_HIT_IN_DATABASE_SECS")
        {
            Ok(v) => v
                .parse::<i64>()
                .context("HITCOUNT_KEEP_HIT_IN_DATABASE_SECS must be an integer")?,
            Err(_) => HitCountConfig::DEFAULT_KEEP_HIT_IN_DATABASE_SECS,
        };

        let cookie_name =
            std::env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "hitcount_session".to_string());
        let session_secret = std::env::var("SESSION_SECRET").ok();

        let auth_mode = match std::env::var("AUTH_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => AuthMode::None,
            "header" => AuthMode::Header,
            "jwt" => AuthMode::Jwt,
            other => {
                tracing::warn!(
                    "Unknown AUTH_MODE '{other}', falling back to 'none'. Supported values: none, header, jwt"
                );
                AuthMode::None
            }
        };

        let jwt_secret = if matches!(auth_mode, AuthMode::Jwt) {
            Some(std::env::var("JWT_SECRET").context("JWT_SECRET must be set when AUTH_MODE=jwt")?)
        } else {
            None
        };

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            "none" => TrustedProxyMode::None,
            other => {
                tracing::warn!("Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'");
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .map(|v| split_list(&v))
            .unwrap_or_default()
            .iter()
            .map(|cidr| {
                cidr.parse::<IpNet>()
                    .with_context(|| format!("invalid CIDR '{cidr}' in TRUSTED_PROXIES"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?;

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            server: ServerConfig { host, port },
            hitcount: HitCountConfig {
                hits_per_ip_limit,
                exclude_user_groups,
                keep_hit_active_secs,
                keep_hit_in_database_secs,
            },
            session: SessionConfig {
                cookie_name,
                secret: session_secret,
            },
            auth: AuthConfig {
                mode: auth_mode,
                jwt_secret,
            },
            proxy: ProxyConfig {
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empty_entries() {
        assert_eq!(
            split_list(" staff, editors ,,"),
            vec!["staff".to_string(), "editors".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn hitcount_defaults_disable_limits() {
        let config = HitCountConfig::default();
        assert_eq!(config.hits_per_ip_limit, 0);
        assert!(config.exclude_user_groups.is_empty());
        assert_eq!(config.keep_hit_active_secs, 604_800);
        assert_eq!(config.keep_hit_in_database_secs, 2_592_000);
    }
}
