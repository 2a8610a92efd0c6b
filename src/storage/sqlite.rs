use crate::models::{Hit, HitCounter, NewHit, Post};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_key TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blacklist_ips (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blacklist_user_agents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_agent TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hit_counters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_type TEXT NOT NULL,
                object_pk TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (content_type, object_pk)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                counter_id INTEGER NOT NULL REFERENCES hit_counters(id) ON DELETE CASCADE,
                user_id TEXT,
                session_key TEXT NOT NULL,
                ip TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                domain TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_hits_ip ON hits(ip, created_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_hits_counter ON hits(counter_id, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        // At most one active hit per (counter, user) and per (counter, session)
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS uniq_active_user_hit
            ON hits(counter_id, user_id)
            WHERE is_active = 1 AND user_id IS NOT NULL
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS uniq_active_session_hit
            ON hits(counter_id, session_key)
            WHERE is_active = 1 AND user_id IS NULL
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_session(&self, session_key: &str) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO sessions (session_key, created_at)
            VALUES (?, ?)
            ON CONFLICT(session_key) DO NOTHING
            "#,
        )
        .bind(session_key)
        .bind(now())
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        Ok(())
    }

    async fn session_exists(&self, session_key: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sessions WHERE session_key = ?",
        )
        .bind(session_key)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count > 0)
    }

    async fn is_ip_blacklisted(&self, ip: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM blacklist_ips WHERE ip = ?")
            .bind(ip)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count > 0)
    }

    async fn is_user_agent_blacklisted(&self, user_agent: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM blacklist_user_agents WHERE user_agent = ?",
        )
        .bind(user_agent)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count > 0)
    }

    async fn add_blacklisted_ip(&self, ip: &str) -> Result<bool> {
        let result = sqlx::query("INSERT INTO blacklist_ips (ip) VALUES (?) ON CONFLICT(ip) DO NOTHING")
            .bind(ip)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_blacklisted_ip(&self, ip: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blacklist_ips WHERE ip = ?")
            .bind(ip)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_blacklisted_ips(&self) -> Result<Vec<String>> {
        let ips = sqlx::query_scalar::<_, String>("SELECT ip FROM blacklist_ips ORDER BY ip")
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(ips)
    }

    async fn add_blacklisted_user_agent(&self, user_agent: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO blacklist_user_agents (user_agent) VALUES (?)
            ON CONFLICT(user_agent) DO NOTHING
            "#,
        )
        .bind(user_agent)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_blacklisted_user_agent(&self, user_agent: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blacklist_user_agents WHERE user_agent = ?")
            .bind(user_agent)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_blacklisted_user_agents(&self) -> Result<Vec<String>> {
        let agents = sqlx::query_scalar::<_, String>(
            "SELECT user_agent FROM blacklist_user_agents ORDER BY user_agent",
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(agents)
    }

    async fn get_hit_counter(&self, id: i64) -> Result<Option<HitCounter>> {
        let counter = sqlx::query_as::<_, HitCounter>(
            r#"
            SELECT id, content_type, object_pk, created_at
            FROM hit_counters
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(counter)
    }

    async fn get_or_create_hit_counter(
        &self,
        content_type: &str,
        object_pk: &str,
    ) -> Result<HitCounter> {
        sqlx::query(
            r#"
            INSERT INTO hit_counters (content_type, object_pk, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(content_type, object_pk) DO NOTHING
            "#,
        )
        .bind(content_type)
        .bind(object_pk)
        .bind(now())
        .execute(self.pool.as_ref())
        .await?;

        let counter = sqlx::query_as::<_, HitCounter>(
            r#"
            SELECT id, content_type, object_pk, created_at
            FROM hit_counters
            WHERE content_type = ? AND object_pk = ?
            "#,
        )
        .bind(content_type)
        .bind(object_pk)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(counter)
    }

    async fn count_active_hits(&self, counter_id: i64, active_since: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM hits
            WHERE counter_id = ? AND is_active = 1 AND created_at >= ?
            "#,
        )
        .bind(counter_id)
        .bind(active_since)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn count_active_hits_for_ip(&self, ip: &str, active_since: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM hits
            WHERE ip = ? AND is_active = 1 AND created_at >= ?
            "#,
        )
        .bind(ip)
        .bind(active_since)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn create_hit(&self, hit: &NewHit, active_since: i64) -> StorageResult<Hit> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Other(e.into()))?;

        // Release the unique slot held by an expired hit for the same key
        match &hit.user_id {
            Some(user_id) => {
                sqlx::query(
                    r#"
                    UPDATE hits SET is_active = 0
                    WHERE counter_id = ? AND user_id = ? AND is_active = 1 AND created_at < ?
                    "#,
                )
                .bind(hit.counter_id)
                .bind(user_id)
                .bind(active_since)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Other(e.into()))?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE hits SET is_active = 0
                    WHERE counter_id = ? AND user_id IS NULL AND session_key = ?
                        AND is_active = 1 AND created_at < ?
                    "#,
                )
                .bind(hit.counter_id)
                .bind(&hit.session_key)
                .bind(active_since)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Other(e.into()))?;
            }
        }

        // Any active hit on the session blocks an anonymous visit, whoever recorded it
        if hit.user_id.is_none() {
            let active_hits = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*) FROM hits
                WHERE counter_id = ? AND session_key = ? AND is_active = 1 AND created_at >= ?
                "#,
            )
            .bind(hit.counter_id)
            .bind(&hit.session_key)
            .bind(active_since)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StorageError::Other(e.into()))?;

            if active_hits > 0 {
                return Err(StorageError::Conflict);
            }
        }

        let inserted = sqlx::query_as::<_, Hit>(
            r#"
            INSERT INTO hits (counter_id, user_id, session_key, ip, user_agent, domain, created_at, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT DO NOTHING
            RETURNING id, counter_id, user_id, session_key, ip, user_agent, domain, created_at, is_active
            "#,
        )
        .bind(hit.counter_id)
        .bind(&hit.user_id)
        .bind(&hit.session_key)
        .bind(&hit.ip)
        .bind(&hit.user_agent)
        .bind(&hit.domain)
        .bind(hit.created_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Other(e.into()))?;

        inserted.ok_or(StorageError::Conflict)
    }

    async fn list_hits(&self, counter_id: i64) -> Result<Vec<Hit>> {
        let hits = sqlx::query_as::<_, Hit>(
            r#"
            SELECT id, counter_id, user_id, session_key, ip, user_agent, domain, created_at, is_active
            FROM hits
            WHERE counter_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(counter_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(hits)
    }

    async fn expire_hits(&self, active_since: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE hits SET is_active = 0 WHERE is_active = 1 AND created_at < ?",
        )
        .bind(active_since)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_hits_before(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM hits WHERE created_at < ?")
            .bind(cutoff)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }

    async fn create_post(&self, title: &str, content: &str) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (title, content, created_at)
            VALUES (?, ?, ?)
            RETURNING id, title, content, created_at
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(post)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            "SELECT id, title, content, created_at FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(post)
    }
}
