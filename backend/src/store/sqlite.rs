use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use edufin_common::PlanTier;

use crate::models::{NewUser, Subscriber, User};

/// SQLite store for accounts, subscription mirrors and token bookkeeping.
pub struct Store {
    conn: Mutex<Connection>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Email already registered")]
    DuplicateEmail,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS subscribers (
        email TEXT PRIMARY KEY,
        user_id TEXT,
        stripe_customer_id TEXT,
        subscribed INTEGER NOT NULL DEFAULT 0,
        subscription_tier TEXT,
        subscription_end TEXT,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_subscribers_customer ON subscribers(stripe_customer_id);

    CREATE TABLE IF NOT EXISTS refresh_tokens (
        token_hash TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        expires_at INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(id)
    );

    CREATE TABLE IF NOT EXISTS revoked_tokens (
        jti TEXT PRIMARY KEY,
        expires_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS webhook_events (
        id TEXT PRIMARY KEY,
        event_type TEXT NOT NULL,
        received_at TEXT NOT NULL
    );
";

impl Store {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        // Accept sqlite: prefix for parity with connection URLs
        let path = path.strip_prefix("sqlite:").unwrap_or(path);

        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::IoError(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Store initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))
    }

    // ---------------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------------

    /// Insert a user. Fails with `DuplicateEmail` if the email is taken.
    pub fn create_user(&self, new_user: &NewUser) -> Result<User, StoreError> {
        let conn = self.conn()?;

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            created_at: Utc::now(),
        };

        let result = conn.execute(
            "INSERT INTO users (id, email, password, first_name, last_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.email,
                user.password_hash,
                user.first_name,
                user.last_name,
                user.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {
                tracing::info!(user_id = %user.id, "Created user");
                Ok(user)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateEmail)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, email, password, first_name, last_name, created_at
                 FROM users WHERE email = ?1",
                params![email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, email, password, first_name, last_name, created_at
                 FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn count_users(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ---------------------------------------------------------------------
    // Subscribers
    // ---------------------------------------------------------------------

    /// Insert or update the subscriber row keyed by email.
    ///
    /// Identity links (`user_id`, `stripe_customer_id`) are never cleared by
    /// a later write that does not know them.
    pub fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO subscribers
                (email, user_id, stripe_customer_id, subscribed, subscription_tier, subscription_end, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(email) DO UPDATE SET
                user_id = COALESCE(excluded.user_id, subscribers.user_id),
                stripe_customer_id = COALESCE(excluded.stripe_customer_id, subscribers.stripe_customer_id),
                subscribed = excluded.subscribed,
                subscription_tier = excluded.subscription_tier,
                subscription_end = excluded.subscription_end,
                updated_at = excluded.updated_at",
            params![
                subscriber.email,
                subscriber.user_id,
                subscriber.stripe_customer_id,
                subscriber.subscribed as i32,
                subscriber.subscription_tier.map(|t| t.label()),
                subscriber.subscription_end.map(|d| d.to_rfc3339()),
                subscriber.updated_at.to_rfc3339(),
            ],
        )?;

        tracing::debug!(
            email = %subscriber.email,
            subscribed = subscriber.subscribed,
            "Upserted subscriber"
        );
        Ok(())
    }

    pub fn get_subscriber(&self, email: &str) -> Result<Option<Subscriber>, StoreError> {
        let conn = self.conn()?;
        let subscriber = conn
            .query_row(
                "SELECT email, user_id, stripe_customer_id, subscribed, subscription_tier, subscription_end, updated_at
                 FROM subscribers WHERE email = ?1",
                params![email],
                row_to_subscriber,
            )
            .optional()?;
        Ok(subscriber)
    }

    pub fn find_subscriber_by_customer(&self, customer_id: &str) -> Result<Option<Subscriber>, StoreError> {
        let conn = self.conn()?;
        let subscriber = conn
            .query_row(
                "SELECT email, user_id, stripe_customer_id, subscribed, subscription_tier, subscription_end, updated_at
                 FROM subscribers WHERE stripe_customer_id = ?1
                 ORDER BY updated_at DESC LIMIT 1",
                params![customer_id],
                row_to_subscriber,
            )
            .optional()?;
        Ok(subscriber)
    }

    pub fn count_subscribers(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM subscribers", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ---------------------------------------------------------------------
    // Token bookkeeping
    // ---------------------------------------------------------------------

    pub fn store_refresh_token(&self, token_hash: &str, user_id: &str, expires_at: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO refresh_tokens (token_hash, user_id, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id, expires_at, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete a refresh token and return `(user_id, expires_at)` if it existed.
    pub fn consume_refresh_token(&self, token_hash: &str) -> Result<Option<(String, i64)>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "DELETE FROM refresh_tokens WHERE token_hash = ?1 RETURNING user_id, expires_at",
                params![token_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    pub fn revoke_token(&self, jti: &str, expires_at: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO revoked_tokens (jti, expires_at) VALUES (?1, ?2)",
            params![jti, expires_at],
        )?;
        Ok(())
    }

    pub fn is_token_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM revoked_tokens WHERE jti = ?1",
                params![jti],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Remove revocations and refresh tokens whose expiry has passed.
    pub fn purge_expired(&self, now: i64) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let revoked = conn.execute("DELETE FROM revoked_tokens WHERE expires_at < ?1", params![now])?;
        let refresh = conn.execute("DELETE FROM refresh_tokens WHERE expires_at < ?1", params![now])?;
        Ok(revoked + refresh)
    }

    // ---------------------------------------------------------------------
    // Webhook idempotency
    // ---------------------------------------------------------------------

    /// Record a webhook event id. Returns `false` if it was already recorded.
    pub fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO webhook_events (id, event_type, received_at) VALUES (?1, ?2, ?3)",
            params![event_id, event_type, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted == 1)
    }

    /// Forget a webhook event so a failed delivery can be processed on retry.
    pub fn forget_webhook_event(&self, event_id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM webhook_events WHERE id = ?1", params![event_id])?;
        Ok(())
    }
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let created_at: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
    })
}

fn row_to_subscriber(row: &Row<'_>) -> rusqlite::Result<Subscriber> {
    let tier: Option<String> = row.get(4)?;
    let end: Option<String> = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Subscriber {
        email: row.get(0)?,
        user_id: row.get(1)?,
        stripe_customer_id: row.get(2)?,
        subscribed: row.get::<_, i32>(3)? != 0,
        subscription_tier: tier.map(|t| t.parse().unwrap_or(PlanTier::Unknown)),
        subscription_end: end.map(|e| parse_timestamp(5, &e)).transpose()?,
        updated_at: parse_timestamp(6, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> Store {
        Store::open(":memory:").unwrap()
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "$argon2id$hash".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Souza".to_string(),
        }
    }

    fn subscriber(email: &str, tier: Option<PlanTier>) -> Subscriber {
        Subscriber {
            email: email.to_string(),
            user_id: Some("u1".to_string()),
            stripe_customer_id: Some("cus_1".to_string()),
            subscribed: tier.is_some(),
            subscription_tier: tier,
            subscription_end: Some(Utc.timestamp_opt(1_900_000_000, 0).unwrap()),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_create_and_find_user() {
        let store = store();
        let created = store.create_user(&new_user("ana@escola.com")).unwrap();

        let by_email = store.find_user_by_email("ana@escola.com").unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_email.first_name, "Ana");

        let by_id = store.find_user_by_id(&created.id).unwrap().unwrap();
        assert_eq!(by_id.email, "ana@escola.com");
    }

    #[test]
    fn test_duplicate_email_creates_no_row() {
        let store = store();
        store.create_user(&new_user("ana@escola.com")).unwrap();

        let err = store.create_user(&new_user("ana@escola.com")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.count_users().unwrap(), 1);
    }

    #[test]
    fn test_find_missing_user() {
        let store = store();
        assert!(store.find_user_by_email("nobody@escola.com").unwrap().is_none());
        assert!(store.find_user_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_subscriber_updates_in_place() {
        let store = store();
        store.upsert_subscriber(&subscriber("a@escola.com", Some(PlanTier::EscolaBasica))).unwrap();
        store.upsert_subscriber(&subscriber("a@escola.com", Some(PlanTier::RedeDeEnsino))).unwrap();

        assert_eq!(store.count_subscribers().unwrap(), 1);
        let row = store.get_subscriber("a@escola.com").unwrap().unwrap();
        assert_eq!(row.subscription_tier, Some(PlanTier::RedeDeEnsino));
        assert!(row.subscribed);
        assert_eq!(row.subscription_end, Some(Utc.timestamp_opt(1_900_000_000, 0).unwrap()));
    }

    #[test]
    fn test_upsert_keeps_identity_links() {
        let store = store();
        store.upsert_subscriber(&subscriber("a@escola.com", Some(PlanTier::EscolaBasica))).unwrap();

        let mut cancelled = subscriber("a@escola.com", None);
        cancelled.user_id = None;
        cancelled.stripe_customer_id = None;
        cancelled.subscription_end = None;
        store.upsert_subscriber(&cancelled).unwrap();

        let row = store.get_subscriber("a@escola.com").unwrap().unwrap();
        assert!(!row.subscribed);
        assert_eq!(row.subscription_tier, None);
        assert_eq!(row.user_id.as_deref(), Some("u1"));
        assert_eq!(row.stripe_customer_id.as_deref(), Some("cus_1"));

        let by_customer = store.find_subscriber_by_customer("cus_1").unwrap().unwrap();
        assert_eq!(by_customer.email, "a@escola.com");
    }

    #[test]
    fn test_refresh_token_is_single_use() {
        let store = store();
        let user = store.create_user(&new_user("ana@escola.com")).unwrap();
        store.store_refresh_token("hash1", &user.id, 4_000_000_000).unwrap();

        let first = store.consume_refresh_token("hash1").unwrap();
        assert_eq!(first, Some((user.id.clone(), 4_000_000_000)));
        assert!(store.consume_refresh_token("hash1").unwrap().is_none());
    }

    #[test]
    fn test_revocation_and_purge() {
        let store = store();
        store.revoke_token("jti-old", 100).unwrap();
        store.revoke_token("jti-new", 10_000).unwrap();
        assert!(store.is_token_revoked("jti-old").unwrap());
        assert!(!store.is_token_revoked("jti-other").unwrap());

        let purged = store.purge_expired(1_000).unwrap();
        assert_eq!(purged, 1);
        assert!(!store.is_token_revoked("jti-old").unwrap());
        assert!(store.is_token_revoked("jti-new").unwrap());
    }

    #[test]
    fn test_webhook_event_recorded_once() {
        let store = store();
        assert!(store.record_webhook_event("evt_1", "checkout.session.completed").unwrap());
        assert!(!store.record_webhook_event("evt_1", "checkout.session.completed").unwrap());

        store.forget_webhook_event("evt_1").unwrap();
        assert!(store.record_webhook_event("evt_1", "checkout.session.completed").unwrap());
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("edufin.db");
        let store = Store::open(path.to_str().unwrap()).unwrap();
        store.create_user(&new_user("ana@escola.com")).unwrap();
        assert!(path.exists());
    }
}
