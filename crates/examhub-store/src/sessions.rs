use chrono::Duration;
use rusqlite::OptionalExtension;
use secrecy::SecretString;
use tracing::{debug, instrument};

use examhub_core::credentials;
use examhub_core::ids::UserId;
use examhub_core::{ExamId, Identity};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, expires_in, now};

pub const SESSION_TTL_DAYS: i64 = 7;

/// Bearer sessions. Only the SHA-256 digest of a token is stored.
pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Issue a session token for `user_id`. The plain token is returned once.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn create(&self, user_id: &UserId) -> Result<SecretString, StoreError> {
        let token = credentials::generate_token();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token_digest, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    credentials::digest(&token),
                    user_id.as_str(),
                    expires_in(Duration::days(SESSION_TTL_DAYS)),
                    now(),
                ],
            )?;
            Ok(())
        })?;
        debug!("session created");
        Ok(SecretString::from(token))
    }

    /// Resolve a bearer token to the identity behind it. Unknown, expired
    /// and inactive all fail with `Auth`.
    pub fn resolve(&self, token: &str) -> Result<Identity, StoreError> {
        let digest = credentials::digest(token);
        self.db.with_conn(|conn| {
            let row: Option<(String, String, String, bool)> = conn
                .query_row(
                    "SELECT u.id, u.primary_exam, s.expires_at, u.is_active
                     FROM sessions s JOIN users u ON u.id = s.user_id
                     WHERE s.token_digest = ?1",
                    [&digest],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )
                .optional()?;
            let Some((user_id, exam, expires_at, is_active)) = row else {
                return Err(StoreError::Auth("invalid session".into()));
            };
            if expires_at <= now() {
                conn.execute("DELETE FROM sessions WHERE token_digest = ?1", [&digest])?;
                return Err(StoreError::Auth("session expired".into()));
            }
            if !is_active {
                return Err(StoreError::Auth("account is inactive".into()));
            }
            let primary_exam: ExamId = row_helpers::parse_enum(&exam, "users", "primary_exam")?;
            Ok(Identity {
                user_id: UserId::from_raw(user_id),
                primary_exam,
                is_active,
            })
        })
    }

    pub fn revoke(&self, token: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM sessions WHERE token_digest = ?1",
                [credentials::digest(token)],
            )? > 0)
        })
    }

    /// Revoke every session of `user_id` except the one holding `keep`.
    pub fn revoke_others(&self, user_id: &UserId, keep: &str) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM sessions WHERE user_id = ?1 AND token_digest <> ?2",
                [user_id.as_str().to_string(), credentials::digest(keep)],
            )?)
        })
    }

    /// Drop expired rows; returns how many.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        self.db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now()])?))
    }
}
