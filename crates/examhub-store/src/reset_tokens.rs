use chrono::Duration;
use rusqlite::OptionalExtension;
use secrecy::SecretString;
use tracing::{info, instrument};

use examhub_core::credentials;
use examhub_core::ids::UserId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{expires_in, now};
use crate::users;

pub const RESET_TTL_MINUTES: i64 = 60;

/// Single-use password reset tokens, stored as digests.
pub struct ResetTokenRepo {
    db: Database,
}

impl ResetTokenRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn issue(&self, user_id: &UserId) -> Result<SecretString, StoreError> {
        let token = credentials::generate_token();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reset_tokens (token_digest, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    credentials::digest(&token),
                    user_id.as_str(),
                    expires_in(Duration::minutes(RESET_TTL_MINUTES)),
                    now(),
                ],
            )?;
            Ok(())
        })?;
        Ok(SecretString::from(token))
    }

    /// Remove a token that was never delivered.
    pub fn discard(&self, token: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM reset_tokens WHERE token_digest = ?1",
                [credentials::digest(token)],
            )?;
            Ok(())
        })
    }

    /// Consume `token` and set the new password hash. Every outstanding
    /// reset token and session of the user is revoked with it.
    #[instrument(skip_all)]
    pub fn consume(&self, token: &str, password_hash: &str) -> Result<UserId, StoreError> {
        let digest = credentials::digest(token);
        self.db.with_tx(|tx| {
            let row: Option<(String, String)> = tx
                .query_row(
                    "SELECT user_id, expires_at FROM reset_tokens WHERE token_digest = ?1",
                    [&digest],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            let Some((user_id, expires_at)) = row else {
                return Err(StoreError::Auth("invalid or used reset token".into()));
            };
            if expires_at <= now() {
                return Err(StoreError::Auth("reset token expired".into()));
            }
            let user_id = UserId::from_raw(user_id);
            users::set_password(tx, &user_id, password_hash)?;
            tx.execute("DELETE FROM reset_tokens WHERE user_id = ?1", [user_id.as_str()])?;
            let sessions = tx.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id.as_str()])?;
            info!(user_id = %user_id, sessions, "password reset");
            Ok(user_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::SessionRepo;
    use crate::test_support::{context, TestDb};
    use crate::users::UserRepo;
    use examhub_core::ExamId;
    use secrecy::ExposeSecret;

    #[test]
    fn token_is_single_use_and_revokes_sessions() {
        let tdb = TestDb::new();
        let ctx = context(&tdb, ExamId::Gmat);
        let sessions = SessionRepo::new(tdb.db.clone());
        let session = sessions.create(ctx.user_id()).unwrap();
        let repo = ResetTokenRepo::new(tdb.db.clone());

        let token = repo.issue(ctx.user_id()).unwrap();
        let user = repo.consume(token.expose_secret(), "sha256$1$new$hash").unwrap();
        assert_eq!(&user, ctx.user_id());
        assert_eq!(
            UserRepo::new(tdb.db.clone()).password_hash(&user).unwrap(),
            "sha256$1$new$hash"
        );
        assert!(sessions.resolve(session.expose_secret()).is_err());

        let err = repo.consume(token.expose_secret(), "sha256$1$again$hash").unwrap_err();
        assert!(matches!(err, StoreError::Auth(_)));
    }

    #[test]
    fn discarded_and_expired_tokens_fail() {
        let tdb = TestDb::new();
        let ctx = context(&tdb, ExamId::Ssc);
        let repo = ResetTokenRepo::new(tdb.db.clone());

        let dropped = repo.issue(ctx.user_id()).unwrap();
        repo.discard(dropped.expose_secret()).unwrap();
        assert!(repo.consume(dropped.expose_secret(), "x").is_err());

        let stale = repo.issue(ctx.user_id()).unwrap();
        tdb.db
            .with_conn(|conn| {
                conn.execute("UPDATE reset_tokens SET expires_at = ?1", [expires_in(Duration::seconds(-1))])?;
                Ok(())
            })
            .unwrap();
        let err = repo.consume(stale.expose_secret(), "x").unwrap_err();
        assert!(matches!(err, StoreError::Auth(m) if m == "reset token expired"));
    }
}
