use chrono::Duration;
use rusqlite::OptionalExtension;
use secrecy::SecretString;
use tracing::{instrument, warn};

use examhub_core::credentials;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{expires_in, now};

pub const OTP_TTL_MINUTES: i64 = 10;
/// Failed verifications allowed before the code is locked.
pub const MAX_ATTEMPTS: i64 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpPurpose {
    VerifyEmail,
}

impl OtpPurpose {
    fn as_str(&self) -> &'static str {
        match self {
            Self::VerifyEmail => "verify_email",
        }
    }
}

/// One live code per `(email, purpose)`, stored as a digest.
pub struct OtpRepo {
    db: Database,
}

impl OtpRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Issue a fresh code, replacing any previous one and its attempt count.
    #[instrument(skip(self), fields(purpose = purpose.as_str()))]
    pub fn issue(&self, email: &str, purpose: OtpPurpose) -> Result<SecretString, StoreError> {
        let code = credentials::generate_otp();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO otps (email, purpose, code_digest, attempts, expires_at, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5)",
                rusqlite::params![
                    email.trim().to_lowercase(),
                    purpose.as_str(),
                    credentials::digest(&code),
                    expires_in(Duration::minutes(OTP_TTL_MINUTES)),
                    now(),
                ],
            )?;
            Ok(())
        })?;
        Ok(SecretString::from(code))
    }

    /// Check `code`. Once the attempt limit is reached every call fails,
    /// correct code or not. A match consumes the code.
    #[instrument(skip(self, code), fields(purpose = purpose.as_str()))]
    pub fn verify(&self, email: &str, purpose: OtpPurpose, code: &str) -> Result<(), StoreError> {
        let email = email.trim().to_lowercase();
        self.db.with_conn(|conn| {
            let row: Option<(String, i64, String)> = conn
                .query_row(
                    "SELECT code_digest, attempts, expires_at FROM otps WHERE email = ?1 AND purpose = ?2",
                    [email.as_str(), purpose.as_str()],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()?;
            let Some((stored, attempts, expires_at)) = row else {
                return Err(StoreError::Auth("no pending code".into()));
            };
            if attempts >= MAX_ATTEMPTS {
                warn!(attempts, "otp locked");
                return Err(StoreError::Auth("max attempts exceeded".into()));
            }
            if expires_at <= now() {
                return Err(StoreError::Auth("code expired".into()));
            }
            if !credentials::digest_matches(code.trim(), &stored) {
                conn.execute(
                    "UPDATE otps SET attempts = attempts + 1 WHERE email = ?1 AND purpose = ?2",
                    [email.as_str(), purpose.as_str()],
                )?;
                return Err(StoreError::Auth("invalid code".into()));
            }
            conn.execute(
                "DELETE FROM otps WHERE email = ?1 AND purpose = ?2",
                [email.as_str(), purpose.as_str()],
            )?;
            Ok(())
        })
    }

    pub fn discard(&self, email: &str, purpose: OtpPurpose) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM otps WHERE email = ?1 AND purpose = ?2",
                [email.trim().to_lowercase().as_str(), purpose.as_str()],
            )?;
            Ok(())
        })
    }
}
