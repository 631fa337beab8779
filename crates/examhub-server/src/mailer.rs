use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Transactional mail the backend sends.
#[derive(Debug)]
pub enum MailPayload {
    VerifyEmail { otp: SecretString },
    PasswordReset { token: SecretString },
}

impl MailPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VerifyEmail { .. } => "verify_email",
            Self::PasswordReset { .. } => "password_reset",
        }
    }

    pub fn secret(&self) -> &SecretString {
        match self {
            Self::VerifyEmail { otp } => otp,
            Self::PasswordReset { token } => token,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, payload: MailPayload) -> Result<(), MailError>;
}

/// Development transport: writes mail to the log instead of sending it.
/// The code itself only appears at debug level.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, payload: MailPayload) -> Result<(), MailError> {
        info!(to, kind = payload.kind(), "mail dispatched");
        debug!(to, kind = payload.kind(), secret = payload.secret().expose_secret(), "mail body");
        Ok(())
    }
}

/// Keeps sent mail in memory. Can be told to fail the next sends.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<(String, MailPayload)>>,
    failing: Mutex<bool>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Secret of the latest mail of `kind` sent to `to`.
    pub fn last_secret(&self, to: &str, kind: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(addr, p)| addr == to && p.kind() == kind)
            .map(|(_, p)| p.secret().expose_secret().to_string())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, to: &str, payload: MailPayload) -> Result<(), MailError> {
        if *self.failing.lock() {
            return Err(MailError("outbox is failing".into()));
        }
        self.sent.lock().push((to.to_string(), payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outbox_records_and_fails_on_demand() {
        let outbox = Outbox::new();
        outbox
            .send("a@example.com", MailPayload::VerifyEmail { otp: SecretString::from("123456".to_string()) })
            .await
            .unwrap();
        assert_eq!(outbox.last_secret("a@example.com", "verify_email").as_deref(), Some("123456"));
        assert!(outbox.last_secret("a@example.com", "password_reset").is_none());

        outbox.set_failing(true);
        let err = outbox
            .send("a@example.com", MailPayload::PasswordReset { token: SecretString::from("t".to_string()) })
            .await;
        assert!(err.is_err());
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn payload_debug_redacts_secret() {
        let payload = MailPayload::VerifyEmail { otp: SecretString::from("654321".to_string()) };
        assert!(!format!("{payload:?}").contains("654321"));
    }
}
