use serde::{Deserialize, Serialize};

use crate::errors::AccessError;
use crate::exam::ExamId;
use crate::ids::UserId;

/// What the session layer knows about the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub primary_exam: ExamId,
    pub is_active: bool,
}

/// The exam scope of one authenticated operation.
///
/// Only obtainable through [`ExamContext::resolve`], i.e. from a stored
/// identity. There is no constructor taking an exam token, so request
/// input can never become a context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExamContext {
    user_id: UserId,
    exam: ExamId,
}

impl ExamContext {
    pub fn resolve(identity: Option<&Identity>) -> Result<Self, AccessError> {
        let identity = identity.ok_or_else(|| {
            AccessError::ExamContextMissing("authentication required".into())
        })?;
        if !identity.is_active {
            return Err(AccessError::ExamContextMissing("account is inactive".into()));
        }
        Ok(Self {
            user_id: identity.user_id.clone(),
            exam: identity.primary_exam,
        })
    }

    pub fn exam(&self) -> ExamId {
        self.exam
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(exam: ExamId, active: bool) -> Identity {
        Identity {
            user_id: UserId::from_raw("usr_1"),
            primary_exam: exam,
            is_active: active,
        }
    }

    #[test]
    fn resolves_from_identity() {
        let ctx = ExamContext::resolve(Some(&identity(ExamId::Jee, true))).unwrap();
        assert_eq!(ctx.exam(), ExamId::Jee);
        assert_eq!(ctx.user_id().as_str(), "usr_1");
    }

    #[test]
    fn missing_identity_has_no_context() {
        let err = ExamContext::resolve(None).unwrap_err();
        assert!(matches!(err, AccessError::ExamContextMissing(_)));
    }

    #[test]
    fn inactive_identity_has_no_context() {
        let err = ExamContext::resolve(Some(&identity(ExamId::Neet, false))).unwrap_err();
        assert!(matches!(err, AccessError::ExamContextMissing(_)));
    }
}
