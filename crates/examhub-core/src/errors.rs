use crate::exam::ExamId;

/// Error taxonomy of the exam-isolation layer.
///
/// `ExamResourceNotFound` is returned both for true absence and for rows
/// filtered out by the exam predicate; callers cannot tell them apart.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("{0}")]
    Validation(String),

    #[error("no exam context: {0}")]
    ExamContextMissing(String),

    #[error("access to content of another exam is forbidden")]
    CrossExamForbidden {
        what: String,
        target: ExamId,
        context: ExamId,
    },

    #[error("{0} not found")]
    ExamResourceNotFound(String),

    #[error("only the owner may modify this {0}")]
    NotOwner(String),

    #[error("inconsistent state: {0}")]
    ConcurrencyInconsistency(String),
}

impl AccessError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::ExamResourceNotFound(what.into())
    }

    /// Stable wire code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ExamContextMissing(_) => "EXAM_CONTEXT_MISSING",
            Self::CrossExamForbidden { .. } => "CROSS_EXAM_FORBIDDEN",
            Self::ExamResourceNotFound(_) => "NOT_FOUND",
            Self::NotOwner(_) => "FORBIDDEN",
            Self::ConcurrencyInconsistency(_) => "CONCURRENCY_INCONSISTENCY",
        }
    }

    /// HTTP-equivalent status.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::ExamContextMissing(_) => 400,
            Self::CrossExamForbidden { .. } | Self::NotOwner(_) => 403,
            Self::ExamResourceNotFound(_) => 404,
            Self::ConcurrencyInconsistency(_) => 409,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyInconsistency(_))
    }

    /// Worth a security log line: someone asked for another exam's data.
    pub fn is_security_probe(&self) -> bool {
        matches!(self, Self::CrossExamForbidden { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(AccessError::validation("x").status_code(), 400);
        assert_eq!(AccessError::ExamContextMissing("x".into()).status_code(), 400);
        let forbidden = AccessError::CrossExamForbidden {
            what: "subject".into(),
            target: ExamId::Upsc,
            context: ExamId::Jee,
        };
        assert_eq!(forbidden.status_code(), 403);
        assert_eq!(AccessError::not_found("question").status_code(), 404);
        assert_eq!(AccessError::ConcurrencyInconsistency("x".into()).status_code(), 409);
    }

    #[test]
    fn forbidden_message_does_not_name_exams() {
        let err = AccessError::CrossExamForbidden {
            what: "question q_1".into(),
            target: ExamId::Upsc,
            context: ExamId::Jee,
        };
        let msg = err.to_string();
        assert!(!msg.contains("UPSC"), "{msg}");
        assert!(!msg.contains("q_1"), "{msg}");
        assert!(err.is_security_probe());
    }

    #[test]
    fn only_inconsistency_is_retryable() {
        assert!(AccessError::ConcurrencyInconsistency("x".into()).is_retryable());
        assert!(!AccessError::not_found("x").is_retryable());
        assert!(!AccessError::validation("x").is_retryable());
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(AccessError::not_found("q").kind(), "NOT_FOUND");
        assert_eq!(AccessError::validation("q").kind(), "VALIDATION_ERROR");
    }
}
