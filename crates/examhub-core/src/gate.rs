//! Isolation checks that do not need the store.
//!
//! Predicate injection on reads and re-fetching referenced subjects and
//! topics live in `examhub-store`, which calls into these.

use tracing::{debug, warn};

use crate::context::ExamContext;
use crate::errors::AccessError;
use crate::exam::ExamId;
use crate::ids::UserId;

/// Overwrite-on-write. Whatever exam the client claimed is discarded.
pub fn stamp_exam(ctx: &ExamContext, claimed: Option<&str>) -> ExamId {
    if let Some(claimed) = claimed {
        if claimed.parse::<ExamId>().ok() != Some(ctx.exam()) {
            debug!(
                user_id = %ctx.user_id(),
                exam = %ctx.exam(),
                claimed,
                "discarding client-supplied exam"
            );
        }
    }
    ctx.exam()
}

/// Reject-on-mismatch for a target whose exam is already known.
pub fn ensure_same_exam(
    ctx: &ExamContext,
    target: ExamId,
    what: impl Into<String>,
) -> Result<(), AccessError> {
    if target == ctx.exam() {
        return Ok(());
    }
    let what = what.into();
    warn!(
        user_id = %ctx.user_id(),
        exam = %ctx.exam(),
        target_exam = %target,
        what = %what,
        security_probe = true,
        "cross-exam access rejected"
    );
    Err(AccessError::CrossExamForbidden {
        what,
        target,
        context: ctx.exam(),
    })
}

/// Reject-on-mismatch for an exam named explicitly in a URL path.
pub fn ensure_path_exam(ctx: &ExamContext, token: &str) -> Result<ExamId, AccessError> {
    let exam: ExamId = token.parse()?;
    ensure_same_exam(ctx, exam, format!("exam path {exam}"))?;
    Ok(exam)
}

/// Only the creator may mutate an entity.
pub fn ensure_owner(ctx: &ExamContext, owner: &UserId, what: &str) -> Result<(), AccessError> {
    if owner == ctx.user_id() {
        Ok(())
    } else {
        Err(AccessError::NotOwner(what.to_string()))
    }
}

/// The one operation exempt from reject-on-mismatch: choosing a new
/// primary exam. Still bound to the registry.
pub fn exam_for_change(token: &str) -> Result<ExamId, AccessError> {
    token.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Identity;

    fn ctx(exam: ExamId) -> ExamContext {
        ExamContext::resolve(Some(&Identity {
            user_id: UserId::from_raw("usr_me"),
            primary_exam: exam,
            is_active: true,
        }))
        .unwrap()
    }

    #[test]
    fn stamp_ignores_claimed_exam() {
        let ctx = ctx(ExamId::Jee);
        assert_eq!(stamp_exam(&ctx, Some("UPSC")), ExamId::Jee);
        assert_eq!(stamp_exam(&ctx, Some("not-an-exam")), ExamId::Jee);
        assert_eq!(stamp_exam(&ctx, None), ExamId::Jee);
    }

    #[test]
    fn same_exam_passes() {
        assert!(ensure_same_exam(&ctx(ExamId::Neet), ExamId::Neet, "question").is_ok());
    }

    #[test]
    fn other_exam_is_forbidden() {
        let err = ensure_same_exam(&ctx(ExamId::Neet), ExamId::Jee, "question").unwrap_err();
        assert!(matches!(
            err,
            AccessError::CrossExamForbidden { target: ExamId::Jee, context: ExamId::Neet, .. }
        ));
    }

    #[test]
    fn path_exam_checked() {
        let ctx = ctx(ExamId::Gate);
        assert_eq!(ensure_path_exam(&ctx, "gate").unwrap(), ExamId::Gate);
        assert!(matches!(
            ensure_path_exam(&ctx, "GRE"),
            Err(AccessError::CrossExamForbidden { .. })
        ));
        assert!(matches!(ensure_path_exam(&ctx, "XYZ"), Err(AccessError::Validation(_))));
    }

    #[test]
    fn owner_check() {
        let ctx = ctx(ExamId::Cat);
        assert!(ensure_owner(&ctx, &UserId::from_raw("usr_me"), "question").is_ok());
        assert!(matches!(
            ensure_owner(&ctx, &UserId::from_raw("usr_other"), "question"),
            Err(AccessError::NotOwner(_))
        ));
    }

    #[test]
    fn exam_change_validates_against_registry() {
        assert_eq!(exam_for_change("ielts").unwrap(), ExamId::Ielts);
        assert!(exam_for_change("TOEFL").is_err());
    }
}
