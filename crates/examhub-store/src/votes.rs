//! Toggled memberships (upvotes, saves, likes) and their denormalized counters.
//!
//! Membership rows are the source of truth. Each toggle is an
//! `INSERT OR IGNORE` (or a `DELETE` when the row already existed) followed
//! by a recount, so two concurrent voters can never lose an update.

use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;

use examhub_core::ExamContext;

use crate::error::StoreError;
use crate::row_helpers::{self, now};
use crate::scope::{ensure_target, Scope, ScopedQuery};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Membership {
    AnswerVote,
    ResourceVote,
    ResourceSave,
    StoryLike,
}

impl Membership {
    fn table(&self) -> &'static str {
        match self {
            Self::AnswerVote => "answer_votes",
            Self::ResourceVote => "resource_votes",
            Self::ResourceSave => "resource_saves",
            Self::StoryLike => "story_likes",
        }
    }

    fn key(&self) -> &'static str {
        match self {
            Self::AnswerVote => "answer_id",
            Self::ResourceVote | Self::ResourceSave => "resource_id",
            Self::StoryLike => "story_id",
        }
    }

    fn scope(&self) -> Scope {
        match self {
            Self::AnswerVote => Scope::Answers,
            Self::ResourceVote | Self::ResourceSave => Scope::Resources,
            Self::StoryLike => Scope::Stories,
        }
    }

    fn counter(&self) -> &'static str {
        match self {
            Self::AnswerVote | Self::ResourceVote => "upvotes",
            Self::ResourceSave => "saves",
            Self::StoryLike => "likes",
        }
    }
}

/// Result of a toggle: whether the caller is now a member, and the new count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toggle {
    pub active: bool,
    pub count: u64,
}

/// Flip the caller's membership on a target visible in `ctx`.
pub(crate) fn toggle(
    conn: &Connection,
    ctx: &ExamContext,
    membership: Membership,
    target_id: &str,
) -> Result<Toggle, StoreError> {
    ensure_target(conn, ctx, membership.scope(), target_id)?;
    let target = ScopedQuery::new(ctx, membership.scope()).id(target_id);

    let user = ctx.user_id().as_str();
    let inserted = if membership == Membership::ResourceSave {
        conn.execute(
            "INSERT OR IGNORE INTO resource_saves (resource_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![target_id, user, now()],
        )?
    } else {
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} ({}, user_id) VALUES (?1, ?2)",
                membership.table(),
                membership.key()
            ),
            [target_id, user],
        )?
    };
    if inserted == 0 {
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1 AND user_id = ?2",
                membership.table(),
                membership.key()
            ),
            [target_id, user],
        )?;
    }

    let counter = membership.counter();
    target.update(
        conn,
        &format!(
            "{counter} = (SELECT COUNT(*) FROM {} WHERE {} = ?)",
            membership.table(),
            membership.key()
        ),
        vec![Value::Text(target_id.to_string())],
    )?;
    let count = target.fetch_one(conn, counter, |row| {
        row_helpers::get_count(row, 0, membership.scope().table(), "counter")
    })?;

    Ok(Toggle {
        active: inserted > 0,
        count,
    })
}

/// Whether `ctx`'s user currently holds the membership.
pub(crate) fn is_member(
    conn: &Connection,
    ctx: &ExamContext,
    membership: Membership,
    target_id: &str,
) -> Result<bool, StoreError> {
    let n: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND user_id = ?2",
            membership.table(),
            membership.key()
        ),
        [target_id, ctx.user_id().as_str()],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopedInsert;
    use crate::test_support::{context, TestDb};
    use examhub_core::{AccessError, ExamId};

    fn story(tdb: &TestDb, ctx: &ExamContext) -> String {
        let id = "story_votes".to_string();
        tdb.db
            .with_conn(|conn| {
                ScopedInsert::new(ctx, Scope::Stories, None)
                    .value("id", id.clone())
                    .value("user_id", ctx.user_id().as_str().to_string())
                    .value("title", "Cleared it".to_string())
                    .value("content", "Long story about preparation".to_string())
                    .value("created_at", now())
                    .value("updated_at", now())
                    .execute(conn)
            })
            .unwrap();
        id
    }

    #[test]
    fn toggle_adds_then_removes() {
        let tdb = TestDb::new();
        let author = context(&tdb, ExamId::Upsc);
        let fan = context(&tdb, ExamId::Upsc);
        let id = story(&tdb, &author);

        tdb.db
            .with_conn(|conn| {
                let on = toggle(conn, &fan, Membership::StoryLike, &id)?;
                assert_eq!(on, Toggle { active: true, count: 1 });
                assert!(is_member(conn, &fan, Membership::StoryLike, &id)?);

                let other = toggle(conn, &author, Membership::StoryLike, &id)?;
                assert_eq!(other.count, 2);

                let off = toggle(conn, &fan, Membership::StoryLike, &id)?;
                assert_eq!(off, Toggle { active: false, count: 1 });
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn toggle_on_other_exam_is_forbidden() {
        let tdb = TestDb::new();
        let author = context(&tdb, ExamId::Upsc);
        let outsider = context(&tdb, ExamId::Ssc);
        let id = story(&tdb, &author);

        let err = tdb
            .db
            .with_conn(|conn| toggle(conn, &outsider, Membership::StoryLike, &id))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Access(AccessError::CrossExamForbidden { target: ExamId::Upsc, context: ExamId::Ssc, .. })
        ));

        // counter untouched
        let likes = tdb
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT likes FROM stories WHERE id = ?1", [&id], |r| r.get::<_, i64>(0))?))
            .unwrap();
        assert_eq!(likes, 0);
    }

    #[test]
    fn toggle_on_missing_target_is_not_found() {
        let tdb = TestDb::new();
        let fan = context(&tdb, ExamId::Upsc);
        let err = tdb
            .db
            .with_conn(|conn| toggle(conn, &fan, Membership::StoryLike, "story_missing"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Access(AccessError::ExamResourceNotFound(_))));
    }
}
