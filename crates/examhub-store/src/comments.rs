use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use examhub_core::gate;
use examhub_core::ids::{CommentId, ResourceId, StoryId, UserId};
use examhub_core::paging::{Page, PageRequest};
use examhub_core::validation::{self, COMMENT};
use examhub_core::{ExamContext, ExamId};

use crate::activities::{self, ActivityKind, ActivityTarget};
use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now};
use crate::scope::{ensure_target, Scope, ScopedInsert, ScopedQuery};

/// What a comment hangs off.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommentTarget {
    Resource(ResourceId),
    Story(StoryId),
}

impl CommentTarget {
    fn kind(&self) -> &'static str {
        match self {
            Self::Resource(_) => "resource",
            Self::Story(_) => "story",
        }
    }

    fn id(&self) -> &str {
        match self {
            Self::Resource(id) => id.as_str(),
            Self::Story(id) => id.as_str(),
        }
    }

    fn scope(&self) -> Scope {
        match self {
            Self::Resource(_) => Scope::Resources,
            Self::Story(_) => Scope::Stories,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRow {
    pub id: CommentId,
    pub exam: ExamId,
    pub target_kind: String,
    pub target_id: String,
    pub user_id: UserId,
    pub content: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub content: String,
    #[serde(default)]
    pub exam: Option<String>,
}

const COLUMNS: &str = "id, exam, target_kind, target_id, user_id, content, created_at";

pub struct CommentRepo {
    db: Database,
}

impl CommentRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Comment on a resource or story of the caller's exam and notify its
    /// author.
    #[instrument(skip(self, ctx, new), fields(user_id = %ctx.user_id(), exam = %ctx.exam(), target = %target.id()))]
    pub fn add(&self, ctx: &ExamContext, target: &CommentTarget, new: &NewComment) -> Result<CommentRow, StoreError> {
        let content = validation::text("comment", &new.content, COMMENT)?;
        self.db.with_tx(|tx| {
            ensure_target(tx, ctx, target.scope(), target.id())?;
            let author: String = ScopedQuery::new(ctx, target.scope())
                .id(target.id())
                .fetch_one(tx, "user_id", |row| row_helpers::get(row, 0, target.scope().table(), "user_id"))?;

            let id = CommentId::new();
            ScopedInsert::new(ctx, Scope::Comments, new.exam.as_deref())
                .value("id", id.as_str().to_string())
                .value("target_kind", target.kind().to_string())
                .value("target_id", target.id().to_string())
                .value("user_id", ctx.user_id().as_str().to_string())
                .value("content", content)
                .value("created_at", now())
                .execute(tx)?;

            let (kind, activity_target) = match target {
                CommentTarget::Resource(rid) => (
                    ActivityKind::ResourceComment,
                    ActivityTarget {
                        resource_id: Some(rid),
                        ..Default::default()
                    },
                ),
                CommentTarget::Story(sid) => (
                    ActivityKind::StoryComment,
                    ActivityTarget {
                        story_id: Some(sid),
                        ..Default::default()
                    },
                ),
            };
            activities::record(tx, &UserId::from_raw(author), ctx.user_id(), kind, activity_target)?;
            fetch(tx, ctx, &id)
        })
    }

    /// Oldest first.
    pub fn list(
        &self,
        ctx: &ExamContext,
        target: &CommentTarget,
        page: PageRequest,
    ) -> Result<Page<CommentRow>, StoreError> {
        self.db.with_conn(|conn| {
            ScopedQuery::new(ctx, target.scope()).id(target.id()).require(conn)?;
            let query = ScopedQuery::new(ctx, Scope::Comments)
                .eq("target_kind", target.kind().to_string())
                .eq("target_id", target.id().to_string());
            let total = query.count(conn)?;
            let items = query.fetch_all(conn, COLUMNS, "created_at ASC, id ASC", Some(page), row_to_comment)?;
            Ok(Page::new(items, page, total))
        })
    }

    /// Author-only.
    pub fn delete(&self, ctx: &ExamContext, id: &CommentId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            ensure_target(conn, ctx, Scope::Comments, id.as_str())?;
            let current = fetch(conn, ctx, id)?;
            gate::ensure_owner(ctx, &current.user_id, "comment")?;
            ScopedQuery::new(ctx, Scope::Comments).id(id.as_str()).delete(conn)?;
            Ok(())
        })
    }
}

fn fetch(conn: &Connection, ctx: &ExamContext, id: &CommentId) -> Result<CommentRow, StoreError> {
    ScopedQuery::new(ctx, Scope::Comments)
        .id(id.as_str())
        .fetch_one(conn, COLUMNS, row_to_comment)
}

fn row_to_comment(row: &rusqlite::Row<'_>) -> Result<CommentRow, StoreError> {
    let exam: String = row_helpers::get(row, 1, "comments", "exam")?;
    Ok(CommentRow {
        id: CommentId::from_raw(row_helpers::get::<String>(row, 0, "comments", "id")?),
        exam: row_helpers::parse_enum(&exam, "comments", "exam")?,
        target_kind: row_helpers::get(row, 2, "comments", "target_kind")?,
        target_id: row_helpers::get(row, 3, "comments", "target_id")?,
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 4, "comments", "user_id")?),
        content: row_helpers::get(row, 5, "comments", "content")?,
        created_at: row_helpers::get(row, 6, "comments", "created_at")?,
    })
}
