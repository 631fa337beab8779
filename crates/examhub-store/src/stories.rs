use rusqlite::types::Value;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use examhub_core::gate;
use examhub_core::ids::{StoryId, UserId};
use examhub_core::paging::{Page, PageRequest};
use examhub_core::validation::{self, CONTENT, TITLE};
use examhub_core::{ExamContext, ExamId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now};
use crate::scope::{ensure_target, Scope, ScopedInsert, ScopedQuery};
use crate::votes::{self, Membership, Toggle};

const ACHIEVEMENT: (usize, usize) = (1, 120);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRow {
    pub id: StoryId,
    pub exam: ExamId,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    /// Free text such as "AIR 214" or "Band 8.0".
    pub achievement: Option<String>,
    pub likes: u64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStory {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub achievement: Option<String>,
    #[serde(default)]
    pub exam: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub achievement: Option<String>,
    pub exam: Option<String>,
}

const COLUMNS: &str = "id, exam, user_id, title, content, achievement, likes, created_at, updated_at";

pub struct StoryRepo {
    db: Database,
}

impl StoryRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, ctx, new), fields(user_id = %ctx.user_id(), exam = %ctx.exam()))]
    pub fn create(&self, ctx: &ExamContext, new: &NewStory) -> Result<StoryRow, StoreError> {
        let title = validation::text("title", &new.title, TITLE)?;
        let content = validation::text("content", &new.content, CONTENT)?;
        let achievement = new
            .achievement
            .as_deref()
            .map(|a| validation::text("achievement", a, ACHIEVEMENT))
            .transpose()?;

        self.db.with_conn(|conn| {
            let id = StoryId::new();
            let ts = now();
            ScopedInsert::new(ctx, Scope::Stories, new.exam.as_deref())
                .value("id", id.as_str().to_string())
                .value("user_id", ctx.user_id().as_str().to_string())
                .value("title", title)
                .value("content", content)
                .value("achievement", achievement)
                .value("created_at", ts.clone())
                .value("updated_at", ts)
                .execute(conn)?;
            fetch(conn, ctx, &id)
        })
    }

    pub fn get(&self, ctx: &ExamContext, id: &StoryId) -> Result<StoryRow, StoreError> {
        self.db.with_conn(|conn| fetch(conn, ctx, id))
    }

    /// Newest first; `user_id` narrows to one author.
    pub fn list(
        &self,
        ctx: &ExamContext,
        user_id: Option<&UserId>,
        page: PageRequest,
    ) -> Result<Page<StoryRow>, StoreError> {
        self.db.with_conn(|conn| {
            let query = ScopedQuery::new(ctx, Scope::Stories)
                .eq_opt("user_id", user_id.map(|u| u.as_str().to_string()));
            let total = query.count(conn)?;
            let items = query.fetch_all(conn, COLUMNS, "created_at DESC, id DESC", Some(page), row_to_story)?;
            Ok(Page::new(items, page, total))
        })
    }

    #[instrument(skip(self, ctx, patch), fields(user_id = %ctx.user_id(), story_id = %id))]
    pub fn update(&self, ctx: &ExamContext, id: &StoryId, patch: &StoryPatch) -> Result<StoryRow, StoreError> {
        self.db.with_conn(|conn| {
            ensure_target(conn, ctx, Scope::Stories, id.as_str())?;
            let current = fetch(conn, ctx, id)?;
            gate::ensure_owner(ctx, &current.user_id, "story")?;
            gate::stamp_exam(ctx, patch.exam.as_deref());

            let title = match &patch.title {
                Some(t) => validation::text("title", t, TITLE)?,
                None => current.title,
            };
            let content = match &patch.content {
                Some(c) => validation::text("content", c, CONTENT)?,
                None => current.content,
            };
            let achievement = match &patch.achievement {
                Some(a) => Some(validation::text("achievement", a, ACHIEVEMENT)?),
                None => current.achievement,
            };
            ScopedQuery::new(ctx, Scope::Stories).id(id.as_str()).update(
                conn,
                "title = ?, content = ?, achievement = ?, updated_at = ?",
                vec![
                    Value::Text(title),
                    Value::Text(content),
                    Value::from(achievement),
                    Value::Text(now()),
                ],
            )?;
            fetch(conn, ctx, id)
        })
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), story_id = %id))]
    pub fn delete(&self, ctx: &ExamContext, id: &StoryId) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            ensure_target(tx, ctx, Scope::Stories, id.as_str())?;
            let current = fetch(tx, ctx, id)?;
            gate::ensure_owner(ctx, &current.user_id, "story")?;
            ScopedQuery::new(ctx, Scope::Comments)
                .eq("target_kind", "story".to_string())
                .eq("target_id", id.as_str().to_string())
                .delete(tx)?;
            tx.execute("DELETE FROM activities WHERE story_id = ?1", [id.as_str()])?;
            ScopedQuery::new(ctx, Scope::Stories).id(id.as_str()).delete(tx)?;
            Ok(())
        })
    }

    pub fn like(&self, ctx: &ExamContext, id: &StoryId) -> Result<Toggle, StoreError> {
        self.db
            .with_tx(|tx| votes::toggle(tx, ctx, Membership::StoryLike, id.as_str()))
    }
}

fn fetch(conn: &Connection, ctx: &ExamContext, id: &StoryId) -> Result<StoryRow, StoreError> {
    ScopedQuery::new(ctx, Scope::Stories)
        .id(id.as_str())
        .fetch_one(conn, COLUMNS, row_to_story)
}

fn row_to_story(row: &rusqlite::Row<'_>) -> Result<StoryRow, StoreError> {
    let exam: String = row_helpers::get(row, 1, "stories", "exam")?;
    Ok(StoryRow {
        id: StoryId::from_raw(row_helpers::get::<String>(row, 0, "stories", "id")?),
        exam: row_helpers::parse_enum(&exam, "stories", "exam")?,
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 2, "stories", "user_id")?),
        title: row_helpers::get(row, 3, "stories", "title")?,
        content: row_helpers::get(row, 4, "stories", "content")?,
        achievement: row_helpers::get_opt(row, 5, "stories", "achievement")?,
        likes: row_helpers::get_count(row, 6, "stories", "likes")?,
        created_at: row_helpers::get(row, 7, "stories", "created_at")?,
        updated_at: row_helpers::get(row, 8, "stories", "updated_at")?,
    })
}

#[cfg(test)]
pub(crate) fn sample(title: &str) -> NewStory {
    NewStory {
        title: title.to_string(),
        content: "Eighteen months of steady preparation paid off.".to_string(),
        achievement: Some("AIR 214".to_string()),
        exam: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, TestDb};
    use examhub_core::AccessError;

    #[test]
    fn crud_round() {
        let tdb = TestDb::new();
        let repo = StoryRepo::new(tdb.db.clone());
        let ctx = context(&tdb, ExamId::Upsc);

        let mut new = sample("How I cleared prelims");
        new.exam = Some("CAT".into());
        let story = repo.create(&ctx, &new).unwrap();
        assert_eq!(story.exam, ExamId::Upsc);
        assert_eq!(story.achievement.as_deref(), Some("AIR 214"));

        let patched = repo
            .update(
                &ctx,
                &story.id,
                &StoryPatch {
                    achievement: Some("AIR 98".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(patched.achievement.as_deref(), Some("AIR 98"));
        assert_eq!(patched.title, "How I cleared prelims");

        assert_eq!(repo.list(&ctx, Some(ctx.user_id()), PageRequest::default()).unwrap().total, 1);
        repo.delete(&ctx, &story.id).unwrap();
        assert_eq!(repo.list(&ctx, None, PageRequest::default()).unwrap().total, 0);
    }

    #[test]
    fn likes_are_per_user_and_scoped() {
        let tdb = TestDb::new();
        let repo = StoryRepo::new(tdb.db.clone());
        let author = context(&tdb, ExamId::Ielts);
        let fan = context(&tdb, ExamId::Ielts);
        let outsider = context(&tdb, ExamId::Gre);
        let story = repo.create(&author, &sample("Band eight in six weeks")).unwrap();

        repo.like(&fan, &story.id).unwrap();
        repo.like(&author, &story.id).unwrap();
        assert_eq!(repo.get(&fan, &story.id).unwrap().likes, 2);

        let err = repo.like(&outsider, &story.id).unwrap_err();
        assert!(matches!(err, StoreError::Access(AccessError::CrossExamForbidden { .. })));
        let err = repo.delete(&outsider, &story.id).unwrap_err();
        assert!(matches!(err, StoreError::Access(AccessError::CrossExamForbidden { .. })));
        assert_eq!(repo.get(&author, &story.id).unwrap().likes, 2);
    }
}
