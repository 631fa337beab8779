use rusqlite::types::Value;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use examhub_core::gate;
use examhub_core::ids::{QuestionId, SubjectId, TopicId, UserId};
use examhub_core::paging::{Page, PageRequest};
use examhub_core::validation::{self, CONTENT, TITLE};
use examhub_core::{AccessError, ExamContext, ExamId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now};
use crate::scope::{ensure_target, verify_references, Scope, ScopedInsert, ScopedQuery, VerifiedRefs};
use crate::solve::{self, SolveTrigger};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = AccessError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(AccessError::validation(format!("unknown difficulty: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QuestionSort {
    #[default]
    Newest,
    Oldest,
    MostViewed,
    MostAnswered,
    Unanswered,
}

impl QuestionSort {
    fn order_by(&self) -> &'static str {
        match self {
            Self::Newest | Self::Unanswered => "created_at DESC, id DESC",
            Self::Oldest => "created_at ASC, id ASC",
            Self::MostViewed => "views DESC, created_at DESC",
            Self::MostAnswered => "answer_count DESC, created_at DESC",
        }
    }
}

impl std::str::FromStr for QuestionSort {
    type Err = AccessError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "views" => Ok(Self::MostViewed),
            "answers" => Ok(Self::MostAnswered),
            "unanswered" => Ok(Self::Unanswered),
            other => Err(AccessError::validation(format!("unknown sort: {other}"))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRow {
    pub id: QuestionId,
    pub exam: ExamId,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub subject_id: Option<SubjectId>,
    pub topic_id: Option<TopicId>,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub views: u64,
    pub answer_count: u64,
    pub is_solved: bool,
    pub solved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Create payload. `exam` is accepted so clients that send it do not fail
/// deserialization; it is never persisted.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub subject_id: Option<SubjectId>,
    #[serde(default)]
    pub topic_id: Option<TopicId>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub exam: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub subject_id: Option<SubjectId>,
    pub topic_id: Option<TopicId>,
    pub difficulty: Option<Difficulty>,
    pub tags: Option<Vec<String>>,
    pub exam: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct QuestionFilter {
    pub subject_id: Option<SubjectId>,
    pub topic_id: Option<TopicId>,
    pub difficulty: Option<Difficulty>,
    pub solved: Option<bool>,
    pub user_id: Option<UserId>,
    pub q: Option<String>,
    pub sort: QuestionSort,
}

const COLUMNS: &str = "id, exam, user_id, title, content, subject_id, topic_id, difficulty, tags, \
                       views, answer_count, is_solved, solved_at, created_at, updated_at";

pub struct QuestionRepo {
    db: Database,
}

impl QuestionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, ctx, new), fields(user_id = %ctx.user_id(), exam = %ctx.exam()))]
    pub fn create(&self, ctx: &ExamContext, new: &NewQuestion) -> Result<QuestionRow, StoreError> {
        let title = validation::text("title", &new.title, TITLE)?;
        let content = validation::text("content", &new.content, CONTENT)?;
        let tags = validation::tags(&new.tags)?;
        let difficulty = new.difficulty.unwrap_or_default();

        self.db.with_conn(|conn| {
            let refs = verify_references(conn, ctx, new.subject_id.as_ref(), new.topic_id.as_ref())?;
            let id = QuestionId::new();
            let ts = now();
            ScopedInsert::new(ctx, Scope::Questions, new.exam.as_deref())
                .value("id", id.as_str().to_string())
                .value("user_id", ctx.user_id().as_str().to_string())
                .value("title", title)
                .value("content", content)
                .value("subject_id", refs.subject_id.map(|s| s.as_str().to_string()))
                .value("topic_id", refs.topic_id.map(|t| t.as_str().to_string()))
                .value("difficulty", difficulty.to_string())
                .value("tags", serde_json::to_string(&tags)?)
                .value("created_at", ts.clone())
                .value("updated_at", ts)
                .execute(conn)?;
            debug!(question_id = %id, "question created");
            fetch(conn, ctx, &id)
        })
    }

    pub fn get(&self, ctx: &ExamContext, id: &QuestionId) -> Result<QuestionRow, StoreError> {
        self.db.with_conn(|conn| fetch(conn, ctx, id))
    }

    /// Read for display; bumps the view counter atomically.
    #[instrument(skip(self, ctx), fields(exam = %ctx.exam(), question_id = %id))]
    pub fn view(&self, ctx: &ExamContext, id: &QuestionId) -> Result<QuestionRow, StoreError> {
        self.db.with_conn(|conn| {
            let scoped = ScopedQuery::new(ctx, Scope::Questions).id(id.as_str());
            if scoped.update(conn, "views = views + 1", vec![])? == 0 {
                return Err(scoped.not_found());
            }
            fetch(conn, ctx, id)
        })
    }

    #[instrument(skip(self, ctx, filter), fields(exam = %ctx.exam()))]
    pub fn list(
        &self,
        ctx: &ExamContext,
        filter: &QuestionFilter,
        page: PageRequest,
    ) -> Result<Page<QuestionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut query = ScopedQuery::new(ctx, Scope::Questions)
                .eq_opt("subject_id", filter.subject_id.as_ref().map(|s| s.as_str().to_string()))
                .eq_opt("topic_id", filter.topic_id.as_ref().map(|t| t.as_str().to_string()))
                .eq_opt("difficulty", filter.difficulty.map(|d| d.to_string()))
                .eq_opt("is_solved", filter.solved)
                .eq_opt("user_id", filter.user_id.as_ref().map(|u| u.as_str().to_string()));
            if let Some(q) = &filter.q {
                query = query.contains_text(&["title", "content"], q);
            }
            if filter.sort == QuestionSort::Unanswered {
                query = query.filter("answer_count = 0");
            }
            let total = query.count(conn)?;
            let items = query.fetch_all(conn, COLUMNS, filter.sort.order_by(), Some(page), row_to_question)?;
            Ok(Page::new(items, page, total))
        })
    }

    #[instrument(skip(self, ctx, patch), fields(user_id = %ctx.user_id(), question_id = %id))]
    pub fn update(
        &self,
        ctx: &ExamContext,
        id: &QuestionId,
        patch: &QuestionPatch,
    ) -> Result<QuestionRow, StoreError> {
        self.db.with_tx(|tx| {
            ensure_target(tx, ctx, Scope::Questions, id.as_str())?;
            let current = fetch(tx, ctx, id)?;
            gate::ensure_owner(ctx, &current.user_id, "question")?;
            gate::stamp_exam(ctx, patch.exam.as_deref());

            let title = match &patch.title {
                Some(t) => validation::text("title", t, TITLE)?,
                None => current.title,
            };
            let content = match &patch.content {
                Some(c) => validation::text("content", c, CONTENT)?,
                None => current.content,
            };
            let tags = match &patch.tags {
                Some(t) => validation::tags(t)?,
                None => current.tags,
            };
            let difficulty = patch.difficulty.unwrap_or(current.difficulty);

            let refs = if patch.subject_id.is_some() || patch.topic_id.is_some() {
                let subject = patch.subject_id.as_ref().or(current.subject_id.as_ref());
                let topic = match (&patch.subject_id, &patch.topic_id) {
                    (_, Some(t)) => Some(t),
                    // a new subject drops the old topic unless one is given
                    (Some(_), None) => None,
                    (None, None) => current.topic_id.as_ref(),
                };
                verify_references(tx, ctx, subject, topic)?
            } else {
                VerifiedRefs {
                    subject_id: current.subject_id,
                    topic_id: current.topic_id,
                }
            };

            ScopedQuery::new(ctx, Scope::Questions).id(id.as_str()).update(
                tx,
                "title = ?, content = ?, tags = ?, difficulty = ?, subject_id = ?, topic_id = ?, updated_at = ?",
                vec![
                    Value::Text(title),
                    Value::Text(content),
                    Value::Text(serde_json::to_string(&tags)?),
                    Value::Text(difficulty.to_string()),
                    Value::from(refs.subject_id.map(|s| s.as_str().to_string())),
                    Value::from(refs.topic_id.map(|t| t.as_str().to_string())),
                    Value::Text(now()),
                ],
            )?;
            fetch(tx, ctx, id)
        })
    }

    /// Owner-only. Answers and their votes go with the question.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), question_id = %id))]
    pub fn delete(&self, ctx: &ExamContext, id: &QuestionId) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            ensure_target(tx, ctx, Scope::Questions, id.as_str())?;
            let current = fetch(tx, ctx, id)?;
            gate::ensure_owner(ctx, &current.user_id, "question")?;
            tx.execute("DELETE FROM activities WHERE question_id = ?1", [id.as_str()])?;
            ScopedQuery::new(ctx, Scope::Questions).id(id.as_str()).delete(tx)?;
            Ok(())
        })
    }

    /// Owner flips solved state. Reopening clears any accepted answer.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), question_id = %id))]
    pub fn toggle_solved(&self, ctx: &ExamContext, id: &QuestionId) -> Result<QuestionRow, StoreError> {
        self.db.with_tx(|tx| {
            ensure_target(tx, ctx, Scope::Questions, id.as_str())?;
            let current = fetch(tx, ctx, id)?;
            gate::ensure_owner(ctx, &current.user_id, "question")?;
            solve::apply(tx, ctx, id, SolveTrigger::OwnerToggle)?;
            fetch(tx, ctx, id)
        })
    }
}

pub(crate) fn fetch(conn: &Connection, ctx: &ExamContext, id: &QuestionId) -> Result<QuestionRow, StoreError> {
    ScopedQuery::new(ctx, Scope::Questions)
        .id(id.as_str())
        .fetch_one(conn, COLUMNS, row_to_question)
}

fn row_to_question(row: &rusqlite::Row<'_>) -> Result<QuestionRow, StoreError> {
    let exam: String = row_helpers::get(row, 1, "questions", "exam")?;
    let difficulty: String = row_helpers::get(row, 7, "questions", "difficulty")?;
    let tags: String = row_helpers::get(row, 8, "questions", "tags")?;
    Ok(QuestionRow {
        id: QuestionId::from_raw(row_helpers::get::<String>(row, 0, "questions", "id")?),
        exam: row_helpers::parse_enum(&exam, "questions", "exam")?,
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 2, "questions", "user_id")?),
        title: row_helpers::get(row, 3, "questions", "title")?,
        content: row_helpers::get(row, 4, "questions", "content")?,
        subject_id: row_helpers::get_opt::<String>(row, 5, "questions", "subject_id")?
            .map(SubjectId::from_raw),
        topic_id: row_helpers::get_opt::<String>(row, 6, "questions", "topic_id")?.map(TopicId::from_raw),
        difficulty: row_helpers::parse_enum(&difficulty, "questions", "difficulty")?,
        tags: row_helpers::parse_string_list(&tags, "questions", "tags")?,
        views: row_helpers::get_count(row, 9, "questions", "views")?,
        answer_count: row_helpers::get_count(row, 10, "questions", "answer_count")?,
        is_solved: row_helpers::get(row, 11, "questions", "is_solved")?,
        solved_at: row_helpers::get_opt(row, 12, "questions", "solved_at")?,
        created_at: row_helpers::get(row, 13, "questions", "created_at")?,
        updated_at: row_helpers::get(row, 14, "questions", "updated_at")?,
    })
}

#[cfg(test)]
pub(crate) fn sample(title: &str) -> NewQuestion {
    NewQuestion {
        title: title.to_string(),
        content: "What is the derivation of this result?".to_string(),
        ..Default::default()
    }
}
