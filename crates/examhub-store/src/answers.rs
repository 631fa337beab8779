use rusqlite::types::Value;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use examhub_core::gate;
use examhub_core::ids::{AnswerId, QuestionId, UserId};
use examhub_core::paging::{Page, PageRequest};
use examhub_core::validation::{self, CONTENT};
use examhub_core::{AccessError, ExamContext, ExamId};

use crate::activities::{self, ActivityKind, ActivityTarget};
use crate::database::Database;
use crate::error::StoreError;
use crate::questions;
use crate::row_helpers::{self, now};
use crate::scope::{ensure_target, Scope, ScopedInsert, ScopedQuery};
use crate::solve::{self, SolveTrigger};
use crate::votes::{self, Membership, Toggle};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRow {
    pub id: AnswerId,
    pub exam: ExamId,
    pub question_id: QuestionId,
    pub user_id: UserId,
    pub content: String,
    pub is_accepted: bool,
    pub upvotes: u64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnswer {
    pub content: String,
    #[serde(default)]
    pub exam: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPatch {
    pub content: Option<String>,
    pub exam: Option<String>,
}

const COLUMNS: &str = "id, exam, question_id, user_id, content, is_accepted, upvotes, created_at, updated_at";

/// Attempts for the accept workflow before the inconsistency surfaces.
const ACCEPT_ATTEMPTS: usize = 2;

pub struct AnswerRepo {
    db: Database,
}

impl AnswerRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Answer a question. A question of another exam is a forbidden write
    /// target, not an invisible one.
    #[instrument(skip(self, ctx, new), fields(user_id = %ctx.user_id(), exam = %ctx.exam(), question_id = %question_id))]
    pub fn create(
        &self,
        ctx: &ExamContext,
        question_id: &QuestionId,
        new: &NewAnswer,
    ) -> Result<AnswerRow, StoreError> {
        let content = validation::text("content", &new.content, CONTENT)?;
        self.db.with_tx(|tx| {
            ensure_target(tx, ctx, Scope::Questions, question_id.as_str())?;
            let question = questions::fetch(tx, ctx, question_id)?;

            let id = AnswerId::new();
            let ts = now();
            ScopedInsert::new(ctx, Scope::Answers, new.exam.as_deref())
                .value("id", id.as_str().to_string())
                .value("question_id", question_id.as_str().to_string())
                .value("user_id", ctx.user_id().as_str().to_string())
                .value("content", content)
                .value("created_at", ts.clone())
                .value("updated_at", ts)
                .execute(tx)?;
            recount_answers(tx, ctx, question_id)?;

            activities::record(
                tx,
                &question.user_id,
                ctx.user_id(),
                ActivityKind::AnswerPosted,
                ActivityTarget {
                    question_id: Some(question_id),
                    ..Default::default()
                },
            )?;
            fetch(tx, ctx, &id)
        })
    }

    /// Accepted first, then by votes, then oldest first.
    pub fn list_for_question(
        &self,
        ctx: &ExamContext,
        question_id: &QuestionId,
        page: PageRequest,
    ) -> Result<Page<AnswerRow>, StoreError> {
        self.db.with_conn(|conn| {
            ScopedQuery::new(ctx, Scope::Questions)
                .id(question_id.as_str())
                .require(conn)?;
            let query = ScopedQuery::new(ctx, Scope::Answers).eq("question_id", question_id.as_str().to_string());
            let total = query.count(conn)?;
            let items = query.fetch_all(
                conn,
                COLUMNS,
                "is_accepted DESC, upvotes DESC, created_at ASC",
                Some(page),
                row_to_answer,
            )?;
            Ok(Page::new(items, page, total))
        })
    }

    pub fn get(&self, ctx: &ExamContext, id: &AnswerId) -> Result<AnswerRow, StoreError> {
        self.db.with_conn(|conn| fetch(conn, ctx, id))
    }

    #[instrument(skip(self, ctx, patch), fields(user_id = %ctx.user_id(), answer_id = %id))]
    pub fn update(&self, ctx: &ExamContext, id: &AnswerId, patch: &AnswerPatch) -> Result<AnswerRow, StoreError> {
        self.db.with_conn(|conn| {
            ensure_target(conn, ctx, Scope::Answers, id.as_str())?;
            let current = fetch(conn, ctx, id)?;
            gate::ensure_owner(ctx, &current.user_id, "answer")?;
            gate::stamp_exam(ctx, patch.exam.as_deref());
            let Some(content) = &patch.content else {
                return Ok(current);
            };
            let content = validation::text("content", content, CONTENT)?;
            ScopedQuery::new(ctx, Scope::Answers).id(id.as_str()).update(
                conn,
                "content = ?, updated_at = ?",
                vec![Value::Text(content), Value::Text(now())],
            )?;
            fetch(conn, ctx, id)
        })
    }

    /// Owner-only. Removing the accepted answer reopens the question.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), answer_id = %id))]
    pub fn delete(&self, ctx: &ExamContext, id: &AnswerId) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            ensure_target(tx, ctx, Scope::Answers, id.as_str())?;
            let current = fetch(tx, ctx, id)?;
            gate::ensure_owner(ctx, &current.user_id, "answer")?;
            ScopedQuery::new(ctx, Scope::Answers).id(id.as_str()).delete(tx)?;
            recount_answers(tx, ctx, &current.question_id)?;
            if current.is_accepted {
                solve::apply(tx, ctx, &current.question_id, SolveTrigger::AcceptedAnswerRemoved)?;
            }
            Ok(())
        })
    }

    /// Question owner marks `id` as the accepted answer. Other answers are
    /// unset before this one is set, and the question is marked solved, in
    /// one transaction. An inconsistent outcome is retried once.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), exam = %ctx.exam(), answer_id = %id))]
    pub fn accept(&self, ctx: &ExamContext, id: &AnswerId) -> Result<AnswerRow, StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.db.with_tx(|tx| accept_once(tx, ctx, id)) {
                Err(StoreError::Access(e)) if e.is_retryable() && attempt < ACCEPT_ATTEMPTS => {
                    warn!(attempt, error = %e, "accept answer inconsistent, retrying");
                }
                other => return other,
            }
        }
    }

    /// Toggle the caller's upvote.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), answer_id = %id))]
    pub fn upvote(&self, ctx: &ExamContext, id: &AnswerId) -> Result<Toggle, StoreError> {
        self.db
            .with_tx(|tx| votes::toggle(tx, ctx, Membership::AnswerVote, id.as_str()))
    }
}

fn accept_once(conn: &Connection, ctx: &ExamContext, id: &AnswerId) -> Result<AnswerRow, StoreError> {
    ensure_target(conn, ctx, Scope::Answers, id.as_str())?;
    let answer = fetch(conn, ctx, id)?;
    let question = questions::fetch(conn, ctx, &answer.question_id)?;
    gate::ensure_owner(ctx, &question.user_id, "question")?;

    ScopedQuery::new(ctx, Scope::Answers)
        .eq("question_id", answer.question_id.as_str().to_string())
        .ne("id", id.as_str().to_string())
        .eq("is_accepted", true)
        .update(conn, "is_accepted = 0, updated_at = ?", vec![Value::Text(now())])?;

    let set = ScopedQuery::new(ctx, Scope::Answers)
        .id(id.as_str())
        .update(conn, "is_accepted = 1", vec![])?;
    if set == 0 {
        return Err(AccessError::ConcurrencyInconsistency(format!("answer {id} vanished during accept")).into());
    }

    solve::apply(conn, ctx, &answer.question_id, SolveTrigger::AnswerAccepted)?;

    let accepted = ScopedQuery::new(ctx, Scope::Answers)
        .eq("question_id", answer.question_id.as_str().to_string())
        .eq("is_accepted", true)
        .count(conn)?;
    if accepted != 1 {
        return Err(AccessError::ConcurrencyInconsistency(format!(
            "question {} has {accepted} accepted answers",
            answer.question_id
        ))
        .into());
    }

    if !answer.is_accepted {
        activities::record(
            conn,
            &answer.user_id,
            ctx.user_id(),
            ActivityKind::AnswerAccepted,
            ActivityTarget {
                question_id: Some(&answer.question_id),
                ..Default::default()
            },
        )?;
    }
    fetch(conn, ctx, id)
}

fn recount_answers(conn: &Connection, ctx: &ExamContext, question_id: &QuestionId) -> Result<(), StoreError> {
    ScopedQuery::new(ctx, Scope::Questions).id(question_id.as_str()).update(
        conn,
        "answer_count = (SELECT COUNT(*) FROM answers WHERE question_id = ?)",
        vec![Value::Text(question_id.as_str().to_string())],
    )?;
    Ok(())
}

fn fetch(conn: &Connection, ctx: &ExamContext, id: &AnswerId) -> Result<AnswerRow, StoreError> {
    ScopedQuery::new(ctx, Scope::Answers)
        .id(id.as_str())
        .fetch_one(conn, COLUMNS, row_to_answer)
}

fn row_to_answer(row: &rusqlite::Row<'_>) -> Result<AnswerRow, StoreError> {
    let exam: String = row_helpers::get(row, 1, "answers", "exam")?;
    Ok(AnswerRow {
        id: AnswerId::from_raw(row_helpers::get::<String>(row, 0, "answers", "id")?),
        exam: row_helpers::parse_enum(&exam, "answers", "exam")?,
        question_id: QuestionId::from_raw(row_helpers::get::<String>(row, 2, "answers", "question_id")?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 3, "answers", "user_id")?),
        content: row_helpers::get(row, 4, "answers", "content")?,
        is_accepted: row_helpers::get(row, 5, "answers", "is_accepted")?,
        upvotes: row_helpers::get_count(row, 6, "answers", "upvotes")?,
        created_at: row_helpers::get(row, 7, "answers", "created_at")?,
        updated_at: row_helpers::get(row, 8, "answers", "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::ActivityRepo;
    use crate::questions::{sample, QuestionRepo};
    use crate::test_support::{context, TestDb};

    fn answer(text: &str) -> NewAnswer {
        NewAnswer {
            content: text.to_string(),
            exam: None,
        }
    }

    struct Thread {
        tdb: TestDb,
        asker: ExamContext,
        helper: ExamContext,
        question: QuestionId,
    }

    fn thread(exam: ExamId) -> Thread {
        let tdb = TestDb::new();
        let asker = context(&tdb, exam);
        let helper = context(&tdb, exam);
        let question = QuestionRepo::new(tdb.db.clone())
            .create(&asker, &sample("How do I approach this?"))
            .unwrap()
            .id;
        Thread {
            tdb,
            asker,
            helper,
            question,
        }
    }

    #[test]
    fn create_counts_and_notifies() {
        let t = thread(ExamId::Jee);
        let repo = AnswerRepo::new(t.tdb.db.clone());
        let a = repo.create(&t.helper, &t.question, &answer("Use energy conservation here.")).unwrap();
        assert_eq!(a.exam, ExamId::Jee);

        let q = QuestionRepo::new(t.tdb.db.clone()).get(&t.asker, &t.question).unwrap();
        assert_eq!(q.answer_count, 1);

        let feed = ActivityRepo::new(t.tdb.db.clone())
            .list(t.asker.user_id(), PageRequest::default())
            .unwrap();
        assert_eq!(feed.items[0].kind, ActivityKind::AnswerPosted);
    }

    #[test]
    fn answering_other_exam_question_is_forbidden() {
        let t = thread(ExamId::Jee);
        let outsider = context(&t.tdb, ExamId::Neet);
        let repo = AnswerRepo::new(t.tdb.db.clone());
        let mut new = answer("Trying to sneak in an answer.");
        new.exam = Some("JEE".into());
        let err = repo.create(&outsider, &t.question, &new).unwrap_err();
        assert!(matches!(err, StoreError::Access(AccessError::CrossExamForbidden { .. })));

        let err = repo
            .list_for_question(&outsider, &t.question, PageRequest::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Access(AccessError::ExamResourceNotFound(_))));
    }

    #[test]
    fn accept_moves_acceptance_and_solves() {
        let t = thread(ExamId::Gate);
        let repo = AnswerRepo::new(t.tdb.db.clone());
        let a1 = repo.create(&t.helper, &t.question, &answer("First answer with detail.")).unwrap();
        let a2 = repo.create(&t.helper, &t.question, &answer("Second answer with detail.")).unwrap();

        repo.accept(&t.asker, &a2.id).unwrap();
        let accepted = repo.accept(&t.asker, &a1.id).unwrap();
        assert!(accepted.is_accepted);
        assert!(!repo.get(&t.asker, &a2.id).unwrap().is_accepted);

        let q = QuestionRepo::new(t.tdb.db.clone()).get(&t.asker, &t.question).unwrap();
        assert!(q.is_solved);

        let page = repo.list_for_question(&t.asker, &t.question, PageRequest::default()).unwrap();
        assert_eq!(page.items[0].id, a1.id);
        assert_eq!(page.items.iter().filter(|a| a.is_accepted).count(), 1);
    }

    #[test]
    fn only_question_owner_accepts() {
        let t = thread(ExamId::Cat);
        let repo = AnswerRepo::new(t.tdb.db.clone());
        let a = repo.create(&t.helper, &t.question, &answer("An answer worth accepting.")).unwrap();
        let err = repo.accept(&t.helper, &a.id).unwrap_err();
        assert!(matches!(err, StoreError::Access(AccessError::NotOwner(_))));
    }

    #[test]
    fn reopening_clears_acceptance() {
        let t = thread(ExamId::Gmat);
        let repo = AnswerRepo::new(t.tdb.db.clone());
        let questions = QuestionRepo::new(t.tdb.db.clone());
        let a = repo.create(&t.helper, &t.question, &answer("Plug in the numbers.")).unwrap();
        repo.accept(&t.asker, &a.id).unwrap();

        let reopened = questions.toggle_solved(&t.asker, &t.question).unwrap();
        assert!(!reopened.is_solved);
        assert!(!repo.get(&t.asker, &a.id).unwrap().is_accepted);
    }

    #[test]
    fn deleting_accepted_answer_reopens_question() {
        let t = thread(ExamId::Upsc);
        let repo = AnswerRepo::new(t.tdb.db.clone());
        let a = repo.create(&t.helper, &t.question, &answer("Refer to the Laxmikanth chapter.")).unwrap();
        repo.accept(&t.asker, &a.id).unwrap();
        repo.delete(&t.helper, &a.id).unwrap();

        let q = QuestionRepo::new(t.tdb.db.clone()).get(&t.asker, &t.question).unwrap();
        assert!(!q.is_solved);
        assert!(q.solved_at.is_none());
        assert_eq!(q.answer_count, 0);
    }

    #[test]
    fn upvote_toggles() {
        let t = thread(ExamId::Ibps);
        let repo = AnswerRepo::new(t.tdb.db.clone());
        let a = repo.create(&t.helper, &t.question, &answer("Practice mock tests daily.")).unwrap();
        assert_eq!(repo.upvote(&t.asker, &a.id).unwrap(), Toggle { active: true, count: 1 });
        assert_eq!(repo.upvote(&t.asker, &a.id).unwrap(), Toggle { active: false, count: 0 });
    }
}
