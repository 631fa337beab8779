//! Question solved-state machine.
//!
//! `Open -> Solved` by owner toggle or accepting an answer, `Solved -> Open`
//! by owner toggle or removal of the accepted answer. Every write of
//! `is_solved`/`solved_at` goes through [`transition`], and reopening a
//! question always clears `is_accepted` on its answers, so an accepted
//! answer implies a solved question.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};

use examhub_core::ids::QuestionId;
use examhub_core::ExamContext;

use crate::error::StoreError;
use crate::row_helpers::{self, now};
use crate::scope::{Scope, ScopedQuery};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolveState {
    pub is_solved: bool,
    pub solved_at: Option<String>,
}

impl SolveState {
    pub fn open() -> Self {
        Self {
            is_solved: false,
            solved_at: None,
        }
    }

    fn solved(at: &str) -> Self {
        Self {
            is_solved: true,
            solved_at: Some(at.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveTrigger {
    OwnerToggle,
    AnswerAccepted,
    AcceptedAnswerRemoved,
}

/// Pure transition. Accepting on an already-solved question keeps the
/// original `solved_at`, so re-applying it is a no-op.
pub fn transition(current: &SolveState, trigger: SolveTrigger, at: &str) -> SolveState {
    match trigger {
        SolveTrigger::OwnerToggle if current.is_solved => SolveState::open(),
        SolveTrigger::OwnerToggle => SolveState::solved(at),
        SolveTrigger::AnswerAccepted if current.is_solved => current.clone(),
        SolveTrigger::AnswerAccepted => SolveState::solved(at),
        SolveTrigger::AcceptedAnswerRemoved => SolveState::open(),
    }
}

/// Apply a trigger to a question visible in `ctx`.
pub(crate) fn apply(
    conn: &Connection,
    ctx: &ExamContext,
    question_id: &QuestionId,
    trigger: SolveTrigger,
) -> Result<SolveState, StoreError> {
    let scoped = ScopedQuery::new(ctx, Scope::Questions).id(question_id.as_str());
    let current = scoped.fetch_one(conn, "is_solved, solved_at", |row| {
        Ok(SolveState {
            is_solved: row_helpers::get(row, 0, "questions", "is_solved")?,
            solved_at: row_helpers::get_opt(row, 1, "questions", "solved_at")?,
        })
    })?;
    let next = transition(&current, trigger, &now());

    if !next.is_solved {
        ScopedQuery::new(ctx, Scope::Answers)
            .eq("question_id", question_id.as_str().to_string())
            .eq("is_accepted", true)
            .update(conn, "is_accepted = 0", vec![])?;
    }
    scoped.update(
        conn,
        "is_solved = ?, solved_at = ?, updated_at = ?",
        vec![
            Value::from(next.is_solved),
            Value::from(next.solved_at.clone()),
            Value::Text(now()),
        ],
    )?;
    Ok(next)
}

/// Context-free variant for account deletion, which touches questions of
/// any exam. Returns `None` when the question no longer exists.
pub(crate) fn apply_by_id(
    conn: &Connection,
    question_id: &str,
    trigger: SolveTrigger,
) -> Result<Option<SolveState>, StoreError> {
    let current = conn
        .query_row(
            "SELECT is_solved, solved_at FROM questions WHERE id = ?1",
            [question_id],
            |row| {
                Ok(SolveState {
                    is_solved: row.get(0)?,
                    solved_at: row.get(1)?,
                })
            },
        )
        .optional()?;
    let Some(current) = current else {
        return Ok(None);
    };
    let next = transition(&current, trigger, &now());

    if !next.is_solved {
        conn.execute(
            "UPDATE answers SET is_accepted = 0 WHERE question_id = ?1 AND is_accepted = 1",
            [question_id],
        )?;
    }
    conn.execute(
        "UPDATE questions SET is_solved = ?1, solved_at = ?2, updated_at = ?3 WHERE id = ?4",
        rusqlite::params![next.is_solved, next.solved_at, now(), question_id],
    )?;
    Ok(Some(next))
}
