//! Exam-scoped query and insert builders.
//!
//! Every read, update and delete against an exam-scoped table goes through
//! [`ScopedQuery`], and every insert through [`ScopedInsert`]. Both can only
//! be constructed from an [`ExamContext`], and both place the exam
//! predicate (or the exam column) first, before any caller-supplied filter.
//! Callers add filters; they cannot remove or replace the exam predicate,
//! and there is no API that builds an unscoped content query.
//!
//! The single exception is [`probe_exam`], which returns only the exam of a
//! row. It exists for reject-on-mismatch checks on writes and never yields
//! content.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

use examhub_core::gate;
use examhub_core::ids::{SubjectId, TopicId};
use examhub_core::paging::PageRequest;
use examhub_core::{AccessError, ExamContext, ExamId};

use crate::error::StoreError;
use crate::row_helpers;

/// Exam-scoped tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Subjects,
    Topics,
    Questions,
    Answers,
    Resources,
    Stories,
    Comments,
}

impl Scope {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Subjects => "subjects",
            Self::Topics => "topics",
            Self::Questions => "questions",
            Self::Answers => "answers",
            Self::Resources => "resources",
            Self::Stories => "stories",
            Self::Comments => "comments",
        }
    }

    /// Name used in not-found messages.
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Subjects => "subject",
            Self::Topics => "topic",
            Self::Questions => "question",
            Self::Answers => "answer",
            Self::Resources => "resource",
            Self::Stories => "story",
            Self::Comments => "comment",
        }
    }
}

pub struct ScopedQuery<'c> {
    ctx: &'c ExamContext,
    scope: Scope,
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl<'c> ScopedQuery<'c> {
    pub fn new(ctx: &'c ExamContext, scope: Scope) -> Self {
        Self {
            ctx,
            scope,
            clauses: vec!["exam = ?".to_string()],
            params: vec![Value::Text(ctx.exam().as_str().to_string())],
        }
    }

    pub fn context(&self) -> &ExamContext {
        self.ctx
    }

    pub fn id(self, id: &str) -> Self {
        self.eq("id", id.to_string())
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(format!("{column} = ?"));
        self.params.push(value.into());
        self
    }

    pub fn eq_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn ne(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(format!("{column} != ?"));
        self.params.push(value.into());
        self
    }

    /// Constant predicate without parameters, e.g. `"answer_count = 0"`.
    pub fn filter(mut self, predicate: &'static str) -> Self {
        self.clauses.push(predicate.to_string());
        self
    }

    /// Membership predicate with a subquery bound to one parameter,
    /// e.g. `"id IN (SELECT resource_id FROM resource_saves WHERE user_id = ?)"`.
    pub fn filter_with(mut self, predicate: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(predicate.to_string());
        self.params.push(value.into());
        self
    }

    /// Case-insensitive substring match on any of `columns`.
    pub fn contains_text(mut self, columns: &[&'static str], needle: &str) -> Self {
        let needle = needle.trim();
        if needle.is_empty() || columns.is_empty() {
            return self;
        }
        let pattern = format!("%{}%", row_helpers::escape_like(needle));
        let ors = columns
            .iter()
            .map(|c| format!("{c} LIKE ? ESCAPE '\\'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.clauses.push(format!("({ors})"));
        for _ in columns {
            self.params.push(Value::Text(pattern.clone()));
        }
        self
    }

    fn where_sql(&self) -> String {
        self.clauses.join(" AND ")
    }

    pub fn not_found(&self) -> StoreError {
        AccessError::not_found(self.scope.noun()).into()
    }

    pub fn fetch_all<T, F>(
        &self,
        conn: &Connection,
        columns: &str,
        order_by: &str,
        page: Option<PageRequest>,
        mut map: F,
    ) -> Result<Vec<T>, StoreError>
    where
        F: FnMut(&Row<'_>) -> Result<T, StoreError>,
    {
        let mut sql = format!(
            "SELECT {columns} FROM {} WHERE {} ORDER BY {order_by}",
            self.scope.table(),
            self.where_sql()
        );
        let mut params = self.params.clone();
        if let Some(page) = page {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(i64::from(page.limit)));
            params.push(Value::Integer(i64::from(page.offset())));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(map(row)?);
        }
        Ok(out)
    }

    /// First matching row, or `ExamResourceNotFound`.
    pub fn fetch_one<T, F>(&self, conn: &Connection, columns: &str, map: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Row<'_>) -> Result<T, StoreError>,
    {
        let sql = format!(
            "SELECT {columns} FROM {} WHERE {} LIMIT 1",
            self.scope.table(),
            self.where_sql()
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(self.params.iter()))?;
        match rows.next()? {
            Some(row) => map(row),
            None => Err(self.not_found()),
        }
    }

    pub fn count(&self, conn: &Connection) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.scope.table(),
            self.where_sql()
        );
        let n: i64 = conn.query_row(&sql, params_from_iter(self.params.iter()), |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }

    /// `Ok(())` when at least one row matches, else `ExamResourceNotFound`.
    pub fn require(&self, conn: &Connection) -> Result<(), StoreError> {
        if self.count(conn)? > 0 {
            Ok(())
        } else {
            Err(self.not_found())
        }
    }

    /// `UPDATE <table> SET <assignments> WHERE <scope>`; returns rows changed.
    /// `assignments` must never touch the `exam` column.
    pub fn update(
        &self,
        conn: &Connection,
        assignments: &str,
        values: Vec<Value>,
    ) -> Result<usize, StoreError> {
        debug_assert!(!assignments.contains("exam"), "exam is immutable");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {}",
            self.scope.table(),
            self.where_sql()
        );
        let params = values.into_iter().chain(self.params.iter().cloned());
        Ok(conn.execute(&sql, params_from_iter(params))?)
    }

    pub fn delete(&self, conn: &Connection) -> Result<usize, StoreError> {
        let sql = format!("DELETE FROM {} WHERE {}", self.scope.table(), self.where_sql());
        Ok(conn.execute(&sql, params_from_iter(self.params.iter()))?)
    }
}

/// Insert whose `exam` column is always the context's exam.
pub struct ScopedInsert {
    scope: Scope,
    columns: Vec<&'static str>,
    values: Vec<Value>,
}

impl ScopedInsert {
    /// `claimed_exam` is whatever the client sent; it is logged and dropped.
    pub fn new(ctx: &ExamContext, scope: Scope, claimed_exam: Option<&str>) -> Self {
        let exam = gate::stamp_exam(ctx, claimed_exam);
        Self {
            scope,
            columns: vec!["exam"],
            values: vec![Value::Text(exam.as_str().to_string())],
        }
    }

    pub fn value(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        debug_assert_ne!(column, "exam", "exam is stamped from the context");
        if column != "exam" {
            self.columns.push(column);
            self.values.push(value.into());
        }
        self
    }

    pub fn execute(self, conn: &Connection) -> Result<(), StoreError> {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.scope.table(),
            self.columns.join(", ")
        );
        conn.execute(&sql, params_from_iter(self.values.iter()))?;
        Ok(())
    }
}

/// Exam of a row, ignoring the context. For reject-on-mismatch only.
pub fn probe_exam(conn: &Connection, scope: Scope, id: &str) -> Result<Option<ExamId>, StoreError> {
    let sql = format!("SELECT exam FROM {} WHERE id = ?1", scope.table());
    let raw: Option<String> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    raw.map(|s| row_helpers::parse_enum(&s, scope.table(), "exam"))
        .transpose()
}

/// Reject-on-mismatch for a write that targets an existing row by id:
/// absent → not found, other exam → forbidden.
pub fn ensure_target(
    conn: &Connection,
    ctx: &ExamContext,
    scope: Scope,
    id: &str,
) -> Result<(), StoreError> {
    match probe_exam(conn, scope, id)? {
        None => Err(AccessError::not_found(scope.noun()).into()),
        Some(exam) => Ok(gate::ensure_same_exam(ctx, exam, format!("{} {id}", scope.noun()))?),
    }
}

/// Subject/topic references after server-side verification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifiedRefs {
    pub subject_id: Option<SubjectId>,
    pub topic_id: Option<TopicId>,
}

/// Re-fetch referenced subject and topic and check their own exam against
/// the context. A topic without a subject adopts the topic's subject.
pub fn verify_references(
    conn: &Connection,
    ctx: &ExamContext,
    subject_id: Option<&SubjectId>,
    topic_id: Option<&TopicId>,
) -> Result<VerifiedRefs, StoreError> {
    if let Some(subject_id) = subject_id {
        ensure_target(conn, ctx, Scope::Subjects, subject_id.as_str())?;
    }

    let Some(topic_id) = topic_id else {
        return Ok(VerifiedRefs {
            subject_id: subject_id.cloned(),
            topic_id: None,
        });
    };

    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT exam, subject_id FROM topics WHERE id = ?1",
            [topic_id.as_str()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((exam, topic_subject)) = row else {
        return Err(AccessError::not_found("topic").into());
    };
    let exam: ExamId = row_helpers::parse_enum(&exam, "topics", "exam")?;
    gate::ensure_same_exam(ctx, exam, format!("topic {topic_id}"))?;

    let topic_subject = SubjectId::from_raw(topic_subject);
    if let Some(subject_id) = subject_id {
        if *subject_id != topic_subject {
            return Err(AccessError::validation("topic does not belong to subject").into());
        }
    }

    Ok(VerifiedRefs {
        subject_id: Some(topic_subject),
        topic_id: Some(topic_id.clone()),
    })
}
