use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use examhub_core::exam::{self, ExamId};
use examhub_core::ids::{SubjectId, TopicId};
use examhub_core::validation::slugify;
use examhub_core::ExamContext;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now};
use crate::scope::{Scope, ScopedQuery};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRow {
    pub id: TopicId,
    pub subject_id: SubjectId,
    pub exam: ExamId,
    pub name: String,
    pub slug: String,
    pub position: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub id: SubjectId,
    pub exam: ExamId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub position: i64,
    pub topics: Vec<TopicRow>,
}

const SUBJECT_COLUMNS: &str = "id, exam, name, slug, description, position";
const TOPIC_COLUMNS: &str = "id, subject_id, exam, name, slug, position";

pub struct SubjectRepo {
    db: Database,
}

impl SubjectRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Subjects of the caller's exam, each with its ordered topics.
    #[instrument(skip(self, ctx), fields(exam = %ctx.exam()))]
    pub fn list(&self, ctx: &ExamContext) -> Result<Vec<SubjectRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut subjects = ScopedQuery::new(ctx, Scope::Subjects).fetch_all(
                conn,
                SUBJECT_COLUMNS,
                "position ASC, name ASC",
                None,
                row_to_subject,
            )?;
            for subject in &mut subjects {
                subject.topics = topics_of(conn, ctx, &subject.id)?;
            }
            Ok(subjects)
        })
    }

    #[instrument(skip(self, ctx), fields(exam = %ctx.exam()))]
    pub fn get_by_slug(&self, ctx: &ExamContext, slug: &str) -> Result<SubjectRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut subject = ScopedQuery::new(ctx, Scope::Subjects)
                .eq("slug", slug.to_string())
                .fetch_one(conn, SUBJECT_COLUMNS, row_to_subject)?;
            subject.topics = topics_of(conn, ctx, &subject.id)?;
            Ok(subject)
        })
    }

    /// Insert the registry taxonomy for every exam. Existing subjects and
    /// topics (matched by slug) are left alone, so this is safe on every start.
    #[instrument(skip(self))]
    pub fn seed_from_registry(&self) -> Result<usize, StoreError> {
        self.db.with_tx(|tx| {
            let mut created = 0;
            for exam in ExamId::ALL {
                for (position, template) in exam::subjects_for(exam).iter().enumerate() {
                    let (subject_id, new) = ensure_subject(tx, exam, template.name, position as i64)?;
                    created += usize::from(new);
                    for (tpos, topic) in template.topics.iter().enumerate() {
                        if find_topic(tx, &subject_id, &slugify(topic))?.is_none() {
                            create_topic(tx, &subject_id, exam, topic, tpos as i64)?;
                            created += 1;
                        }
                    }
                }
            }
            info!(created, "subject taxonomy seeded");
            Ok(created)
        })
    }

    /// Add a topic under a subject. `exam` must equal the subject's own
    /// exam, which is re-read here rather than trusted.
    #[cfg(test)]
    pub(crate) fn add_topic(
        &self,
        subject_id: &SubjectId,
        exam: ExamId,
        name: &str,
    ) -> Result<TopicRow, StoreError> {
        self.db.with_conn(|conn| {
            let position: i64 = conn.query_row(
                "SELECT COUNT(*) FROM topics WHERE subject_id = ?1",
                [subject_id.as_str()],
                |r| r.get(0),
            )?;
            create_topic(conn, subject_id, exam, name, position)
        })
    }
}

fn ensure_subject(
    conn: &Connection,
    exam: ExamId,
    name: &str,
    position: i64,
) -> Result<(SubjectId, bool), StoreError> {
    let slug = slugify(name);
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM subjects WHERE exam = ?1 AND slug = ?2",
            [exam.as_str(), slug.as_str()],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok((SubjectId::from_raw(id), false));
    }
    let id = SubjectId::new();
    conn.execute(
        "INSERT INTO subjects (id, exam, name, slug, position, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![id.as_str(), exam.as_str(), name, slug, position, now()],
    )?;
    Ok((id, true))
}

fn find_topic(conn: &Connection, subject_id: &SubjectId, slug: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id FROM topics WHERE subject_id = ?1 AND slug = ?2",
            [subject_id.as_str(), slug],
            |r| r.get(0),
        )
        .optional()?)
}

pub(crate) fn create_topic(
    conn: &Connection,
    subject_id: &SubjectId,
    exam: ExamId,
    name: &str,
    position: i64,
) -> Result<TopicRow, StoreError> {
    let subject_exam: Option<String> = conn
        .query_row(
            "SELECT exam FROM subjects WHERE id = ?1",
            [subject_id.as_str()],
            |r| r.get(0),
        )
        .optional()?;
    let Some(subject_exam) = subject_exam else {
        return Err(StoreError::NotFound(format!("subject {subject_id}")));
    };
    let subject_exam: ExamId = row_helpers::parse_enum(&subject_exam, "subjects", "exam")?;
    if subject_exam != exam {
        return Err(StoreError::Conflict(format!(
            "topic exam {exam} does not match subject exam {subject_exam}"
        )));
    }

    let topic = TopicRow {
        id: TopicId::new(),
        subject_id: subject_id.clone(),
        exam,
        name: name.to_string(),
        slug: slugify(name),
        position,
    };
    conn.execute(
        "INSERT INTO topics (id, subject_id, exam, name, slug, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            topic.id.as_str(),
            topic.subject_id.as_str(),
            topic.exam.as_str(),
            topic.name,
            topic.slug,
            topic.position,
            now(),
        ],
    )?;
    Ok(topic)
}

fn topics_of(conn: &Connection, ctx: &ExamContext, subject_id: &SubjectId) -> Result<Vec<TopicRow>, StoreError> {
    ScopedQuery::new(ctx, Scope::Topics)
        .eq("subject_id", subject_id.as_str().to_string())
        .fetch_all(conn, TOPIC_COLUMNS, "position ASC, name ASC", None, row_to_topic)
}

fn row_to_subject(row: &rusqlite::Row<'_>) -> Result<SubjectRow, StoreError> {
    let exam: String = row_helpers::get(row, 1, "subjects", "exam")?;
    Ok(SubjectRow {
        id: SubjectId::from_raw(row_helpers::get::<String>(row, 0, "subjects", "id")?),
        exam: row_helpers::parse_enum(&exam, "subjects", "exam")?,
        name: row_helpers::get(row, 2, "subjects", "name")?,
        slug: row_helpers::get(row, 3, "subjects", "slug")?,
        description: row_helpers::get_opt(row, 4, "subjects", "description")?,
        position: row_helpers::get(row, 5, "subjects", "position")?,
        topics: Vec::new(),
    })
}

fn row_to_topic(row: &rusqlite::Row<'_>) -> Result<TopicRow, StoreError> {
    let exam: String = row_helpers::get(row, 2, "topics", "exam")?;
    Ok(TopicRow {
        id: TopicId::from_raw(row_helpers::get::<String>(row, 0, "topics", "id")?),
        subject_id: SubjectId::from_raw(row_helpers::get::<String>(row, 1, "topics", "subject_id")?),
        exam: row_helpers::parse_enum(&exam, "topics", "exam")?,
        name: row_helpers::get(row, 3, "topics", "name")?,
        slug: row_helpers::get(row, 4, "topics", "slug")?,
        position: row_helpers::get(row, 5, "topics", "position")?,
    })
}

/// Direct insert used by test fixtures across modules.
#[cfg(test)]
pub(crate) fn insert_subject(
    conn: &Connection,
    exam: ExamId,
    name: &str,
    topics: &[&str],
) -> Result<SubjectRow, StoreError> {
    let (id, _) = ensure_subject(conn, exam, name, 0)?;
    let mut rows = Vec::new();
    for (i, topic) in topics.iter().enumerate() {
        rows.push(create_topic(conn, &id, exam, topic, i as i64)?);
    }
    Ok(SubjectRow {
        id,
        exam,
        name: name.to_string(),
        slug: slugify(name),
        description: None,
        position: 0,
        topics: rows,
    })
}
