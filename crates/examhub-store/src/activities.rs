use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use examhub_core::ids::{ActivityId, QuestionId, ResourceId, StoryId, UserId};
use examhub_core::paging::{Page, PageRequest};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    AnswerPosted,
    AnswerAccepted,
    ResourceComment,
    StoryComment,
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AnswerPosted => write!(f, "answer_posted"),
            Self::AnswerAccepted => write!(f, "answer_accepted"),
            Self::ResourceComment => write!(f, "resource_comment"),
            Self::StoryComment => write!(f, "story_comment"),
        }
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "answer_posted" => Ok(Self::AnswerPosted),
            "answer_accepted" => Ok(Self::AnswerAccepted),
            "resource_comment" => Ok(Self::ResourceComment),
            "story_comment" => Ok(Self::StoryComment),
            other => Err(format!("unknown activity kind: {other}")),
        }
    }
}

/// Notification for `user_id` about something `actor_id` did.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRow {
    pub id: ActivityId,
    pub user_id: UserId,
    pub actor_id: UserId,
    pub kind: ActivityKind,
    pub question_id: Option<QuestionId>,
    pub resource_id: Option<ResourceId>,
    pub story_id: Option<StoryId>,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ActivityTarget<'a> {
    pub question_id: Option<&'a QuestionId>,
    pub resource_id: Option<&'a ResourceId>,
    pub story_id: Option<&'a StoryId>,
}

/// Record inside the caller's transaction. Acting on your own content
/// notifies nobody.
pub(crate) fn record(
    conn: &Connection,
    recipient: &UserId,
    actor: &UserId,
    kind: ActivityKind,
    target: ActivityTarget<'_>,
) -> Result<(), StoreError> {
    if recipient == actor {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO activities (id, user_id, actor_id, kind, question_id, resource_id, story_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            ActivityId::new().as_str(),
            recipient.as_str(),
            actor.as_str(),
            kind.to_string(),
            target.question_id.map(|id| id.as_str()),
            target.resource_id.map(|id| id.as_str()),
            target.story_id.map(|id| id.as_str()),
            now(),
        ],
    )?;
    Ok(())
}

pub struct ActivityRepo {
    db: Database,
}

impl ActivityRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The user's notifications, newest first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn list(&self, user_id: &UserId, page: PageRequest) -> Result<Page<ActivityRow>, StoreError> {
        self.db.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM activities WHERE user_id = ?1",
                [user_id.as_str()],
                |r| r.get(0),
            )?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, actor_id, kind, question_id, resource_id, story_id, is_read, created_at
                 FROM activities WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            )?;
            let mut rows = stmt.query(rusqlite::params![user_id.as_str(), page.limit, page.offset()])?;
            let mut items = Vec::new();
            while let Some(row) = rows.next()? {
                items.push(row_to_activity(row)?);
            }
            Ok(Page::new(items, page, total.max(0) as u64))
        })
    }

    pub fn unread_count(&self, user_id: &UserId) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM activities WHERE user_id = ?1 AND is_read = 0",
                [user_id.as_str()],
                |r| r.get(0),
            )?;
            Ok(n.max(0) as u64)
        })
    }

    /// Returns how many were marked.
    pub fn mark_all_read(&self, user_id: &UserId) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE activities SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id.as_str()],
            )?)
        })
    }
}

fn row_to_activity(row: &rusqlite::Row<'_>) -> Result<ActivityRow, StoreError> {
    let kind: String = row_helpers::get(row, 3, "activities", "kind")?;
    Ok(ActivityRow {
        id: ActivityId::from_raw(row_helpers::get::<String>(row, 0, "activities", "id")?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 1, "activities", "user_id")?),
        actor_id: UserId::from_raw(row_helpers::get::<String>(row, 2, "activities", "actor_id")?),
        kind: row_helpers::parse_enum(&kind, "activities", "kind")?,
        question_id: row_helpers::get_opt::<String>(row, 4, "activities", "question_id")?
            .map(QuestionId::from_raw),
        resource_id: row_helpers::get_opt::<String>(row, 5, "activities", "resource_id")?
            .map(ResourceId::from_raw),
        story_id: row_helpers::get_opt::<String>(row, 6, "activities", "story_id")?
            .map(StoryId::from_raw),
        is_read: row_helpers::get(row, 7, "activities", "is_read")?,
        created_at: row_helpers::get(row, 8, "activities", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, TestDb};
    use examhub_core::ExamId;

    #[test]
    fn record_list_and_mark_read() {
        let tdb = TestDb::new();
        let owner = context(&tdb, ExamId::Jee);
        let actor = context(&tdb, ExamId::Jee);
        let qid = QuestionId::new();

        tdb.db
            .with_conn(|conn| {
                record(
                    conn,
                    owner.user_id(),
                    actor.user_id(),
                    ActivityKind::AnswerPosted,
                    ActivityTarget {
                        question_id: Some(&qid),
                        ..Default::default()
                    },
                )
            })
            .unwrap();

        let repo = ActivityRepo::new(tdb.db.clone());
        let page = repo.list(owner.user_id(), PageRequest::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].kind, ActivityKind::AnswerPosted);
        assert_eq!(page.items[0].question_id.as_ref(), Some(&qid));
        assert_eq!(repo.unread_count(owner.user_id()).unwrap(), 1);

        assert_eq!(repo.mark_all_read(owner.user_id()).unwrap(), 1);
        assert_eq!(repo.unread_count(owner.user_id()).unwrap(), 0);
    }

    #[test]
    fn self_activity_is_skipped() {
        let tdb = TestDb::new();
        let me = context(&tdb, ExamId::Cat);
        tdb.db
            .with_conn(|conn| {
                record(
                    conn,
                    me.user_id(),
                    me.user_id(),
                    ActivityKind::StoryComment,
                    ActivityTarget::default(),
                )
            })
            .unwrap();
        let repo = ActivityRepo::new(tdb.db.clone());
        assert_eq!(repo.list(me.user_id(), PageRequest::default()).unwrap().total, 0);
    }
}
