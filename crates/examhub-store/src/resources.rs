use rusqlite::types::Value;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use examhub_core::blob::BlobHandle;
use examhub_core::gate;
use examhub_core::ids::{ResourceId, SubjectId, TopicId, UserId};
use examhub_core::paging::{Page, PageRequest};
use examhub_core::validation::{self, CONTENT, TITLE};
use examhub_core::{AccessError, ExamContext, ExamId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now};
use crate::scope::{ensure_target, verify_references, Scope, ScopedInsert, ScopedQuery, VerifiedRefs};
use crate::uploads;
use crate::votes::{self, Membership, Toggle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Note,
    Pdf,
    Link,
    Video,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Note => write!(f, "note"),
            Self::Pdf => write!(f, "pdf"),
            Self::Link => write!(f, "link"),
            Self::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = AccessError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "note" => Ok(Self::Note),
            "pdf" => Ok(Self::Pdf),
            "link" => Ok(Self::Link),
            "video" => Ok(Self::Video),
            other => Err(AccessError::validation(format!("unknown resource kind: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResourceSort {
    #[default]
    Newest,
    Oldest,
    Popular,
}

impl ResourceSort {
    fn order_by(&self) -> &'static str {
        match self {
            Self::Newest => "created_at DESC, id DESC",
            Self::Oldest => "created_at ASC, id ASC",
            Self::Popular => "upvotes DESC, saves DESC, created_at DESC",
        }
    }
}

impl std::str::FromStr for ResourceSort {
    type Err = AccessError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "popular" => Ok(Self::Popular),
            other => Err(AccessError::validation(format!("unknown sort: {other}"))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRow {
    pub id: ResourceId,
    pub exam: ExamId,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub kind: ResourceKind,
    pub url: Option<String>,
    pub file: Option<BlobHandle>,
    pub subject_id: Option<SubjectId>,
    pub topic_id: Option<TopicId>,
    pub upvotes: u64,
    pub saves: u64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResource {
    pub title: String,
    pub description: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file: Option<BlobHandle>,
    #[serde(default)]
    pub subject_id: Option<SubjectId>,
    #[serde(default)]
    pub topic_id: Option<TopicId>,
    #[serde(default)]
    pub exam: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub subject_id: Option<SubjectId>,
    pub topic_id: Option<TopicId>,
    pub exam: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ResourceFilter {
    pub subject_id: Option<SubjectId>,
    pub topic_id: Option<TopicId>,
    pub kind: Option<ResourceKind>,
    pub user_id: Option<UserId>,
    pub q: Option<String>,
    pub sort: ResourceSort,
}

const COLUMNS: &str = "id, exam, user_id, title, description, kind, url, file_url, file_public_id, \
                       subject_id, topic_id, upvotes, saves, created_at, updated_at";

pub struct ResourceRepo {
    db: Database,
}

impl ResourceRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, ctx, new), fields(user_id = %ctx.user_id(), exam = %ctx.exam(), kind = %new.kind))]
    pub fn create(&self, ctx: &ExamContext, new: &NewResource) -> Result<ResourceRow, StoreError> {
        let title = validation::text("title", &new.title, TITLE)?;
        let description = validation::text("description", &new.description, CONTENT)?;
        let url = new.url.as_deref().map(check_url).transpose()?;
        check_kind(new.kind, url.as_deref(), new.file.as_ref())?;

        self.db.with_tx(|tx| {
            let refs = verify_references(tx, ctx, new.subject_id.as_ref(), new.topic_id.as_ref())?;
            let file = new
                .file
                .as_ref()
                .map(|f| uploads::claim(tx, ctx.user_id(), Some(ctx), f))
                .transpose()?;
            let id = ResourceId::new();
            let ts = now();
            ScopedInsert::new(ctx, Scope::Resources, new.exam.as_deref())
                .value("id", id.as_str().to_string())
                .value("user_id", ctx.user_id().as_str().to_string())
                .value("title", title)
                .value("description", description)
                .value("kind", new.kind.to_string())
                .value("url", url)
                .value("file_url", file.as_ref().map(|f| f.url.clone()))
                .value("file_public_id", file.map(|f| f.public_id))
                .value("subject_id", refs.subject_id.map(|s| s.as_str().to_string()))
                .value("topic_id", refs.topic_id.map(|t| t.as_str().to_string()))
                .value("created_at", ts.clone())
                .value("updated_at", ts)
                .execute(tx)?;
            debug!(resource_id = %id, "resource created");
            fetch(tx, ctx, &id)
        })
    }

    pub fn get(&self, ctx: &ExamContext, id: &ResourceId) -> Result<ResourceRow, StoreError> {
        self.db.with_conn(|conn| fetch(conn, ctx, id))
    }

    #[instrument(skip(self, ctx, filter), fields(exam = %ctx.exam()))]
    pub fn list(
        &self,
        ctx: &ExamContext,
        filter: &ResourceFilter,
        page: PageRequest,
    ) -> Result<Page<ResourceRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut query = ScopedQuery::new(ctx, Scope::Resources)
                .eq_opt("subject_id", filter.subject_id.as_ref().map(|s| s.as_str().to_string()))
                .eq_opt("topic_id", filter.topic_id.as_ref().map(|t| t.as_str().to_string()))
                .eq_opt("kind", filter.kind.map(|k| k.to_string()))
                .eq_opt("user_id", filter.user_id.as_ref().map(|u| u.as_str().to_string()));
            if let Some(q) = &filter.q {
                query = query.contains_text(&["title", "description"], q);
            }
            let total = query.count(conn)?;
            let items = query.fetch_all(conn, COLUMNS, filter.sort.order_by(), Some(page), row_to_resource)?;
            Ok(Page::new(items, page, total))
        })
    }

    /// Resources the caller saved, within the caller's exam.
    pub fn saved(&self, ctx: &ExamContext, page: PageRequest) -> Result<Page<ResourceRow>, StoreError> {
        self.db.with_conn(|conn| {
            let query = ScopedQuery::new(ctx, Scope::Resources).filter_with(
                "id IN (SELECT resource_id FROM resource_saves WHERE user_id = ?)",
                ctx.user_id().as_str().to_string(),
            );
            let total = query.count(conn)?;
            let items = query.fetch_all(conn, COLUMNS, "created_at DESC, id DESC", Some(page), row_to_resource)?;
            Ok(Page::new(items, page, total))
        })
    }

    #[instrument(skip(self, ctx, patch), fields(user_id = %ctx.user_id(), resource_id = %id))]
    pub fn update(
        &self,
        ctx: &ExamContext,
        id: &ResourceId,
        patch: &ResourcePatch,
    ) -> Result<ResourceRow, StoreError> {
        self.db.with_tx(|tx| {
            ensure_target(tx, ctx, Scope::Resources, id.as_str())?;
            let current = fetch(tx, ctx, id)?;
            gate::ensure_owner(ctx, &current.user_id, "resource")?;
            gate::stamp_exam(ctx, patch.exam.as_deref());

            let title = match &patch.title {
                Some(t) => validation::text("title", t, TITLE)?,
                None => current.title,
            };
            let description = match &patch.description {
                Some(d) => validation::text("description", d, CONTENT)?,
                None => current.description,
            };
            let url = match &patch.url {
                Some(u) => Some(check_url(u)?),
                None => current.url,
            };
            check_kind(current.kind, url.as_deref(), current.file.as_ref())?;

            let refs = if patch.subject_id.is_some() || patch.topic_id.is_some() {
                let subject = patch.subject_id.as_ref().or(current.subject_id.as_ref());
                let topic = match (&patch.subject_id, &patch.topic_id) {
                    (_, Some(t)) => Some(t),
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

            ScopedQuery::new(ctx, Scope::Resources).id(id.as_str()).update(
                tx,
                "title = ?, description = ?, url = ?, subject_id = ?, topic_id = ?, updated_at = ?",
                vec![
                    Value::Text(title),
                    Value::Text(description),
                    Value::from(url),
                    Value::from(refs.subject_id.map(|s| s.as_str().to_string())),
                    Value::from(refs.topic_id.map(|t| t.as_str().to_string())),
                    Value::Text(now()),
                ],
            )?;
            fetch(tx, ctx, id)
        })
    }

    /// Owner-only. Returns the blob to delete, if the resource had a
    /// recorded upload attached.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id(), resource_id = %id))]
    pub fn delete(&self, ctx: &ExamContext, id: &ResourceId) -> Result<Option<String>, StoreError> {
        self.db.with_tx(|tx| {
            ensure_target(tx, ctx, Scope::Resources, id.as_str())?;
            let current = fetch(tx, ctx, id)?;
            gate::ensure_owner(ctx, &current.user_id, "resource")?;
            ScopedQuery::new(ctx, Scope::Comments)
                .eq("target_kind", "resource".to_string())
                .eq("target_id", id.as_str().to_string())
                .delete(tx)?;
            tx.execute("DELETE FROM activities WHERE resource_id = ?1", [id.as_str()])?;
            ScopedQuery::new(ctx, Scope::Resources).id(id.as_str()).delete(tx)?;
            match current.file {
                Some(f) if uploads::release(tx, &f.public_id)? => Ok(Some(f.public_id)),
                _ => Ok(None),
            }
        })
    }

    pub fn upvote(&self, ctx: &ExamContext, id: &ResourceId) -> Result<Toggle, StoreError> {
        self.db
            .with_tx(|tx| votes::toggle(tx, ctx, Membership::ResourceVote, id.as_str()))
    }

    /// Toggle the resource in the caller's saved list.
    pub fn save(&self, ctx: &ExamContext, id: &ResourceId) -> Result<Toggle, StoreError> {
        self.db
            .with_tx(|tx| votes::toggle(tx, ctx, Membership::ResourceSave, id.as_str()))
    }

    pub fn is_saved(&self, ctx: &ExamContext, id: &ResourceId) -> Result<bool, StoreError> {
        self.db
            .with_conn(|conn| votes::is_member(conn, ctx, Membership::ResourceSave, id.as_str()))
    }
}

fn check_url(raw: &str) -> Result<String, AccessError> {
    let url = raw.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) || url.len() > 2048 {
        return Err(AccessError::validation("url must be an http(s) link"));
    }
    Ok(url.to_string())
}

fn check_kind(kind: ResourceKind, url: Option<&str>, file: Option<&BlobHandle>) -> Result<(), AccessError> {
    match kind {
        ResourceKind::Link | ResourceKind::Video if url.is_none() => {
            Err(AccessError::validation(format!("{kind} resources need a url")))
        }
        ResourceKind::Pdf if file.is_none() => Err(AccessError::validation("pdf resources need an uploaded file")),
        _ => Ok(()),
    }
}

fn fetch(conn: &Connection, ctx: &ExamContext, id: &ResourceId) -> Result<ResourceRow, StoreError> {
    ScopedQuery::new(ctx, Scope::Resources)
        .id(id.as_str())
        .fetch_one(conn, COLUMNS, row_to_resource)
}

fn row_to_resource(row: &rusqlite::Row<'_>) -> Result<ResourceRow, StoreError> {
    let exam: String = row_helpers::get(row, 1, "resources", "exam")?;
    let kind: String = row_helpers::get(row, 5, "resources", "kind")?;
    let file_url: Option<String> = row_helpers::get_opt(row, 7, "resources", "file_url")?;
    let file_public_id: Option<String> = row_helpers::get_opt(row, 8, "resources", "file_public_id")?;
    Ok(ResourceRow {
        id: ResourceId::from_raw(row_helpers::get::<String>(row, 0, "resources", "id")?),
        exam: row_helpers::parse_enum(&exam, "resources", "exam")?,
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 2, "resources", "user_id")?),
        title: row_helpers::get(row, 3, "resources", "title")?,
        description: row_helpers::get(row, 4, "resources", "description")?,
        kind: row_helpers::parse_enum(&kind, "resources", "kind")?,
        url: row_helpers::get_opt(row, 6, "resources", "url")?,
        file: file_url
            .zip(file_public_id)
            .map(|(url, public_id)| BlobHandle { url, public_id }),
        subject_id: row_helpers::get_opt::<String>(row, 9, "resources", "subject_id")?
            .map(SubjectId::from_raw),
        topic_id: row_helpers::get_opt::<String>(row, 10, "resources", "topic_id")?.map(TopicId::from_raw),
        upvotes: row_helpers::get_count(row, 11, "resources", "upvotes")?,
        saves: row_helpers::get_count(row, 12, "resources", "saves")?,
        created_at: row_helpers::get(row, 13, "resources", "created_at")?,
        updated_at: row_helpers::get(row, 14, "resources", "updated_at")?,
    })
}

#[cfg(test)]
pub(crate) fn sample_note(title: &str) -> NewResource {
    NewResource {
        title: title.to_string(),
        description: "Condensed revision notes for the chapter.".to_string(),
        kind: ResourceKind::Note,
        url: None,
        file: None,
        subject_id: None,
        topic_id: None,
        exam: None,
    }
}
