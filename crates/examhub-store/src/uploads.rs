use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};

use examhub_core::blob::BlobHandle;
use examhub_core::ids::UserId;
use examhub_core::{gate, AccessError, ExamContext, ExamId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now};

/// Ledger of blobs this server handed out. A handle is only attachable
/// (and later deletable) when its row names the caller as uploader.
pub struct UploadRepo {
    db: Database,
}

impl UploadRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, ctx, handle), fields(user_id = %ctx.user_id(), public_id = %handle.public_id))]
    pub fn record(&self, ctx: &ExamContext, handle: &BlobHandle) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO uploads (public_id, user_id, exam, url, attached, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                rusqlite::params![
                    handle.public_id,
                    ctx.user_id().as_str(),
                    ctx.exam().as_str(),
                    handle.url,
                    now(),
                ],
            )?;
            Ok(())
        })
    }
}

struct UploadRow {
    user_id: UserId,
    exam: ExamId,
    url: String,
    attached: bool,
}

fn lookup(conn: &Connection, public_id: &str) -> Result<Option<UploadRow>, StoreError> {
    conn.query_row(
        "SELECT user_id, exam, url, attached FROM uploads WHERE public_id = ?1",
        [public_id],
        |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, bool>(3)?,
            ))
        },
    )
    .optional()?
    .map(|(user_id, exam, url, attached)| {
        Ok(UploadRow {
            user_id: UserId::from_raw(user_id),
            exam: row_helpers::parse_enum(&exam, "uploads", "exam")?,
            url,
            attached,
        })
    })
    .transpose()
}

/// Resolve a client-supplied handle against the ledger and mark it attached.
///
/// Only the uploader may attach, only once, and when `ctx` is given the
/// upload must belong to the context's exam. The returned handle carries
/// the recorded url, never the client's.
pub(crate) fn claim(
    conn: &Connection,
    owner: &UserId,
    ctx: Option<&ExamContext>,
    handle: &BlobHandle,
) -> Result<BlobHandle, StoreError> {
    let Some(row) = lookup(conn, &handle.public_id)? else {
        return Err(AccessError::validation(format!("unknown upload: {}", handle.public_id)).into());
    };
    if &row.user_id != owner {
        return Err(AccessError::NotOwner("upload".into()).into());
    }
    if let Some(ctx) = ctx {
        gate::ensure_same_exam(ctx, row.exam, format!("upload {}", handle.public_id))?;
    }
    if row.attached {
        return Err(StoreError::Conflict(format!("upload {} is already attached", handle.public_id)));
    }
    conn.execute("UPDATE uploads SET attached = 1 WHERE public_id = ?1", [&handle.public_id])?;
    debug!(public_id = %handle.public_id, "upload attached");
    Ok(BlobHandle {
        url: row.url,
        public_id: handle.public_id.clone(),
    })
}

/// Forget a recorded upload. Returns whether it was recorded, i.e. whether
/// the blob is ours to delete.
pub(crate) fn release(conn: &Connection, public_id: &str) -> Result<bool, StoreError> {
    Ok(conn.execute("DELETE FROM uploads WHERE public_id = ?1", [public_id])? > 0)
}
