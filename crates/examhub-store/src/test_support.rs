//! Fixtures shared by the repository tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use examhub_core::blob::BlobHandle;
use examhub_core::{ExamContext, ExamId};

use crate::database::Database;
use crate::subjects::{self, SubjectRow};
use crate::uploads::UploadRepo;
use crate::users::{NewUser, UserRepo};

pub struct TestDb {
    pub db: Database,
    seq: AtomicUsize,
}

impl TestDb {
    pub fn new() -> Self {
        Self {
            db: Database::in_memory().unwrap(),
            seq: AtomicUsize::new(0),
        }
    }
}

/// A fresh user enrolled in `exam`, resolved to its context.
pub fn context(tdb: &TestDb, exam: ExamId) -> ExamContext {
    let n = tdb.seq.fetch_add(1, Ordering::Relaxed);
    let email = format!("user{n}@example.com");
    let repo = UserRepo::new(tdb.db.clone());
    let user = repo
        .create(&NewUser {
            name: "Test User",
            email: &email,
            password_hash: "sha256$1$salt$hash".into(),
            primary_exam: exam,
        })
        .unwrap();
    ExamContext::resolve(Some(&repo.identity(&user.id).unwrap())).unwrap()
}

pub fn seed_subject(tdb: &TestDb, exam: ExamId, name: &str, topics: &[&str]) -> SubjectRow {
    tdb.db
        .with_conn(|conn| subjects::insert_subject(conn, exam, name, topics))
        .unwrap()
}

/// A blob recorded as uploaded by the context's user.
pub fn uploaded(tdb: &TestDb, ctx: &ExamContext, public_id: &str) -> BlobHandle {
    let handle = BlobHandle {
        url: format!("http://localhost/uploads/{public_id}"),
        public_id: public_id.into(),
    };
    UploadRepo::new(tdb.db.clone()).record(ctx, &handle).unwrap();
    handle
}
