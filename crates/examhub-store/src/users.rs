use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use examhub_core::blob::BlobHandle;
use examhub_core::ids::UserId;
use examhub_core::{validation, ExamId, Identity};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now};
use crate::solve::{self, SolveTrigger};
use crate::uploads;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub primary_exam: ExamId,
    pub is_active: bool,
    pub is_verified: bool,
    pub bio: Option<String>,
    pub avatar: Option<BlobHandle>,
    pub created_at: String,
    pub updated_at: String,
}

/// What anyone may see about a user, signed in or not.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: UserId,
    pub name: String,
    pub bio: Option<String>,
    pub avatar: Option<BlobHandle>,
    pub primary_exam: ExamId,
    pub joined_at: String,
}

impl From<UserRow> for PublicProfile {
    fn from(u: UserRow) -> Self {
        Self {
            id: u.id,
            name: u.name,
            bio: u.bio,
            avatar: u.avatar,
            primary_exam: u.primary_exam,
            joined_at: u.created_at,
        }
    }
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: String,
    pub primary_exam: ExamId,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<BlobHandle>,
}

/// Result of a profile patch.
#[derive(Clone, Debug)]
pub struct ProfileUpdate {
    pub user: UserRow,
    pub stale_avatar: Option<String>,
}

/// Counts of what an account deletion removed, plus blobs to clean up.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionSummary {
    pub questions: usize,
    pub answers: usize,
    pub resources: usize,
    pub stories: usize,
    #[serde(skip)]
    pub orphaned_blobs: Vec<String>,
}

const COLUMNS: &str = "id, name, email, primary_exam, is_active, is_verified, bio,
                       avatar_url, avatar_public_id, created_at, updated_at";

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, new), fields(email = new.email, exam = %new.primary_exam))]
    pub fn create(&self, new: &NewUser<'_>) -> Result<UserRow, StoreError> {
        let name = validation::text("name", new.name, validation::NAME)?;
        let email = validation::email(new.email)?;
        let id = UserId::new();
        let now = now();

        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password_hash, primary_exam, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    id.as_str(),
                    name,
                    email,
                    new.password_hash,
                    new.primary_exam.as_str(),
                    now,
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(e) => {
                    return Err(match StoreError::from(e) {
                        StoreError::Conflict(_) => StoreError::Conflict("email already registered".into()),
                        other => other,
                    })
                }
            }
            get_user(conn, &id)
        })
    }

    #[instrument(skip(self), fields(user_id = %id))]
    pub fn get(&self, id: &UserId) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| get_user(conn, id))
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        let email = email.trim().to_lowercase();
        self.db.with_conn(|conn| {
            let id: Option<String> = conn
                .query_row("SELECT id FROM users WHERE email = ?1", [&email], |r| r.get(0))
                .optional()?;
            id.map(|id| get_user(conn, &UserId::from_raw(id))).transpose()
        })
    }

    pub fn password_hash(&self, id: &UserId) -> Result<String, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT password_hash FROM users WHERE id = ?1",
                [id.as_str()],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
        })
    }

    /// Identity as seen by the session layer.
    pub fn identity(&self, id: &UserId) -> Result<Identity, StoreError> {
        let user = self.get(id)?;
        Ok(Identity {
            user_id: user.id,
            primary_exam: user.primary_exam,
            is_active: user.is_active,
        })
    }

    pub fn public_profile(&self, id: &UserId) -> Result<PublicProfile, StoreError> {
        self.get(id).map(PublicProfile::from)
    }

    /// A new avatar must be an unattached upload of this user; the one it
    /// replaces is handed back for deletion.
    #[instrument(skip(self, patch), fields(user_id = %id))]
    pub fn update_profile(&self, id: &UserId, patch: &ProfilePatch) -> Result<ProfileUpdate, StoreError> {
        let name = patch
            .name
            .as_deref()
            .map(|n| validation::text("name", n, validation::NAME))
            .transpose()?;
        let bio = patch
            .bio
            .as_deref()
            .map(|b| validation::text("bio", b, validation::BIO))
            .transpose()?;

        self.db.with_tx(|tx| {
            let current = get_user(tx, id)?;
            let (avatar, stale_avatar) = match (&patch.avatar, current.avatar) {
                (Some(new), Some(old)) if new.public_id == old.public_id => (Some(old), None),
                (Some(new), old) => {
                    let claimed = uploads::claim(tx, id, None, new)?;
                    let stale = match old {
                        Some(old) if uploads::release(tx, &old.public_id)? => Some(old.public_id),
                        _ => None,
                    };
                    (Some(claimed), stale)
                }
                (None, old) => (old, None),
            };
            tx.execute(
                "UPDATE users SET name = ?1, bio = ?2, avatar_url = ?3, avatar_public_id = ?4, updated_at = ?5
                 WHERE id = ?6",
                rusqlite::params![
                    name.unwrap_or(current.name),
                    bio.or(current.bio),
                    avatar.as_ref().map(|a| a.url.as_str()),
                    avatar.as_ref().map(|a| a.public_id.as_str()),
                    now(),
                    id.as_str(),
                ],
            )?;
            Ok(ProfileUpdate {
                user: get_user(tx, id)?,
                stale_avatar,
            })
        })
    }

    /// The explicit change-track operation; the only write to `primary_exam`.
    #[instrument(skip(self), fields(user_id = %id, exam = %exam))]
    pub fn change_exam(&self, id: &UserId, exam: ExamId) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET primary_exam = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![exam.as_str(), now(), id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }
            info!(user_id = %id, exam = %exam, "primary exam changed");
            get_user(conn, id)
        })
    }

    pub fn set_password(&self, id: &UserId, password_hash: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| set_password(conn, id, password_hash))
    }

    /// Returns false when no account has this email.
    pub fn mark_verified(&self, email: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_verified = 1, updated_at = ?1 WHERE email = ?2",
                rusqlite::params![now(), email.trim().to_lowercase()],
            )?;
            Ok(changed > 0)
        })
    }

    #[cfg(test)]
    pub(crate) fn set_active(&self, id: &UserId, active: bool) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![active, now(), id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Drop an account that never got its verification mail. Returns
    /// false when the id is unknown or already verified.
    #[instrument(skip(self), fields(user_id = %id))]
    pub fn discard_unverified(&self, id: &UserId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM users WHERE id = ?1 AND is_verified = 0", [id.as_str()])?;
            Ok(removed > 0)
        })
    }

    /// Delete the account and everything it owns, in one transaction.
    ///
    /// Runs without an exam context: a user's content may span exams they
    /// were enrolled in earlier. Counters on other users' content that
    /// this user contributed to are recomputed, and questions whose
    /// accepted answer disappears are reopened.
    #[instrument(skip(self), fields(user_id = %id))]
    pub fn delete_cascade(&self, id: &UserId) -> Result<DeletionSummary, StoreError> {
        let uid = id.as_str();
        self.db.with_tx(|tx| {
            let user = get_user(tx, id)?;
            let mut summary = DeletionSummary::default();

            let reopened = ids(
                tx,
                "SELECT DISTINCT question_id FROM answers WHERE user_id = ?1 AND is_accepted = 1",
                uid,
            )?;
            let answered = ids(tx, "SELECT DISTINCT question_id FROM answers WHERE user_id = ?1", uid)?;
            let voted_answers = ids(tx, "SELECT answer_id FROM answer_votes WHERE user_id = ?1", uid)?;
            let voted_resources = ids(tx, "SELECT resource_id FROM resource_votes WHERE user_id = ?1", uid)?;
            let saved_resources = ids(tx, "SELECT resource_id FROM resource_saves WHERE user_id = ?1", uid)?;
            let liked_stories = ids(tx, "SELECT story_id FROM story_likes WHERE user_id = ?1", uid)?;
            // attached or not; the rows go with the user
            summary.orphaned_blobs = ids(tx, "SELECT public_id FROM uploads WHERE user_id = ?1", uid)?;

            // Comments by the user, and comments under the user's own posts.
            tx.execute("DELETE FROM comments WHERE user_id = ?1", [uid])?;
            tx.execute(
                "DELETE FROM comments WHERE
                    (target_kind = 'resource' AND target_id IN (SELECT id FROM resources WHERE user_id = ?1))
                 OR (target_kind = 'story' AND target_id IN (SELECT id FROM stories WHERE user_id = ?1))",
                [uid],
            )?;

            summary.answers = tx.execute("DELETE FROM answers WHERE user_id = ?1", [uid])?;
            summary.questions = tx.execute("DELETE FROM questions WHERE user_id = ?1", [uid])?;
            summary.resources = tx.execute("DELETE FROM resources WHERE user_id = ?1", [uid])?;
            summary.stories = tx.execute("DELETE FROM stories WHERE user_id = ?1", [uid])?;

            tx.execute("DELETE FROM otps WHERE email = ?1", [&user.email])?;
            tx.execute("DELETE FROM users WHERE id = ?1", [uid])?;

            for qid in &answered {
                tx.execute(
                    "UPDATE questions SET answer_count = (SELECT COUNT(*) FROM answers WHERE question_id = ?1)
                     WHERE id = ?1",
                    [qid],
                )?;
            }
            for qid in &reopened {
                solve::apply_by_id(tx, qid, SolveTrigger::AcceptedAnswerRemoved)?;
            }
            for aid in &voted_answers {
                tx.execute(
                    "UPDATE answers SET upvotes = (SELECT COUNT(*) FROM answer_votes WHERE answer_id = ?1)
                     WHERE id = ?1",
                    [aid],
                )?;
            }
            for rid in voted_resources.iter().chain(&saved_resources) {
                tx.execute(
                    "UPDATE resources SET
                        upvotes = (SELECT COUNT(*) FROM resource_votes WHERE resource_id = ?1),
                        saves = (SELECT COUNT(*) FROM resource_saves WHERE resource_id = ?1)
                     WHERE id = ?1",
                    [rid],
                )?;
            }
            for sid in &liked_stories {
                tx.execute(
                    "UPDATE stories SET likes = (SELECT COUNT(*) FROM story_likes WHERE story_id = ?1)
                     WHERE id = ?1",
                    [sid],
                )?;
            }

            info!(
                user_id = %id,
                questions = summary.questions,
                answers = summary.answers,
                resources = summary.resources,
                stories = summary.stories,
                "account deleted"
            );
            Ok(summary)
        })
    }
}

pub(crate) fn set_password(conn: &Connection, id: &UserId, password_hash: &str) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![password_hash, now(), id.as_str()],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("user {id}")));
    }
    Ok(())
}

fn ids(conn: &Connection, sql: &str, param: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([param], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn get_user(conn: &Connection, id: &UserId) -> Result<UserRow, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM users WHERE id = ?1"))?;
    let mut rows = stmt.query([id.as_str()])?;
    match rows.next()? {
        Some(row) => row_to_user(row),
        None => Err(StoreError::NotFound(format!("user {id}"))),
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<UserRow, StoreError> {
    let exam: String = row_helpers::get(row, 3, "users", "primary_exam")?;
    let avatar_url: Option<String> = row_helpers::get_opt(row, 7, "users", "avatar_url")?;
    let avatar_public_id: Option<String> = row_helpers::get_opt(row, 8, "users", "avatar_public_id")?;

    Ok(UserRow {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        name: row_helpers::get(row, 1, "users", "name")?,
        email: row_helpers::get(row, 2, "users", "email")?,
        primary_exam: row_helpers::parse_enum(&exam, "users", "primary_exam")?,
        is_active: row_helpers::get(row, 4, "users", "is_active")?,
        is_verified: row_helpers::get(row, 5, "users", "is_verified")?,
        bio: row_helpers::get_opt(row, 6, "users", "bio")?,
        avatar: avatar_url
            .zip(avatar_public_id)
            .map(|(url, public_id)| BlobHandle { url, public_id }),
        created_at: row_helpers::get(row, 9, "users", "created_at")?,
        updated_at: row_helpers::get(row, 10, "users", "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::{AnswerRepo, NewAnswer};
    use crate::questions::{self, QuestionRepo};
    use crate::resources::{self, ResourceRepo};
    use crate::stories::{self, StoryRepo};
    use crate::test_support::{context, uploaded, TestDb};

    fn new_user<'a>(email: &'a str, exam: ExamId) -> NewUser<'a> {
        NewUser {
            name: "Asha Rao",
            email,
            password_hash: "sha256$1$salt$hash".into(),
            primary_exam: exam,
        }
    }

    #[test]
    fn create_and_get() {
        let tdb = TestDb::new();
        let repo = UserRepo::new(tdb.db.clone());
        let user = repo.create(&new_user("Asha@Example.com", ExamId::Jee)).unwrap();
        assert!(user.id.as_str().starts_with("usr_"));
        assert_eq!(user.email, "asha@example.com");
        assert_eq!(user.primary_exam, ExamId::Jee);
        assert!(user.is_active);
        assert!(!user.is_verified);

        let fetched = repo.get(&user.id).unwrap();
        assert_eq!(fetched.name, "Asha Rao");
    }

    #[test]
    fn duplicate_email_conflicts() {
        let tdb = TestDb::new();
        let repo = UserRepo::new(tdb.db.clone());
        repo.create(&new_user("a@example.com", ExamId::Jee)).unwrap();
        let err = repo.create(&new_user("A@example.com", ExamId::Neet)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref m) if m.contains("already registered")));
    }

    #[test]
    fn invalid_email_rejected() {
        let tdb = TestDb::new();
        let repo = UserRepo::new(tdb.db.clone());
        assert!(matches!(
            repo.create(&new_user("nope", ExamId::Jee)),
            Err(StoreError::Access(_))
        ));
    }

    #[test]
    fn change_exam_updates_identity() {
        let tdb = TestDb::new();
        let repo = UserRepo::new(tdb.db.clone());
        let user = repo.create(&new_user("a@example.com", ExamId::Jee)).unwrap();
        repo.change_exam(&user.id, ExamId::Gate).unwrap();
        assert_eq!(repo.identity(&user.id).unwrap().primary_exam, ExamId::Gate);
    }

    #[test]
    fn profile_patch_keeps_unset_fields() {
        let tdb = TestDb::new();
        let repo = UserRepo::new(tdb.db.clone());
        let ctx = context(&tdb, ExamId::Jee);
        let first = uploaded(&tdb, &ctx, "a.png");
        let patch = ProfilePatch {
            bio: Some("Aspiring engineer".into()),
            avatar: Some(first.clone()),
            ..Default::default()
        };
        let updated = repo.update_profile(ctx.user_id(), &patch).unwrap();
        assert_eq!(updated.user.name, "Test User");
        assert_eq!(updated.user.bio.as_deref(), Some("Aspiring engineer"));
        assert_eq!(updated.user.avatar, Some(first.clone()));
        assert!(updated.stale_avatar.is_none());

        // resubmitting the current avatar is a no-op
        let same = ProfilePatch {
            avatar: Some(first),
            ..Default::default()
        };
        assert!(repo.update_profile(ctx.user_id(), &same).unwrap().stale_avatar.is_none());

        let second = ProfilePatch {
            avatar: Some(uploaded(&tdb, &ctx, "b.png")),
            ..Default::default()
        };
        let replaced = repo.update_profile(ctx.user_id(), &second).unwrap();
        assert_eq!(replaced.stale_avatar.as_deref(), Some("a.png"));
        assert_eq!(replaced.user.bio.as_deref(), Some("Aspiring engineer"));
    }

    #[test]
    fn avatar_must_be_own_upload() {
        let tdb = TestDb::new();
        let repo = UserRepo::new(tdb.db.clone());
        let owner = context(&tdb, ExamId::Jee);
        let other = context(&tdb, ExamId::Jee);
        let theirs = uploaded(&tdb, &owner, "face.png");
        repo.update_profile(
            owner.user_id(),
            &ProfilePatch {
                avatar: Some(theirs.clone()),
                ..Default::default()
            },
        )
        .unwrap();

        let err = repo
            .update_profile(
                other.user_id(),
                &ProfilePatch {
                    avatar: Some(theirs),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Access(examhub_core::AccessError::NotOwner(_))));
        assert!(repo.get(other.user_id()).unwrap().avatar.is_none());

        let unknown = BlobHandle {
            url: "http://elsewhere/x.png".into(),
            public_id: "x.png".into(),
        };
        let err = repo
            .update_profile(
                other.user_id(),
                &ProfilePatch {
                    avatar: Some(unknown),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Access(examhub_core::AccessError::Validation(_))));
    }

    #[test]
    fn discard_unverified_frees_the_email() {
        let tdb = TestDb::new();
        let repo = UserRepo::new(tdb.db.clone());
        let pending = repo.create(&new_user("a@example.com", ExamId::Jee)).unwrap();
        assert!(repo.discard_unverified(&pending.id).unwrap());
        assert!(repo.find_by_email("a@example.com").unwrap().is_none());
        repo.create(&new_user("a@example.com", ExamId::Jee)).unwrap();

        let verified = repo.create(&new_user("b@example.com", ExamId::Jee)).unwrap();
        repo.mark_verified("b@example.com").unwrap();
        assert!(!repo.discard_unverified(&verified.id).unwrap());
        assert!(repo.get(&verified.id).is_ok());
    }

    fn answer(text: &str) -> NewAnswer {
        NewAnswer {
            content: text.to_string(),
            exam: None,
        }
    }

    #[test]
    fn deleting_helper_reopens_question_and_recounts() {
        let tdb = TestDb::new();
        let owner = context(&tdb, ExamId::Jee);
        let helper = context(&tdb, ExamId::Jee);
        let voter = context(&tdb, ExamId::Jee);
        let questions = QuestionRepo::new(tdb.db.clone());
        let answers = AnswerRepo::new(tdb.db.clone());

        let q = questions.create(&owner, &questions::sample("Work energy theorem")).unwrap();
        let accepted = answers.create(&helper, &q.id, &answer("Friction does negative work here.")).unwrap();
        answers.create(&voter, &q.id, &answer("Integrate force over displacement.")).unwrap();
        answers.upvote(&voter, &accepted.id).unwrap();
        answers.accept(&owner, &accepted.id).unwrap();
        let before = questions.get(&owner, &q.id).unwrap();
        assert!(before.is_solved);
        assert_eq!(before.answer_count, 2);

        let summary = UserRepo::new(tdb.db.clone()).delete_cascade(helper.user_id()).unwrap();
        assert_eq!(summary.answers, 1);
        assert_eq!(summary.questions, 0);

        let after = questions.get(&owner, &q.id).unwrap();
        assert_eq!(after.answer_count, 1);
        assert!(!after.is_solved);
        assert!(after.solved_at.is_none());
        let votes: i64 = tdb
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM answer_votes", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(votes, 0);

        // the last answer going leaves nothing behind
        UserRepo::new(tdb.db.clone()).delete_cascade(voter.user_id()).unwrap();
        let empty = questions.get(&owner, &q.id).unwrap();
        assert_eq!(empty.answer_count, 0);
        assert!(!empty.is_solved);
    }

    #[test]
    fn deleting_member_recounts_votes_saves_and_likes() {
        let tdb = TestDb::new();
        let author = context(&tdb, ExamId::Gre);
        let fan = context(&tdb, ExamId::Gre);
        let other_fan = context(&tdb, ExamId::Gre);
        let resources = ResourceRepo::new(tdb.db.clone());
        let stories = StoryRepo::new(tdb.db.clone());
        let questions = QuestionRepo::new(tdb.db.clone());
        let answers = AnswerRepo::new(tdb.db.clone());

        let r = resources.create(&author, &resources::sample_note("Word roots list")).unwrap();
        resources.upvote(&fan, &r.id).unwrap();
        resources.save(&fan, &r.id).unwrap();
        resources.save(&other_fan, &r.id).unwrap();
        let story = stories.create(&author, &stories::sample("Three twenty eight on the retake")).unwrap();
        stories.like(&fan, &story.id).unwrap();
        stories.like(&other_fan, &story.id).unwrap();
        let q = questions.create(&other_fan, &questions::sample("Sentence equivalence pairs")).unwrap();
        let a = answers.create(&author, &q.id, &answer("Look for the pivot word first.")).unwrap();
        answers.upvote(&fan, &a.id).unwrap();

        let summary = UserRepo::new(tdb.db.clone()).delete_cascade(fan.user_id()).unwrap();
        assert_eq!((summary.questions, summary.answers, summary.resources, summary.stories), (0, 0, 0, 0));

        let r = resources.get(&author, &r.id).unwrap();
        assert_eq!((r.upvotes, r.saves), (0, 1));
        assert_eq!(stories.get(&author, &story.id).unwrap().likes, 1);
        assert_eq!(answers.get(&author, &a.id).unwrap().upvotes, 0);
    }

    #[test]
    fn deleting_author_hands_back_every_upload() {
        let tdb = TestDb::new();
        let author = context(&tdb, ExamId::Gate);
        let repo = UserRepo::new(tdb.db.clone());
        let mut pdf = resources::sample_note("Previous year paper");
        pdf.kind = resources::ResourceKind::Pdf;
        pdf.file = Some(uploaded(&tdb, &author, "paper.pdf"));
        ResourceRepo::new(tdb.db.clone()).create(&author, &pdf).unwrap();
        repo.update_profile(
            author.user_id(),
            &ProfilePatch {
                avatar: Some(uploaded(&tdb, &author, "face.png")),
                ..Default::default()
            },
        )
        .unwrap();
        uploaded(&tdb, &author, "draft.pdf");

        let mut summary = repo.delete_cascade(author.user_id()).unwrap();
        summary.orphaned_blobs.sort();
        assert_eq!(summary.orphaned_blobs, ["draft.pdf", "face.png", "paper.pdf"]);
        assert_eq!(summary.resources, 1);
        let left: i64 = tdb
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM uploads", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(left, 0);
    }

    #[test]
    fn mark_verified_by_email() {
        let tdb = TestDb::new();
        let repo = UserRepo::new(tdb.db.clone());
        let user = repo.create(&new_user("a@example.com", ExamId::Jee)).unwrap();
        assert!(repo.mark_verified("A@example.com").unwrap());
        assert!(repo.get(&user.id).unwrap().is_verified);
        assert!(!repo.mark_verified("ghost@example.com").unwrap());
    }

    #[test]
    fn public_profile_hides_email() {
        let tdb = TestDb::new();
        let repo = UserRepo::new(tdb.db.clone());
        let user = repo.create(&new_user("a@example.com", ExamId::Upsc)).unwrap();
        let profile = repo.public_profile(&user.id).unwrap();
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["primaryExam"], "UPSC");
    }
}
