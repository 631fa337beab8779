use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use examhub_store::activities::ActivityRepo;
use examhub_store::answers::AnswerRepo;
use examhub_store::comments::CommentRepo;
use examhub_store::otps::OtpRepo;
use examhub_store::questions::QuestionRepo;
use examhub_store::reset_tokens::ResetTokenRepo;
use examhub_store::resources::ResourceRepo;
use examhub_store::sessions::SessionRepo;
use examhub_store::stories::StoryRepo;
use examhub_store::subjects::SubjectRepo;
use examhub_store::uploads::UploadRepo;
use examhub_store::users::UserRepo;
use examhub_store::Database;

use crate::blob::{BlobStore, LocalBlobStore};
use crate::handlers::{activities, answers, auth, comments, exams, questions, resources, stories, uploads, users};
use crate::mailer::{LogMailer, Mailer};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root for the database and uploaded files.
    pub data_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Base URL blobs are served from.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("data"),
            max_upload_bytes: 10 * 1024 * 1024,
            public_url: "http://localhost:8080".into(),
        }
    }
}

impl ServerConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("examhub.db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<ServerConfig>,
    pub blobs: Arc<dyn BlobStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// State with the local blob store and the log mailer.
    pub fn new(config: ServerConfig, db: Database) -> Self {
        let blobs = Arc::new(LocalBlobStore::new(config.uploads_dir(), config.public_url.clone()));
        Self {
            db,
            config: Arc::new(config),
            blobs,
            mailer: Arc::new(LogMailer),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn users(&self) -> UserRepo {
        UserRepo::new(self.db.clone())
    }

    pub fn sessions(&self) -> SessionRepo {
        SessionRepo::new(self.db.clone())
    }

    pub fn otps(&self) -> OtpRepo {
        OtpRepo::new(self.db.clone())
    }

    pub fn reset_tokens(&self) -> ResetTokenRepo {
        ResetTokenRepo::new(self.db.clone())
    }

    pub fn subjects(&self) -> SubjectRepo {
        SubjectRepo::new(self.db.clone())
    }

    pub fn questions(&self) -> QuestionRepo {
        QuestionRepo::new(self.db.clone())
    }

    pub fn answers(&self) -> AnswerRepo {
        AnswerRepo::new(self.db.clone())
    }

    pub fn resources(&self) -> ResourceRepo {
        ResourceRepo::new(self.db.clone())
    }

    pub fn stories(&self) -> StoryRepo {
        StoryRepo::new(self.db.clone())
    }

    pub fn comments(&self) -> CommentRepo {
        CommentRepo::new(self.db.clone())
    }

    pub fn activities(&self) -> ActivityRepo {
        ActivityRepo::new(self.db.clone())
    }

    pub fn uploads(&self) -> UploadRepo {
        UploadRepo::new(self.db.clone())
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    let upload_routes = Router::new()
        .route("/uploads", post(uploads::upload))
        .layer(DefaultBodyLimit::max(upload_limit));

    Router::new()
        .route("/health", get(health_handler))
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/verify-otp", post(auth::verify_otp))
        .route("/auth/resend-otp", post(auth::resend_otp))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        // Users
        .route("/users/me", get(users::me).patch(users::update_me).delete(users::delete_me))
        .route("/users/me/exam", put(users::change_exam))
        .route("/users/me/password", post(users::change_password))
        .route("/users/me/saved-resources", get(users::saved_resources))
        .route("/users/{id}/profile", get(users::public_profile))
        // Exams & subjects
        .route("/exams", get(exams::list_exams))
        .route("/exams/{exam}/subjects", get(exams::exam_subjects))
        .route("/subjects", get(exams::list_subjects))
        .route("/subjects/{slug}", get(exams::get_subject))
        // Questions & answers
        .route("/questions", get(questions::list).post(questions::create))
        .route(
            "/questions/{id}",
            get(questions::get).patch(questions::update).delete(questions::remove),
        )
        .route("/questions/{id}/toggle-solved", post(questions::toggle_solved))
        .route("/questions/{id}/answers", get(answers::list).post(answers::create))
        .route("/answers/{id}", patch(answers::update).delete(answers::remove))
        .route("/answers/{id}/accept", post(answers::accept))
        .route("/answers/{id}/upvote", post(answers::upvote))
        // Resources
        .route("/resources", get(resources::list).post(resources::create))
        .route(
            "/resources/{id}",
            get(resources::get).patch(resources::update).delete(resources::remove),
        )
        .route("/resources/{id}/upvote", post(resources::upvote))
        .route("/resources/{id}/save", post(resources::save))
        .route(
            "/resources/{id}/comments",
            get(comments::list_for_resource).post(comments::add_to_resource),
        )
        // Stories
        .route("/stories", get(stories::list).post(stories::create))
        .route(
            "/stories/{id}",
            get(stories::get).patch(stories::update).delete(stories::remove),
        )
        .route("/stories/{id}/like", post(stories::like))
        .route(
            "/stories/{id}/comments",
            get(comments::list_for_story).post(comments::add_to_story),
        )
        .route("/comments/{id}", delete(comments::remove))
        // Activities
        .route("/activities", get(activities::list))
        .route("/activities/read", post(activities::mark_read))
        .merge(upload_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(state: AppState) -> Result<ServerHandle, std::io::Error> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "examhub server started");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        server: server_handle,
    })
}

/// Handle returned by `start()`; keeps the serve task alive.
pub struct ServerHandle {
    pub port: u16,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn shutdown(self) {
        self.server.abort();
    }
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state
        .db
        .with_conn(|conn| Ok(conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?))
        .is_ok();

    let (status, label) = if db_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (status, axum::Json(serde_json::json!({ "status": label })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            data_dir: std::env::temp_dir().join(format!("examhub-{}", uuid::Uuid::now_v7().simple())),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let db = Database::in_memory().unwrap();
        let handle = start(AppState::new(test_config(), db)).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        handle.shutdown();
    }

    #[test]
    fn build_router_creates_routes() {
        let db = Database::in_memory().unwrap();
        let _router = build_router(AppState::new(test_config(), db));
    }

    #[test]
    fn default_paths_live_under_data_dir() {
        let config = ServerConfig::default();
        assert_eq!(config.db_path(), PathBuf::from("data/examhub.db"));
        assert_eq!(config.uploads_dir(), PathBuf::from("data/uploads"));
    }
}
