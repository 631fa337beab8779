//! Warn-and-above events persisted to a separate SQLite database.
//!
//! `user_id` and `exam` get their own columns so a cross-exam probe can be
//! traced back to the caller, either from the event itself or from the
//! nearest enclosing span that carries them.

use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{span, Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const DEFAULT_LIMIT: u32 = 100;

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    CREATE TABLE IF NOT EXISTS logs (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp      TEXT NOT NULL,
        level          TEXT NOT NULL,
        target         TEXT NOT NULL,
        message        TEXT NOT NULL,
        fields         TEXT,
        span           TEXT,
        user_id        TEXT,
        exam           TEXT,
        security_probe INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_logs_probe ON logs(security_probe, id);
    CREATE INDEX IF NOT EXISTS idx_logs_user ON logs(user_id);
    CREATE INDEX IF NOT EXISTS idx_logs_exam ON logs(exam);
";

/// A persisted log event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    /// Remaining structured fields as a JSON object.
    pub fields: Option<String>,
    /// Name of the innermost span the event was emitted in.
    pub span: Option<String>,
    pub user_id: Option<String>,
    pub exam: Option<String>,
    pub security_probe: bool,
}

#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    /// Module prefix, e.g. `examhub_store`.
    pub target: Option<String>,
    pub user_id: Option<String>,
    pub exam: Option<String>,
    /// Only events logged with `security_probe = true`.
    pub security_probes_only: bool,
    /// RFC 3339 lower bound.
    pub since: Option<String>,
    pub limit: Option<u32>,
}

impl LogQuery {
    fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        let mut push = |clause: &str, value: SqlValue| {
            params.push(value);
            clauses.push(format!("{clause} ?{}", params.len()));
        };

        if let Some(level) = &self.level {
            push("level =", SqlValue::Text(level.to_uppercase()));
        }
        if let Some(target) = &self.target {
            push("target LIKE", SqlValue::Text(format!("{target}%")));
        }
        if let Some(user_id) = &self.user_id {
            push("user_id =", SqlValue::Text(user_id.clone()));
        }
        if let Some(exam) = &self.exam {
            push("exam =", SqlValue::Text(exam.clone()));
        }
        if let Some(since) = &self.since {
            push("timestamp >=", SqlValue::Text(since.clone()));
        }
        if self.security_probes_only {
            clauses.push("security_probe = 1".to_string());
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        params.push(SqlValue::Integer(i64::from(self.limit.unwrap_or(DEFAULT_LIMIT))));
        let sql = format!(
            "SELECT id, timestamp, level, target, message, fields, span, user_id, exam, security_probe
             FROM logs{filter} ORDER BY id DESC LIMIT ?{}",
            params.len()
        );
        (sql, params)
    }
}

/// Owns the log database connection.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn write(&self, entry: &Entry) -> Result<(), rusqlite::Error> {
        let fields = (!entry.fields.is_empty()).then(|| Value::Object(entry.fields.clone()).to_string());
        self.conn.lock().execute(
            "INSERT INTO logs (timestamp, level, target, message, fields, span, user_id, exam, security_probe)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                entry.timestamp,
                entry.level,
                entry.target,
                entry.message,
                fields,
                entry.span,
                entry.user_id,
                entry.exam,
                entry.security_probe,
            ],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let (sql, params) = q.to_sql();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                fields: row.get(5)?,
                span: row.get(6)?,
                user_id: row.get(7)?,
                exam: row.get(8)?,
                security_probe: row.get(9)?,
            })
        })?;
        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        self.conn.lock().query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
    }
}

/// One event on its way to the sink.
struct Entry {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Map<String, Value>,
    span: Option<String>,
    user_id: Option<String>,
    exam: Option<String>,
    security_probe: bool,
}

/// Splits recorded fields into the indexed columns and the JSON rest.
#[derive(Default)]
struct Fields {
    message: Option<String>,
    user_id: Option<String>,
    exam: Option<String>,
    security_probe: bool,
    rest: Map<String, Value>,
}

impl Fields {
    fn put(&mut self, name: &str, value: Value) {
        match (name, value) {
            ("security_probe", Value::Bool(b)) => self.security_probe = b,
            ("message", Value::String(s)) => self.message = Some(s),
            ("user_id", Value::String(s)) => self.user_id = Some(s),
            ("exam", Value::String(s)) => self.exam = Some(s),
            (name, value) => {
                self.rest.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        let text = match field.name() {
            "message" => text,
            _ => text.trim_matches('"').to_string(),
        };
        self.put(field.name(), Value::String(text));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field.name(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field.name(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field.name(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field.name(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field.name(), Value::Bool(value));
    }
}

/// Span extension carrying the caller identity down to child events.
struct CallerFields {
    user_id: Option<String>,
    exam: Option<String>,
}

/// `tracing` layer that hands warn+ events to a [`SqliteLogSink`].
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        attrs.record(&mut fields);
        if fields.user_id.is_none() && fields.exam.is_none() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(CallerFields {
                user_id: fields.user_id,
                exam: fields.exam,
            });
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::WARN {
            return;
        }

        let mut fields = Fields::default();
        event.record(&mut fields);

        let mut span = None;
        if let Some(scope) = ctx.event_scope(event) {
            for (depth, s) in scope.enumerate() {
                if depth == 0 {
                    span = Some(s.name().to_string());
                }
                if fields.user_id.is_some() && fields.exam.is_some() {
                    break;
                }
                if let Some(caller) = s.extensions().get::<CallerFields>() {
                    if fields.user_id.is_none() {
                        fields.user_id.clone_from(&caller.user_id);
                    }
                    if fields.exam.is_none() {
                        fields.exam.clone_from(&caller.exam);
                    }
                }
            }
        }

        let entry = Entry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            message: fields.message.unwrap_or_default(),
            fields: fields.rest,
            span,
            user_id: fields.user_id,
            exam: fields.exam,
            security_probe: fields.security_probe,
        };
        if let Err(e) = self.sink.write(&entry) {
            // Logging through tracing here would recurse into this layer.
            eprintln!("examhub-telemetry: dropped log event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(sink: Arc<SqliteLogSink>, f: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(SqliteLogLayer::new(sink));
        tracing::subscriber::with_default(subscriber, f);
    }

    fn sink() -> Arc<SqliteLogSink> {
        Arc::new(SqliteLogSink::in_memory().unwrap())
    }

    #[test]
    fn persists_to_disk() {
        let dir = std::env::temp_dir().join(format!("examhub-logs-{}", uuid::Uuid::now_v7().simple()));
        let path = dir.join("logs.db");
        capture(Arc::new(SqliteLogSink::new(&path).unwrap()), || {
            tracing::warn!("slow query");
        });
        assert_eq!(SqliteLogSink::new(&path).unwrap().count().unwrap(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn info_is_not_persisted() {
        let sink = sink();
        capture(sink.clone(), || {
            tracing::info!("routine");
            tracing::debug!("noise");
            tracing::warn!(user_id = "usr_1", exam = "NEET", "something odd");
        });

        let records = sink.query(&LogQuery::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, "WARN");
        assert_eq!(records[0].user_id.as_deref(), Some("usr_1"));
        assert_eq!(records[0].exam.as_deref(), Some("NEET"));
        assert!(!records[0].security_probe);
    }

    #[test]
    fn filters_by_level_user_and_target() {
        let sink = sink();
        capture(sink.clone(), || {
            tracing::warn!(target: "examhub_store::questions", user_id = "usr_a", "a");
            tracing::error!(target: "examhub_server::error", user_id = "usr_b", "b");
        });

        let errors = sink
            .query(&LogQuery {
                level: Some("error".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "b");

        let by_user = sink
            .query(&LogQuery {
                user_id: Some("usr_a".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_user[0].message, "a");

        let store_only = sink
            .query(&LogQuery {
                target: Some("examhub_store".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store_only.len(), 1);
    }

    #[test]
    fn newest_first_with_limit() {
        let sink = sink();
        capture(sink.clone(), || {
            for i in 0..10 {
                tracing::warn!("msg {i}");
            }
        });
        let results = sink
            .query(&LogQuery {
                limit: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].message, "msg 9");
    }

    #[test]
    fn security_probes_are_queryable() {
        let sink = sink();
        capture(sink.clone(), || {
            tracing::warn!(
                user_id = "usr_2",
                exam = "NEET",
                target_exam = "JEE",
                security_probe = true,
                "cross-exam access rejected"
            );
            tracing::warn!("unrelated warning");
        });

        let probes = sink
            .query(&LogQuery {
                security_probes_only: true,
                exam: Some("NEET".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].user_id.as_deref(), Some("usr_2"));
        let fields: Value = serde_json::from_str(probes[0].fields.as_deref().unwrap()).unwrap();
        assert_eq!(fields["target_exam"], "JEE");
    }

    #[test]
    fn caller_comes_from_enclosing_span() {
        let sink = sink();
        capture(sink.clone(), || {
            let outer = tracing::info_span!("request", user_id = "usr_3", exam = "GATE");
            let _outer = outer.enter();
            let inner = tracing::info_span!("create_question");
            let _inner = inner.enter();
            tracing::error!("handler failed");
        });

        let records = sink.query(&LogQuery::default()).unwrap();
        assert_eq!(records[0].user_id.as_deref(), Some("usr_3"));
        assert_eq!(records[0].exam.as_deref(), Some("GATE"));
        assert_eq!(records[0].span.as_deref(), Some("create_question"));
    }
}
