use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::Level;

use examhub_server::{start, AppState, ServerConfig};
use examhub_store::sessions::SessionRepo;
use examhub_store::subjects::SubjectRepo;
use examhub_store::Database;
use examhub_telemetry::{init_telemetry, LogQuery, SqliteLogSink, TelemetryConfig};

#[derive(Debug, Parser)]
#[command(name = "examhub", version, about = "Exam-isolated Q&A forum server")]
struct Cli {
    /// Root for the database, log database and uploads.
    #[arg(long, env = "EXAMHUB_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    #[arg(long, env = "EXAMHUB_LOG_LEVEL", default_value = "info", global = true)]
    log_level: Level,

    /// JSON lines on stdout.
    #[arg(long, env = "EXAMHUB_LOG_JSON", global = true)]
    log_json: bool,

    #[command(flatten)]
    serve: ServeArgs,

    /// Without a subcommand the HTTP server runs.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print persisted cross-exam access attempts as JSON lines.
    Probes(ProbeArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, env = "EXAMHUB_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "EXAMHUB_PORT", default_value_t = 8080)]
    port: u16,

    #[arg(long, env = "EXAMHUB_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    max_upload_bytes: usize,

    #[arg(long, env = "EXAMHUB_PUBLIC_URL", default_value = "http://localhost:8080")]
    public_url: String,
}

#[derive(Debug, Args)]
struct ProbeArgs {
    #[arg(long)]
    user_id: Option<String>,

    #[arg(long)]
    exam: Option<String>,

    /// RFC 3339 lower bound on the timestamp.
    #[arg(long)]
    since: Option<String>,

    #[arg(long, default_value_t = 100)]
    limit: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.data_dir)?;
    let log_db_path = cli.data_dir.join("logs.db");

    match cli.command {
        Some(Command::Probes(args)) => print_probes(&log_db_path, args),
        None => serve(cli.data_dir, cli.log_level, cli.log_json, log_db_path, cli.serve).await,
    }
}

async fn serve(
    data_dir: PathBuf,
    log_level: Level,
    json: bool,
    log_db_path: PathBuf,
    args: ServeArgs,
) -> Result<(), Box<dyn Error>> {
    let _telemetry = init_telemetry(TelemetryConfig {
        log_level,
        json,
        log_db_path: Some(log_db_path),
        ..Default::default()
    });

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        data_dir,
        max_upload_bytes: args.max_upload_bytes,
        public_url: args.public_url,
    };

    let db = Database::open(&config.db_path())?;
    let seeded = SubjectRepo::new(db.clone()).seed_from_registry()?;
    let purged = SessionRepo::new(db.clone()).purge_expired()?;
    tracing::info!(seeded, purged, "database ready");

    let handle = start(AppState::new(config, db)).await?;
    tracing::info!(port = handle.port, "examhub ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    handle.shutdown();
    Ok(())
}

fn print_probes(log_db_path: &std::path::Path, args: ProbeArgs) -> Result<(), Box<dyn Error>> {
    let sink = SqliteLogSink::new(log_db_path)?;
    let records = sink.query(&LogQuery {
        user_id: args.user_id,
        exam: args.exam.map(|e| e.to_uppercase()),
        security_probes_only: true,
        since: args.since,
        limit: Some(args.limit),
        ..Default::default()
    })?;
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}
