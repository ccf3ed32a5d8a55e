//! JobClaw daemon — starts the outreach scheduler and runs until ctrl-c.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jobclaw_composer::LlmComposer;
use jobclaw_core::JobClawConfig;
use jobclaw_engine::{EngineContext, OutreachScheduler, WebhookStatusSync};
use jobclaw_mailer::SmtpMailer;
use jobclaw_store::OutreachDb;

#[derive(Parser)]
#[command(name = "jobclaw", about = "Automated job-outreach engine", version)]
struct Cli {
    /// Path to a config file (default: ~/.jobclaw/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the outreach engine (default).
    Run,
    /// Show users with automation running and their recent activity.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => JobClawConfig::load_from(path)?,
        None => JobClawConfig::load()?,
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Status => status(config),
    }
}

async fn run(config: JobClawConfig) -> anyhow::Result<()> {
    let db = open_db(&config)?;

    let ctx = Arc::new(EngineContext {
        db,
        mailer: Arc::new(SmtpMailer::new()),
        composer: Arc::new(LlmComposer::new(&config.composer)),
        sync: Arc::new(WebhookStatusSync::new(&config.sync)),
        http: reqwest::Client::new(),
        inter_send_delay: Duration::from_secs(config.scheduler.inter_send_delay_secs),
    });

    let mut scheduler = OutreachScheduler::new(ctx, config.scheduler.clone());
    scheduler.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    scheduler.stop().await;
    Ok(())
}

fn status(config: JobClawConfig) -> anyhow::Result<()> {
    let db = open_db(&config)?;
    let users = db.list_running_users()?;
    if users.is_empty() {
        println!("No users with automation running.");
        return Ok(());
    }
    for user in users {
        println!("{} <{}> ({})", user.name, user.email, user.plan.as_str());
        for line in db.recent_activity(&user.id, 5)? {
            println!("  - {line}");
        }
    }
    Ok(())
}

fn open_db(config: &JobClawConfig) -> anyhow::Result<Arc<OutreachDb>> {
    let path = config.resolved_database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(OutreachDb::open(&path)?))
}
