//! labnote: export the recordings table of a lab note into the lab database.
//!
//! The note is a markdown file; its recordings table is validated against the
//! database, any new recording sites are collected interactively, and the
//! experiment and stack rows are upserted.

mod prompt;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labnote_core::document::set_front_matter_value;
use labnote_core::{
    check_document, defaults, export_document, insert_table_template, upgrade_table,
    DatabaseEngine, ExportOutcome, ExportRequest, LabStore, LabnoteConfig, NoticeLevel, Verdict,
};

use crate::prompt::TerminalPrompter;

#[derive(Parser)]
#[command(name = "labnote")]
#[command(author, version, about = "Export lab-note recording tables to the lab database")]
#[command(propagate_version = true)]
struct Cli {
    /// Database engine (postgres or mysql); overrides LABNOTE_DB_ENGINE
    #[arg(long, global = true)]
    engine: Option<DatabaseEngine>,

    /// Database connection URL; overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the note's table and write it to the database
    Export {
        /// Markdown note to export
        file: PathBuf,

        /// Animal id (default: `animal` in the note front matter)
        #[arg(short, long)]
        animal: Option<String>,
    },

    /// Validate the note's table without writing anything
    Check {
        file: PathBuf,

        #[arg(short, long)]
        animal: Option<String>,
    },

    /// Append an empty recordings table to the note
    Template { file: PathBuf },

    /// Rewrite a legacy recordings table with the current columns
    Migrate { file: PathBuf },

    /// List principal investigators
    Pis,

    /// List animals, optionally for one PI
    Animals {
        #[arg(long)]
        pi: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_logging();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the tracing subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors
///   RUST_LOG    - standard env filter (default: "labnote=info")
///
/// Console output goes to stderr so prompts on stdout stay readable.
fn init_logging() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "labnote=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let path = Path::new(path);
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("labnote.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = LabnoteConfig::from_env();
    if let Some(engine) = cli.engine {
        config.database.engine = engine;
    }
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Export { file, animal } => cmd_export(&config, &file, animal.as_deref()).await,
        Commands::Check { file, animal } => cmd_check(&config, &file, animal.as_deref()).await,
        Commands::Template { file } => cmd_template(&file).await,
        Commands::Migrate { file } => cmd_migrate(&file).await,
        Commands::Pis => cmd_pis(&config).await,
        Commands::Animals { pi } => cmd_animals(&config, pi.as_deref()).await,
    }
}

async fn read_note(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

async fn write_note(path: &Path, text: &str) -> anyhow::Result<()> {
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn connect(config: &LabnoteConfig) -> anyhow::Result<std::sync::Arc<dyn LabStore>> {
    labnote_db::connect(&config.database)
        .await
        .with_context(|| format!("failed to connect to {} database", config.database.engine))
}

async fn cmd_export(
    config: &LabnoteConfig,
    file: &Path,
    animal: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let text = read_note(file).await?;
    let store = connect(config).await?;

    let mut prompter = TerminalPrompter::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());
    let outcome = export_document(
        store.as_ref(),
        &mut prompter,
        ExportRequest {
            text: Some(&text),
            animal_id: animal,
            formats: &config.formats,
        },
    )
    .await;

    if let ExportOutcome::Completed { animal_id, .. } = &outcome {
        let stamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let updated = set_front_matter_value(&text, defaults::FRONT_MATTER_ANIMAL, animal_id)
            .and_then(|t| set_front_matter_value(&t, defaults::FRONT_MATTER_LAST_EXPORT, &stamp))?;
        write_note(file, &updated).await?;
        info!(
            subsystem = "cli",
            op = "export",
            file = %file.display(),
            animal_id = %animal_id,
            "Front matter updated"
        );
    }

    match outcome.level() {
        NoticeLevel::Error => {
            eprintln!("{}", outcome.summary());
            Ok(ExitCode::FAILURE)
        }
        NoticeLevel::Info => {
            println!("{}", outcome.summary());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_check(
    config: &LabnoteConfig,
    file: &Path,
    animal: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let text = read_note(file).await?;
    let store = connect(config).await?;

    let (animal_id, verdict) = check_document(
        store.as_ref(),
        ExportRequest {
            text: Some(&text),
            animal_id: animal,
            formats: &config.formats,
        },
    )
    .await?;

    match verdict {
        Verdict::Pass { new_sites, .. } => {
            if new_sites.is_empty() {
                println!("{animal_id}: ready to export");
            } else {
                let ids: Vec<String> = new_sites.iter().map(i64::to_string).collect();
                println!(
                    "{animal_id}: ready to export, new sites to create: {}",
                    ids.join(", ")
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Verdict::Fail(violations) => {
            eprintln!("{animal_id}: validation failed\n{violations}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_template(file: &Path) -> anyhow::Result<ExitCode> {
    let text = read_note(file).await?;
    let updated = insert_table_template(&text)?;
    write_note(file, &updated).await?;
    println!("Added recordings table to {}", file.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_migrate(file: &Path) -> anyhow::Result<ExitCode> {
    let text = read_note(file).await?;
    match upgrade_table(&text)? {
        Some(updated) => {
            write_note(file, &updated).await?;
            println!("Upgraded recordings table in {}", file.display());
        }
        None => println!("No legacy recordings table in {}", file.display()),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_pis(config: &LabnoteConfig) -> anyhow::Result<ExitCode> {
    let store = connect(config).await?;
    for pi in store.list_pis().await? {
        println!("{pi}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_animals(config: &LabnoteConfig, pi: Option<&str>) -> anyhow::Result<ExitCode> {
    let store = connect(config).await?;
    for animal in store.list_animals(pi).await? {
        match animal.pi {
            Some(pi) => println!("{}\t{}", animal.id, pi),
            None => println!("{}", animal.id),
        }
    }
    Ok(ExitCode::SUCCESS)
}
