//! vocabmatch - vocabulary mastery and reading-text matching
//!
//! Command-line entry point for the batch pipeline and the read-only reports
//! over its stored results.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::{self, EnvFilter};
use vocabmatch_core::{
    class_report, dismiss_word, student_report, LlmConfig, LlmService, LlmUsageJudge, Pipeline,
    PipelineConfig, ResultStore, SqliteStore, StudentId,
};

#[derive(Parser)]
#[command(name = "vocabmatch")]
#[command(about = "Vocabulary mastery analysis and reading-text matching", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set log level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Database path (overrides VOCABMATCH_DB_PATH env var and config)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or migrate the database schema
    Init,

    /// Run the full pipeline
    Run {
        /// Directory of grade word lists
        #[arg(long)]
        vocab_dir: Option<PathBuf>,

        /// Roster JSON file
        #[arg(long)]
        roster: Option<PathBuf>,

        /// Classroom transcript
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Directory of student essays
        #[arg(long)]
        essays_dir: Option<PathBuf>,

        /// Corpus directory (metadata.json + counts/)
        #[arg(long)]
        corpus_dir: Option<PathBuf>,
    },

    /// Index the corpus only
    IndexCorpus {
        #[arg(long)]
        corpus_dir: Option<PathBuf>,
    },

    /// Rescore stored profiles without calling the judge
    Recommend,

    /// Hide a misused word for a student
    Dismiss {
        #[arg(short, long)]
        student: i64,

        /// Catalog word or word id
        #[arg(short, long)]
        word: String,

        /// addressed | ai_error
        #[arg(short, long)]
        reason: String,
    },

    /// Render stored results as JSON
    #[command(subcommand)]
    Report(ReportCommands),

    /// Show row counts and the latest run summary
    Status,
}

#[derive(Subcommand)]
enum ReportCommands {
    /// One student's profile and recommendations
    Student { id: i64 },

    /// Class statistics and class-wide recommendations
    Class,
}

fn init_tracing(log_level: &str) {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Keep HTTP client internals quiet unless asked for
    let filter = EnvFilter::new(format!(
        "vocabmatch={},vocabmatch_core={},reqwest=warn,hyper=warn",
        level.as_str().to_lowercase(),
        level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(path) = &cli.db_path {
        config.database.path = path.clone();
    }
    Ok(config)
}

fn open_store(config: &PipelineConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::new(&config.database.path, config.database.pool_size)
        .with_context(|| format!("opening {}", config.database.path.display()))?;
    Ok(Arc::new(store))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    debug!("vocabmatch v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&cli)?;
    let store = open_store(&config)?;

    match cli.command {
        Commands::Init => {
            store.init_schema().await?;
            println!("Initialized {}", config.database.path.display());
        }
        Commands::Run {
            vocab_dir,
            roster,
            transcript,
            essays_dir,
            corpus_dir,
        } => {
            let inputs = &mut config.inputs;
            if let Some(p) = vocab_dir {
                inputs.vocab_dir = p;
            }
            if let Some(p) = roster {
                inputs.roster = p;
            }
            if transcript.is_some() {
                inputs.transcript = transcript;
            }
            if essays_dir.is_some() {
                inputs.essays_dir = essays_dir;
            }
            if let Some(p) = corpus_dir {
                inputs.corpus_dir = p;
            }

            let llm = LlmService::new(LlmConfig::from_judge_config(&config.judge)?)?;
            let judge = Arc::new(LlmUsageJudge::new(llm));
            let summary = Pipeline::new(config, store).run(judge).await?;
            print_json(&summary)?;
        }
        Commands::IndexCorpus { corpus_dir } => {
            if let Some(p) = corpus_dir {
                config.inputs.corpus_dir = p;
            }
            let summary = Pipeline::new(config, store).index_corpus().await?;
            print_json(&summary)?;
        }
        Commands::Recommend => {
            let summary = Pipeline::new(config, store).recommend().await?;
            print_json(&summary)?;
        }
        Commands::Dismiss {
            student,
            word,
            reason,
        } => {
            dismiss_word(store.as_ref(), StudentId(student), &word, &reason).await?;
            println!("Dismissed '{}' for student {} ({})", word, student, reason);
        }
        Commands::Report(ReportCommands::Student { id }) => {
            let report = student_report(store.as_ref(), StudentId(id)).await?;
            print_json(&report)?;
        }
        Commands::Report(ReportCommands::Class) => {
            let report = class_report(store.as_ref()).await?;
            print_json(&report)?;
        }
        Commands::Status => {
            store.init_schema().await?;
            let counts = store.table_counts().await?;
            for (table, count) in &counts {
                println!("{:<20} {}", table, count);
            }
            match store.latest_run_summary().await? {
                Some(summary) => print_json(&summary)?,
                None => println!("No runs recorded"),
            }
        }
    }

    Ok(())
}
