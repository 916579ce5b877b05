//! CLI parsing and orchestration. Loads config, runs pull (Moodle -> local files) or push. Maps errors to exit codes.

use crate::config::{BookConfig, Config, ConfigError, MoodleConfig};
use crate::moodle::{HttpTransport, MoodleClient, MoodleError, Transport, DEFAULT_TIMEOUT_SECS};
use crate::store::{self, LocalChapterError, WriteError};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{kind}: {0}", kind = .0.kind())]
    Moodle(#[from] MoodleError),

    #[error("write error: {0}")]
    Write(#[from] WriteError),

    #[error("local chapter error: {0}")]
    LocalChapter(#[from] LocalChapterError),

    #[error("{0}")]
    InvalidInput(String),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::Config(_) | CliRunError::InvalidInput(_) => 1,
            CliRunError::Moodle(_) => 2,
            CliRunError::Write(_) | CliRunError::LocalChapter(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "moodle-book-sync")]
#[command(about = "Sync Moodle books with local HTML files")]
#[command(
    after_help = "Without --config, ./config.yaml is used, then <config dir>/moodle-book-sync/config.yaml. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the YAML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print verbose error chain.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download every chapter of a book into its configured directory.
    Pull {
        /// Name of the book in the config file.
        #[arg(long)]
        book: String,
    },
    /// Upload local chapter edits to Moodle (not implemented yet).
    ///
    /// Needs a previous pull: reads book.json and the chapter files from the book
    /// directory first, so a missing pull or chapter is reported before the
    /// not-implemented error. Never contacts Moodle.
    Push {
        /// Name of the book in the config file.
        #[arg(long)]
        book: String,
        /// Chapter file to push, without the .html extension. Default: all chapters.
        #[arg(long)]
        chapter: Option<String>,
    },
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = Config::load(args.config.as_deref())?;

    match &args.command {
        Command::Pull { book } => {
            let book = config.book(book)?;
            let transport = build_transport(&config, args.timeout)?;
            let mut client = MoodleClient::new(&config.moodle, transport);
            let written = pull_book(&mut client, book)?;
            log::info!(
                "Pulled {} chapter(s) of '{}' into {}",
                written.len(),
                book.name,
                book.directory.display()
            );
            Ok(())
        }
        Command::Push { book, chapter } => {
            let book = config.book(book)?;
            let transport = build_transport(&config, args.timeout)?;
            let mut client = MoodleClient::new(&config.moodle, transport);
            push_book(&mut client, book, chapter.as_deref())
        }
    }
}

/// `--timeout` wins over `Moodle.timeout_secs`, which wins over the default.
fn effective_timeout_secs(flag: Option<u64>, moodle: &MoodleConfig) -> u64 {
    flag.or(moodle.timeout_secs).unwrap_or(DEFAULT_TIMEOUT_SECS)
}

fn build_transport(config: &Config, timeout: Option<u64>) -> Result<HttpTransport, CliRunError> {
    let timeout_secs = effective_timeout_secs(timeout, &config.moodle);
    let mut builder = HttpTransport::builder().timeout_secs(timeout_secs);
    if let Some(ua) = &config.moodle.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

/// Resolve the book, fetch its chapters, and write them. Returns the written HTML paths.
pub fn pull_book<T: Transport>(
    client: &mut MoodleClient<T>,
    book: &BookConfig,
) -> Result<Vec<PathBuf>, CliRunError> {
    let book_id = client.resolve_book(&book.course_url, &book.book_url)?;
    let chapters = client.list_chapters(&book_id)?;
    if chapters.is_empty() {
        log::warn!("Book '{}' has no chapters", book.name);
    }
    Ok(store::write_chapters(&book.directory, &book_id, &chapters)?)
}

/// Push one chapter (or all) from the book's directory, using the book identity saved by pull.
/// Local problems (no pull yet, unknown chapter) are reported first; otherwise fails on the
/// first chapter with `MoodleError::NotImplemented`.
pub fn push_book<T: Transport>(
    client: &mut MoodleClient<T>,
    book: &BookConfig,
    chapter: Option<&str>,
) -> Result<(), CliRunError> {
    let book_id = store::read_book_id(&book.directory)?;
    let stems = store::list_chapter_stems(&book.directory)?;
    let stems = match chapter {
        Some(name) => {
            let name = name.strip_suffix(".html").unwrap_or(name);
            if !stems.iter().any(|s| s == name) {
                return Err(CliRunError::InvalidInput(format!(
                    "Chapter file not found: {}",
                    book.directory.join(format!("{}.html", name)).display()
                )));
            }
            vec![name.to_string()]
        }
        None => stems,
    };
    if stems.is_empty() {
        return Err(CliRunError::InvalidInput(format!(
            "No chapter files in {}; run pull first.",
            book.directory.display()
        )));
    }

    for stem in &stems {
        let chapter = store::read_chapter(&book.directory, stem)?;
        client.push_chapter(&book_id, &chapter)?;
        log::info!("Pushed chapter {}", stem);
    }
    Ok(())
}
