//! chapter-tool: inspect and edit Folio chapter hierarchies from the shell
//!
//! Works directly against a local libsql database.
//!
//! ```text
//! chapter-tool --db ./data/folio.db new-book --title "Field Guide"
//! chapter-tool add --book <id> --title "Introduction"
//! chapter-tool move --book <id> --chapter <id> --parent <id> --index 0
//! chapter-tool tree --book <id>
//! ```
//!
//! Logging goes to stderr; set `RUST_LOG=debug` for engine decisions.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use folio_core::db::{ChapterStore, LibsqlChapterStore};
use folio_core::export::{ExportFormat, PandocBackend};
use folio_core::hierarchy::{check_invariants, OrphanPolicy};
use folio_core::models::{ChapterTreeNode, CreateChapterParams, CurrentUser};
use folio_core::services::{ChapterService, MoveQueue, MoveRequest};
use folio_core::FolioConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "chapter-tool", version, about = "Folio chapter hierarchy tool")]
struct Cli {
    /// JSON config file, applied before FOLIO_* variables
    #[arg(long, global = true, env = "FOLIO_CONFIG")]
    config: Option<PathBuf>,

    /// Database file (overrides FOLIO_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Acting user id
    #[arg(long, global = true, env = "FOLIO_USER", default_value = "local")]
    user: String,

    /// Number of allowed chapter levels (overrides FOLIO_MAX_DEPTH)
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    /// promote | cascade (overrides FOLIO_ORPHAN_POLICY)
    #[arg(long, global = true)]
    orphan_policy: Option<OrphanPolicy>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a book
    NewBook {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: Option<String>,
    },
    /// List the user's books
    Books,
    /// Append a chapter
    Add(AddArgs),
    /// Print a book's chapter outline
    Tree {
        #[arg(long)]
        book: String,
    },
    /// Move or reparent a chapter
    Move(MoveArgs),
    /// Delete a chapter using the orphan policy
    Delete {
        #[arg(long)]
        book: String,
        #[arg(long)]
        chapter: String,
    },
    /// Verify every hierarchy invariant on the stored chapters
    Check {
        #[arg(long)]
        book: String,
    },
    /// Export a book through pandoc
    Export(ExportArgs),
}

#[derive(Debug, Args)]
struct AddArgs {
    #[arg(long)]
    book: String,
    #[arg(long)]
    title: String,
    /// Parent chapter (root when omitted)
    #[arg(long)]
    parent: Option<String>,
    #[arg(long, default_value = "")]
    content: String,
    /// Explicit chapter id (UUID when omitted)
    #[arg(long)]
    id: Option<String>,
}

#[derive(Debug, Args)]
struct MoveArgs {
    #[arg(long)]
    book: String,
    #[arg(long)]
    chapter: String,
    /// New parent (root when omitted)
    #[arg(long)]
    parent: Option<String>,
    /// Position among the new siblings; clamped to the valid range
    #[arg(long, default_value_t = i64::MAX, allow_hyphen_values = true)]
    index: i64,
    /// Validate only
    #[arg(long)]
    dry_run: bool,
    /// Retries on revision conflict
    #[arg(long, default_value_t = folio_core::services::DEFAULT_MAX_RETRIES)]
    retries: usize,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long)]
    book: String,
    /// epub | pdf | html
    #[arg(long, default_value = "epub")]
    format: ExportFormat,
    /// Output directory
    #[arg(long)]
    out: PathBuf,
    /// Converter executable (overrides FOLIO_PANDOC)
    #[arg(long)]
    pandoc: Option<String>,
    #[arg(long)]
    pdf_engine: Option<String>,
}

fn init_logging() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<FolioConfig> {
    let mut config = FolioConfig::load(cli.config.as_deref()).context("load configuration")?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(depth) = cli.max_depth {
        anyhow::ensure!(depth > 0, "--max-depth must be at least 1");
        config.max_depth = depth;
    }
    if let Some(policy) = cli.orphan_policy {
        config.orphan_policy = policy;
    }
    Ok(config)
}

fn print_outline(nodes: &[ChapterTreeNode], depth: usize) {
    for node in nodes {
        println!(
            "{}{}. {}  [{}]",
            "  ".repeat(depth),
            node.chapter.order + 1,
            node.chapter.title,
            node.chapter.id
        );
        print_outline(&node.children, depth + 1);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> Result<()> {
    init_logging().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!("Parsed command line: {:?}", cli);

    let config = resolve_config(&cli)?;
    let store = Arc::new(
        LibsqlChapterStore::open(config.db_path.clone())
            .await
            .with_context(|| format!("open database {}", config.db_path.display()))?,
    );
    let service = Arc::new(ChapterService::from_config(store.clone(), &config));
    let user = CurrentUser::new(cli.user.clone());

    match cli.command {
        Command::NewBook { title, author } => {
            let book = service.create_book(&user, &title, author).await?;
            if cli.json {
                print_json(&book)?;
            } else {
                println!("{}", book.id);
            }
        }

        Command::Books => {
            let books = service.list_books(&user).await?;
            if cli.json {
                print_json(&books)?;
            } else {
                for book in books {
                    println!("{}  {}  (revision {})", book.id, book.title, book.revision);
                }
            }
        }

        Command::Add(args) => {
            let chapter = service
                .create_chapter(
                    &user,
                    &args.book,
                    CreateChapterParams {
                        id: args.id,
                        title: args.title,
                        content: args.content,
                        parent_id: args.parent,
                    },
                )
                .await?;
            if cli.json {
                print_json(&chapter)?;
            } else {
                println!("{}", chapter.id);
            }
        }

        Command::Tree { book } => {
            let tree = service.get_tree(&user, &book).await?;
            if cli.json {
                print_json(&tree)?;
            } else {
                print_outline(&tree, 0);
            }
        }

        Command::Move(args) => {
            let request = MoveRequest::new(args.chapter, args.parent, args.index);
            if args.dry_run {
                let report = service.preview_move(&user, &args.book, &request).await?;
                print_json(&report)?;
                anyhow::ensure!(report.valid, "move would be rejected");
            } else {
                let queue = MoveQueue::new(service.clone()).with_max_retries(args.retries);
                let chapters = queue.move_with_retry(&user, &args.book, &request).await?;
                if cli.json {
                    print_json(&chapters)?;
                } else {
                    print_outline(&service.get_tree(&user, &args.book).await?, 0);
                }
            }
        }

        Command::Delete { book, chapter } => {
            let removed = service.delete_chapter(&user, &book, &chapter).await?;
            if cli.json {
                print_json(&removed)?;
            } else {
                println!(
                    "Deleted {} chapter(s) ({:?})",
                    removed.len(),
                    service.orphan_policy()
                );
            }
        }

        Command::Check { book } => {
            // Ownership first, then the raw stored rows
            service.get_book(&user, &book).await?;
            let snapshot = store.load_all(&book).await?;
            match check_invariants(&snapshot.chapters, service.hierarchy()) {
                Ok(()) => println!(
                    "OK: {} chapter(s) at revision {}",
                    snapshot.chapters.len(),
                    snapshot.revision()
                ),
                Err(e) => anyhow::bail!("hierarchy invalid ({}): {}", e.kind(), e),
            }
        }

        Command::Export(args) => {
            let mut backend = PandocBackend::new(args.pandoc.unwrap_or(config.pandoc_path));
            if let Some(engine) = args.pdf_engine {
                backend = backend.with_pdf_engine(engine);
            }
            let output = service
                .export_book(&user, &args.book, args.format, &args.out, &backend)
                .await?;
            println!("{}", output.display());
        }
    }

    Ok(())
}
