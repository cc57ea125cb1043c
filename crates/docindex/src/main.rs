//! # docindex CLI
//!
//! Classifies documents into template-driven index trees.
//!
//! Indexes are defined in `config.toml`; documents are read from a JSON
//! array of `{ "id", "document_type", "attributes" }` objects.
//!
//! ## Commands
//!
//! - `docindex build <DOCUMENTS>` - Classify documents and print every tree
//! - `docindex locate <DOCUMENTS> <ID>` - Show where one document lands
//! - `docindex check` - Validate every configured expression
//! - `docindex config show|init|path` - Inspect configuration
//!
//! ## Examples
//!
//! ```bash
//! # Print a sample configuration
//! docindex config init > ~/.config/docindex/config.toml
//!
//! # Classify a corpus
//! docindex build documents.json
//!
//! # Get JSON output
//! docindex locate documents.json 42 --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docindex::{check_expressions, load_documents, render_tree, Config, Workspace};
use docindex_core::DocumentId;
use docindex_engine::{DocumentPlacement, NodeView};
use docindex_expr::FieldPathEvaluator;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "docindex")]
#[command(about = "Classify documents into template-driven index trees")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/docindex/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify documents and print every index tree
    Build {
        /// JSON file holding an array of documents
        documents: PathBuf,
    },

    /// Show where a document is placed
    Locate {
        /// JSON file holding an array of documents
        documents: PathBuf,

        /// Document id
        id: u64,
    },

    /// Validate configured expressions
    Check,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for one index tree.
#[derive(Serialize)]
struct TreeOutput {
    slug: String,
    label: String,
    enabled: bool,
    tree: NodeView,
}

/// Output structure for `locate`.
#[derive(Serialize)]
struct LocateOutput {
    document: DocumentId,
    placements: Vec<DocumentPlacement>,
}

/// Output structure for `check`.
#[derive(Serialize)]
struct CheckItem {
    index: String,
    expression: String,
    error: String,
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(Some(path.clone()))
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().context("Failed to load config"),
    }
}

fn setup_logging(cli: &Cli, config: &Config) -> Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false);

    match &config.logging.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let subscriber = builder.with_ansi(false).with_writer(Mutex::new(file)).finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set tracing subscriber")?;
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set tracing subscriber")?;
        }
    }
    Ok(())
}

async fn classify(config: &Config, documents: &Path) -> Result<Workspace> {
    let docs = load_documents(documents)?;
    let workspace = Workspace::from_config(config).await?;
    workspace.classify(docs).await?;
    Ok(workspace)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    setup_logging(&cli, &config)?;

    match &cli.command {
        Commands::Build { documents } => {
            info!("Building {} indexes from {:?}", config.indexes.len(), documents);
            let workspace = classify(&config, documents).await?;

            let mut trees = Vec::new();
            for index in workspace.engine.list_indexes().await? {
                let tree = workspace.engine.tree(index.id).await?;
                trees.push(TreeOutput {
                    slug: index.slug,
                    label: index.label,
                    enabled: index.enabled,
                    tree,
                });
            }

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&trees)?);
                }
                OutputFormat::Text => {
                    if trees.is_empty() {
                        println!("No indexes configured. Try 'docindex config init'.");
                    }
                    for tree in &trees {
                        let title = if tree.enabled {
                            format!("{} [{}]", tree.label, tree.slug)
                        } else {
                            format!("{} [{}] (disabled)", tree.label, tree.slug)
                        };
                        println!("{}", render_tree(&title, &tree.tree));
                    }
                }
            }
        }

        Commands::Locate { documents, id } => {
            let workspace = classify(&config, documents).await?;
            let document = DocumentId(*id);
            let placements = workspace.engine.document_placements(document).await?;

            match cli.format {
                OutputFormat::Json => {
                    let output = LocateOutput {
                        document,
                        placements,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    if placements.is_empty() {
                        println!("Document {document} is not placed in any index.");
                    }
                    for placement in &placements {
                        println!("{}: {}", placement.slug, placement.path.join(" / "));
                    }
                }
            }
        }

        Commands::Check => {
            let problems = check_expressions(&config.indexes, &FieldPathEvaluator::new());
            let items: Vec<CheckItem> = problems
                .into_iter()
                .map(|(index, expression, error)| CheckItem {
                    index,
                    expression,
                    error: error.to_string(),
                })
                .collect();

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&items)?);
                }
                OutputFormat::Text => {
                    if items.is_empty() {
                        println!("All expressions are valid.");
                    }
                    for item in &items {
                        println!("{}: `{}`: {}", item.index, item.expression, item.error);
                    }
                }
            }
            if !items.is_empty() {
                anyhow::bail!("{} invalid expressions", items.len());
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}
