mod explore;

use anyhow::{bail, Context, Result};
use catgraph_common::{logger, AppConfig, EmbeddingBackend, ModelManager, SentenceModel};
use catgraph_embed::{loader_from_config, EmbeddingProvider};
use catgraph_ingest::{CkanClient, DemoCatalog, Ingestor, JsonFileStore};
use catgraph_vector::SimilarityEngine;
use clap::{Parser, Subcommand};
use explore::{ExportFormat, GraphOptions};
use std::path::PathBuf;
use std::sync::Arc;

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "catgraph")]
#[command(about = "catgraph - open-data catalog ingestion and similarity graphs", long_about = None)]
struct Cli {
    /// Configuration file (TOML); defaults to ./catgraph.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the catalog, embed each record and store it
    Ingest {
        /// Maximum records to process; zero or negative processes everything
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,

        /// Fall back to a synthetic catalog if the source API is unreachable
        #[arg(long)]
        demo: bool,
    },

    /// Build the similarity graph around one record
    Graph {
        /// Record id or catalog key of the query record
        #[arg(long)]
        query: String,

        /// Minimum edge weight (defaults to configuration)
        #[arg(long)]
        threshold: Option<f32>,

        /// Maximum records compared (defaults to configuration)
        #[arg(long)]
        max_nodes: Option<usize>,

        #[arg(long, value_enum, default_value = "cytoscape")]
        format: ExportFormat,

        /// SIF interaction label
        #[arg(long, default_value = "similarity")]
        label: String,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Manage local embedding models
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download a sentence-transformer model (defaults to the configured one)
    Fetch { repo: Option<String> },
    /// List downloaded models
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_dotenv_from_project_root();

    let config = AppConfig::load(cli.config.as_deref())?;
    if matches!(cli.command, Commands::Model { .. }) {
        logger::setup_console_logging(&config.log_level)?;
    } else {
        config.ensure_directories()?;
        logger::setup_logging(&config.log_dir, &config.log_level)?;
    }

    match cli.command {
        Commands::Ingest { limit, demo } => run_ingest(&config, limit, demo).await,
        Commands::Graph {
            query,
            threshold,
            max_nodes,
            format,
            label,
            output,
        } => {
            let mut options = GraphOptions::from_config(&config);
            if let Some(threshold) = threshold {
                options.threshold = threshold;
            }
            if let Some(max_nodes) = max_nodes {
                options.max_nodes = max_nodes;
            }
            run_graph(&config, &query, &options, format, &label, output).await
        }
        Commands::Model { action } => run_model(&config, action).await,
    }
}

async fn run_ingest(config: &AppConfig, limit: Option<i64>, demo: bool) -> Result<()> {
    tracing::info!("catgraph ingest starting...");
    tracing::info!("  Catalog: {}", config.catalog_list_url);
    tracing::info!("  Store: {}", config.store_path.display());
    tracing::info!("  Embedding backend: {:?}", config.embedding_backend);

    let store = Arc::new(JsonFileStore::open(&config.store_path)?);
    let provider = Arc::new(EmbeddingProvider::from_boxed(loader_from_config(config)?));
    let source = Arc::new(CkanClient::from_config(config)?);

    let mut ingestor = Ingestor::new(source, store, provider)
        .with_default_limit(config.effective_ingest_limit());
    if demo || config.demo_mode {
        ingestor = ingestor.with_fallback(Arc::new(DemoCatalog::new()));
    }

    let report = ingestor.run_batch(limit).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success {
        bail!("{}", report.message);
    }
    Ok(())
}

async fn run_graph(
    config: &AppConfig,
    query: &str,
    options: &GraphOptions,
    format: ExportFormat,
    label: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let store = JsonFileStore::open(&config.store_path)?;
    let engine = SimilarityEngine::from_config(config)?;
    tracing::info!("Similarity backend: {}", engine.primary_name());

    let graph = explore::similarity_graph(&store, &engine, query, options).await?;
    let rendered = explore::render(&graph, format, label)?;

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Graph written to {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

async fn run_model(config: &AppConfig, action: ModelAction) -> Result<()> {
    let manager = ModelManager::new(config.models_dir.clone())?;

    match action {
        ModelAction::Fetch { repo } => {
            let repo = repo.unwrap_or_else(|| {
                config
                    .embedding_model_for(EmbeddingBackend::Candle)
                    .to_string()
            });
            let model = SentenceModel::bert(repo);
            let dir = manager.ensure_model(&model).await?;
            println!("{}", dir.display());
        }
        ModelAction::List => {
            for name in manager.list_installed_models().await? {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
