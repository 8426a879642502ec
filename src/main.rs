use anyhow::Context;
use kbscope::cli::{Cli, Commands, ConfigAction};
use kbscope::config::Config;
use kbscope::embedding::ProviderChain;
use kbscope::index::HnswVectorStore;
use kbscope::retrieval::{Ingestor, QueryOutcome, Retriever, SearchRequest, SearchStrategy};
use kbscope::storage::{DocumentWriter, NewDocument, SqliteStore};
use kbscope::KbError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Add {
            title,
            file,
            domain,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_add(&config, title, &file, domain)?;
        }
        Commands::Delete { id } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_delete(&config, id).await?;
        }
        Commands::Ingest => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_ingest(&config).await?;
        }
        Commands::Query {
            query,
            limit,
            domain,
            strategy,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            let strategy = strategy
                .map(|s| s.parse::<SearchStrategy>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let request = SearchRequest {
                query,
                limit,
                domain,
                strategy,
            };
            cmd_query(&config, &request, json).await?;
        }
        Commands::Stats => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_stats(&config).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "kbscope=debug" } else { "kbscope=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Shared components of commands that touch the index
struct Runtime {
    store: Arc<SqliteStore>,
    chain: Arc<ProviderChain>,
    vectors: Arc<HnswVectorStore>,
    ingestor: Ingestor,
}

impl Runtime {
    async fn open(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(open_store(config)?);
        let chain = Arc::new(ProviderChain::connect(&config.embedding).await);
        let vectors = Arc::new(HnswVectorStore::new(config.index.clone()));
        let ingestor = Ingestor::new(config, store.clone(), vectors.clone(), chain.clone());

        Ok(Self {
            store,
            chain,
            vectors,
            ingestor,
        })
    }

    /// The vector index is in memory; rebuild it from storage
    async fn warm(&self) -> anyhow::Result<()> {
        if self.chain.is_available() {
            self.ingestor
                .ingest_all()
                .await
                .context("Failed to build vector index")?;
        }
        Ok(())
    }
}

fn cmd_add(config: &Config, title: String, file: &Path, domain: Option<String>) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read document body from {}", file.display()))?;
    let store = open_store(config)?;

    let id = store.insert_document(NewDocument {
        title,
        content,
        domain,
    })?;

    println!("✓ Added document {}", id);
    Ok(())
}

async fn cmd_delete(config: &Config, id: i64) -> anyhow::Result<()> {
    let runtime = Runtime::open(config).await?;
    if runtime.ingestor.remove_document(id).await? {
        println!("✓ Document {} deleted", id);
    } else {
        println!("Document {} not found or already deleted", id);
    }
    Ok(())
}

async fn cmd_ingest(config: &Config) -> anyhow::Result<()> {
    let runtime = Runtime::open(config).await?;
    if !runtime.chain.is_available() {
        anyhow::bail!("No embedding provider is available");
    }

    let summary = runtime.ingestor.ingest_all().await?;
    println!(
        "✓ Embedded {} documents into {} chunks ({} failed)",
        summary.documents, summary.chunks, summary.failed
    );
    if let Some(primary) = runtime.chain.primary() {
        println!("  Provider: {} ({}D)", primary.kind(), primary.dimension());
    }
    print_index_stats(&runtime);
    Ok(())
}

async fn cmd_query(config: &Config, request: &SearchRequest, json: bool) -> anyhow::Result<()> {
    let runtime = Runtime::open(config).await?;
    runtime.warm().await?;

    let retriever = Retriever::new(
        config,
        runtime.store.clone(),
        runtime.store.clone(),
        runtime.chain.clone(),
        runtime.vectors.clone(),
    )?;
    let outcome = retriever.search(request).await?;

    if json {
        let rendered = serde_json::to_string_pretty(&outcome).map_err(|e| KbError::Json {
            source: e,
            context: "Failed to serialize query outcome".to_string(),
        })?;
        println!("{}", rendered);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

async fn cmd_stats(config: &Config) -> anyhow::Result<()> {
    let runtime = Runtime::open(config).await?;
    let stats = runtime.store.stats()?;

    println!("Knowledge Base");
    println!("==============");
    println!("Active documents:  {}", stats.active_documents);
    println!("Deleted documents: {}", stats.deleted_documents);
    for (domain, count) in &stats.domains {
        println!("  {:<16} {}", domain, count);
    }

    runtime.warm().await?;
    print_index_stats(&runtime);
    Ok(())
}

fn print_index_stats(runtime: &Runtime) {
    let stats = runtime.ingestor.index_stats();
    if stats.is_empty() {
        println!("\nVector index is empty");
        return;
    }
    println!("\nVector index:");
    for domain in stats {
        println!(
            "  {:<16} {} vectors ({}D), {} tombstones",
            domain.domain, domain.vectors, domain.dimension, domain.tombstones
        );
    }
}

fn print_outcome(outcome: &QueryOutcome) {
    println!("Query: {}", outcome.query);
    println!(
        "Scope: {} (domain {}, max semantic {:.2})",
        outcome.scope.scope, outcome.scope.domain, outcome.scope.max_semantic_score
    );
    println!("Confidence: {:.2}", outcome.confidence);

    if outcome.results.is_empty() {
        println!("\nNo results");
    } else {
        println!("\nResults:");
        for (rank, doc) in outcome.results.iter().enumerate() {
            let legs: Vec<String> = doc.search_types.iter().map(|k| k.to_string()).collect();
            println!(
                "  [{}] {} (#{}, {}) score {:.3} [{}]",
                rank + 1,
                doc.title,
                doc.document_id,
                doc.domain,
                doc.final_score,
                legs.join("+")
            );
            if !doc.excerpt.is_empty() {
                println!("      {}", doc.excerpt.replace('\n', " "));
            }
        }
    }

    if !outcome.knowledge_gaps.is_empty() {
        println!("\n⚠ Knowledge gaps:");
        for gap in &outcome.knowledge_gaps {
            println!("  - {}", gap);
        }
    }

    if !outcome.available_domains.is_empty() {
        println!("\nAvailable domains: {}", outcome.available_domains.join(", "));
    }
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let rendered = toml::to_string_pretty(&config).map_err(KbError::from)?;
            println!("{}", rendered);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> anyhow::Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'kbscope config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    let config = match profile {
        Some(profile) => Config::load_with_profile(&path, &profile)?,
        None => Config::load(&path)?,
    };
    Ok(config)
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    let path = expand_path(&config.storage.database_path)?;
    let store = SqliteStore::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok(store)
}

fn expand_path(path: &Path) -> anyhow::Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| KbError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| KbError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
