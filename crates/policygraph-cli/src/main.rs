//! Policygraph CLI - build, maintain and query the policy knowledge graph

use clap::{Parser, Subcommand};
use policygraph_core::config::Config;
use policygraph_core::domain::ingestion::{LlmDocumentExtractor, StaticExtractor};
use policygraph_core::domain::knowledge::{
    Node, PolicyGraphService, RebuildOptions, RelationType, SnapshotNode,
};
use policygraph_core::domain::retrieval::{HybridRetriever, LlmMentionExtractor};
use policygraph_core::infrastructure::knowledge::SqliteGraphStore;
use policygraph_core::llm::LlmClient;
use policygraph_core::storage::{Database, DatabaseConfig};
use policygraph_core::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

type Service = PolicyGraphService<SqliteGraphStore>;

#[derive(Parser)]
#[command(name = "policygraph")]
#[command(author, version, about = "Policy knowledge graph builder and retriever", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Graph database file (overrides storage.database_path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the graph from an extraction file
    Ingest {
        /// JSON array of {document_id, title, text, extraction} records
        file: PathBuf,
        /// Merge into the stored graph instead of replacing it
        #[arg(short, long)]
        incremental: bool,
        /// Skip label deduplication after saving
        #[arg(long)]
        no_dedup: bool,
        /// Extract with the configured LLM instead of the file's extraction results
        #[arg(long)]
        llm: bool,
    },

    /// Retrieve documents and relations for a question
    Retrieve {
        query: String,
        /// Maximum nodes in the retrieved subgraph
        #[arg(short, long)]
        budget: Option<usize>,
    },

    /// Show graph statistics
    Stats,

    /// Merge nodes whose labels collide after normalization
    Dedup,

    /// Write the latest snapshot as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Explore the graph around a node (id or label)
    Explore {
        #[command(subcommand)]
        action: ExploreAction,
    },

    /// Delete every stored snapshot
    Clear {
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ExploreAction {
    /// Directly connected nodes
    Neighbors { node: String },
    /// Connected nodes with the relation joining them
    Related {
        node: String,
        /// Only this relation type (e.g. issued_by, 发布)
        #[arg(short, long)]
        relation: Option<String>,
    },
    /// Shortest path between two nodes
    Path { from: String, to: String },
    /// Every node reachable from a node
    Component { node: String },
    /// Neighborhood within a number of hops
    Ego {
        node: String,
        #[arg(short, long, default_value_t = 1)]
        radius: usize,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("policygraph=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        if let Some(hint) = e.downcast_ref::<Error>().and_then(Error::suggestion) {
            eprintln!("hint: {}", hint);
        }
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };
    let database = cli.database.as_deref();

    match cli.command {
        Commands::Ingest {
            file,
            incremental,
            no_dedup,
            llm,
        } => {
            let config = Config::load()?;
            let (_db, service) = open_service(database, &config).await?;
            let options = RebuildOptions::from_config(&config.ingestion).incremental(incremental);
            let options = if no_dedup {
                options.deduplicate(false)
            } else {
                options
            };
            cmd_ingest(&service, &config, &file, options, llm, out).await
        }

        Commands::Retrieve { query, budget } => {
            let config = Config::load()?;
            let (_db, service) = open_service(database, &config).await?;
            cmd_retrieve(&service, &query, budget, out).await
        }

        Commands::Stats => {
            let (_db, service) = open_service(database, &Config::load()?).await?;
            cmd_stats(&service, out).await
        }

        Commands::Dedup => {
            let (_db, service) = open_service(database, &Config::load()?).await?;
            cmd_dedup(&service, out).await
        }

        Commands::Export { output } => {
            let (_db, service) = open_service(database, &Config::load()?).await?;
            cmd_export(&service, output.as_deref(), out).await
        }

        Commands::Explore { action } => {
            let (_db, service) = open_service(database, &Config::load()?).await?;
            cmd_explore(&service, action, out).await
        }

        Commands::Clear { force } => {
            let (_db, service) = open_service(database, &Config::load()?).await?;
            cmd_clear(&service, force, out).await
        }

        Commands::Config { action } => cmd_config(action, out),

        Commands::Doctor => cmd_doctor(database, out).await,
    }
}

/// Output settings shared by every command
#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    fn print_json(&self, value: &impl serde::Serialize) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn database_config(database: Option<&Path>, config: &Config) -> anyhow::Result<DatabaseConfig> {
    match database {
        Some(path) => Ok(DatabaseConfig::with_path(path)),
        None => DatabaseConfig::from_config(config),
    }
}

async fn open_service(database: Option<&Path>, config: &Config) -> anyhow::Result<(Database, Service)> {
    let db = Database::new(database_config(database, config)?).await?;
    let store = Arc::new(SqliteGraphStore::new(db.pool().clone()));

    let mut retriever = HybridRetriever::from_config(&config.retrieval);
    if config.retrieval.use_llm_mentions {
        match LlmClient::from_env(&config.llm) {
            Ok(client) => {
                retriever = retriever.with_mention_extractor(Arc::new(LlmMentionExtractor::new(
                    Arc::new(client),
                )));
            }
            Err(e) => warn!(error = %e, "LLM mentions enabled but no client available, using heuristic"),
        }
    }

    let service = PolicyGraphService::from_config(store, config).with_retriever(retriever);
    Ok((db, service))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ingest(
    service: &Service,
    config: &Config,
    file: &Path,
    options: RebuildOptions,
    llm: bool,
    out: Output,
) -> anyhow::Result<()> {
    let (precomputed, documents) = StaticExtractor::load(file)?;
    info!(file = %file.display(), documents = documents.len(), llm, "Loaded documents");

    let report = if llm {
        let client = LlmClient::from_env(&config.llm)?;
        let extractor = LlmDocumentExtractor::new(Arc::new(client))
            .with_max_text_chars(config.ingestion.max_text_chars);
        service.rebuild(&documents, &extractor, options).await?
    } else {
        service.rebuild(&documents, &precomputed, options).await?
    };

    if out.json() {
        return out.print_json(&report);
    }
    if out.quiet {
        return Ok(());
    }

    let batch = &report.batch;
    println!(
        "Ingested {} of {} documents ({} skipped)",
        batch.processed,
        batch.total_documents(),
        batch.skipped_count()
    );
    println!(
        "  Entities: {}  Relations: {}  Dropped relations: {}",
        batch.totals.entities_added, batch.totals.relations_added, batch.totals.relations_dropped
    );
    for skipped in &batch.skipped {
        println!("  [skipped] {} {}: {}", skipped.document_id, skipped.title, skipped.reason);
    }
    match &report.saved {
        Some(saved) => println!(
            "Saved snapshot #{} ({}): {} nodes, {} edges",
            saved.id,
            if saved.incremental { "incremental" } else { "full" },
            saved.node_count,
            saved.edge_count
        ),
        None => println!("Nothing saved; the stored graph is unchanged."),
    }
    if let Some(dedup) = &report.dedup {
        println!(
            "Deduplicated: removed {} nodes, {} edges ({} nodes, {} edges remain)",
            dedup.removed_nodes, dedup.removed_edges, dedup.node_count, dedup.edge_count
        );
    }
    Ok(())
}

async fn cmd_retrieve(
    service: &Service,
    query: &str,
    budget: Option<usize>,
    out: Output,
) -> anyhow::Result<()> {
    let context = service.retrieve(query, budget).await?;

    if out.json() {
        return out.print_json(&context);
    }

    if context.is_empty() {
        if !out.quiet {
            println!("No matching entities found.");
        }
        return Ok(());
    }

    if !out.quiet {
        println!("Mentions: {}", context.mentions.join(", "));
        if let Some(subgraph) = &context.subgraph {
            println!(
                "Subgraph: {} nodes, {} edges ({} matched)",
                subgraph.node_count(),
                subgraph.edge_count(),
                context.matched_nodes.len()
            );
        }
        println!("\nDocuments:");
    }
    for id in &context.document_ids {
        println!("  {}", id);
    }
    if !out.quiet {
        println!("\nRelations:");
        for triple in &context.relations {
            println!("  {} -[{}]-> {}", triple.source, triple.relation, triple.target);
        }
    }
    Ok(())
}

async fn cmd_stats(service: &Service, out: Output) -> anyhow::Result<()> {
    let stored = service.stats().await?;
    let structure = service.graph_stats().await?;

    if out.json() {
        return out.print_json(&serde_json::json!({
            "stored": stored,
            "graph": structure,
        }));
    }

    if stored.is_empty() {
        println!("No graph stored yet.");
        if !out.quiet {
            println!("\nBuild one with: policygraph ingest <file>");
        }
        return Ok(());
    }

    println!("Nodes: {}", stored.node_count);
    println!("Edges: {}", stored.edge_count);
    if !out.quiet {
        println!("Density: {:.4}", structure.density);
        println!("Connected components: {}", structure.connected_components);
        match structure.diameter {
            Some(diameter) => println!("Diameter: {}", diameter),
            None => println!("Diameter: n/a"),
        }
        if let Some(created_at) = stored.created_at {
            println!("Created: {}", created_at.to_rfc3339());
        }
        if let Some(updated) = stored.last_updated {
            println!("Last updated: {}", updated.to_rfc3339());
        }
    }
    Ok(())
}

async fn cmd_dedup(service: &Service, out: Output) -> anyhow::Result<()> {
    let report = service.remove_duplicate_nodes().await?;

    if out.json() {
        return out.print_json(&report);
    }
    if !out.quiet {
        if report.changed() {
            println!(
                "Removed {} duplicate nodes and {} edges ({} nodes, {} edges remain)",
                report.removed_nodes, report.removed_edges, report.node_count, report.edge_count
            );
        } else {
            println!("No duplicate nodes found.");
        }
    }
    Ok(())
}

async fn cmd_export(service: &Service, output: Option<&Path>, out: Output) -> anyhow::Result<()> {
    let snapshot = service.export().await?.ok_or(Error::NoSnapshot)?;
    let body = serde_json::to_string_pretty(&snapshot)?;

    match output {
        Some(path) => {
            std::fs::write(path, body)?;
            if !out.quiet {
                println!(
                    "Exported {} nodes and {} edges to {}",
                    snapshot.node_count(),
                    snapshot.edge_count(),
                    path.display()
                );
            }
        }
        None => println!("{}", body),
    }
    Ok(())
}

async fn require_node(service: &Service, key: &str) -> anyhow::Result<Node> {
    Ok(service
        .find_node(key)
        .await?
        .ok_or_else(|| Error::NodeNotFound(key.to_string()))?)
}

fn print_node(node: &Node) {
    println!("  {} ({}) [{}]", node.label, node.node_type, node.id);
}

fn print_nodes(nodes: &[Node], out: Output) -> anyhow::Result<()> {
    if out.json() {
        let wire: Vec<SnapshotNode> = nodes.iter().map(SnapshotNode::from).collect();
        return out.print_json(&wire);
    }
    if nodes.is_empty() && !out.quiet {
        println!("  (none)");
    }
    for node in nodes {
        print_node(node);
    }
    Ok(())
}

async fn cmd_explore(service: &Service, action: ExploreAction, out: Output) -> anyhow::Result<()> {
    match action {
        ExploreAction::Neighbors { node } => {
            let node = require_node(service, &node).await?;
            let neighbors = service.neighbors(&node.id).await?;
            if !out.quiet && !out.json() {
                println!("Neighbors of {}:", node.label);
            }
            print_nodes(&neighbors, out)?;
        }
        ExploreAction::Related { node, relation } => {
            let node = require_node(service, &node).await?;
            let filter = relation.as_deref().map(RelationType::parse);
            let related = service.related(&node.id, filter.as_ref()).await?;

            if out.json() {
                let wire: Vec<serde_json::Value> = related
                    .iter()
                    .map(|(n, relation)| {
                        serde_json::json!({
                            "relation": relation,
                            "node": SnapshotNode::from(n),
                        })
                    })
                    .collect();
                return out.print_json(&wire);
            }
            if !out.quiet {
                println!("Related to {}:", node.label);
            }
            if related.is_empty() && !out.quiet {
                println!("  (none)");
            }
            for (n, relation) in &related {
                println!("  -[{}]- {} ({}) [{}]", relation, n.label, n.node_type, n.id);
            }
        }
        ExploreAction::Path { from, to } => {
            let from = require_node(service, &from).await?;
            let to = require_node(service, &to).await?;
            match service.path(&from.id, &to.id).await? {
                Some(path) => {
                    if out.json() {
                        let wire: Vec<SnapshotNode> = path.iter().map(SnapshotNode::from).collect();
                        return out.print_json(&wire);
                    }
                    let labels: Vec<&str> = path.iter().map(|n| n.label.as_str()).collect();
                    println!("{}", labels.join(" -> "));
                    if !out.quiet {
                        println!("({} hops)", path.len().saturating_sub(1));
                    }
                }
                None => {
                    if out.json() {
                        return out.print_json(&serde_json::Value::Null);
                    }
                    println!("No path between {} and {}.", from.label, to.label);
                }
            }
        }
        ExploreAction::Component { node } => {
            let node = require_node(service, &node).await?;
            let component = service.component(&node.id).await?;
            if !out.quiet && !out.json() {
                println!("Component of {} ({} nodes):", node.label, component.len());
            }
            print_nodes(&component, out)?;
        }
        ExploreAction::Ego { node, radius } => {
            let node = require_node(service, &node).await?;
            let ego = service.ego(&node.id, radius).await?;
            if out.json() {
                return out.print_json(&ego);
            }
            if !out.quiet {
                println!(
                    "Within {} hops of {}: {} nodes, {} edges",
                    radius,
                    node.label,
                    ego.node_count(),
                    ego.edge_count()
                );
            }
            for n in ego.nodes() {
                print_node(n);
            }
        }
    }
    Ok(())
}

async fn cmd_clear(service: &Service, force: bool, out: Output) -> anyhow::Result<()> {
    if !force {
        return Err(anyhow::anyhow!(
            "Refusing to delete the stored graph without --force"
        ));
    }
    let deleted = service.clear().await?;
    if out.json() {
        return out.print_json(&serde_json::json!({ "deleted": deleted }));
    }
    if !out.quiet {
        println!("Deleted {} stored snapshots.", deleted);
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, out: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !out.quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if out.json() {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(key, value)| (key, serde_json::Value::String(value)))
                    .collect();
                return out.print_json(&map);
            }
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !out.quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(database: Option<&Path>, out: Output) -> anyhow::Result<()> {
    let quiet = out.quiet;
    if !quiet {
        println!("Policygraph Health Check");
        println!("========================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            match config.llm.resolved_api_key() {
                Ok(Some(_)) => {
                    if !quiet {
                        let redacted = config.llm.redacted_api_key()?.unwrap_or_default();
                        println!("[OK] API Key: Configured ({})", redacted);
                    }
                }
                Ok(None) => {
                    if !quiet {
                        println!("[--] API Key: Not configured (only needed for --llm and LLM mentions)");
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] API Key: Error - {}", e);
                    }
                }
            }
            config
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
            Config::default()
        }
    };

    if !quiet {
        match Config::config_path() {
            Ok(path) => {
                if path.exists() {
                    println!("[OK] Config file: {}", path.display());
                } else {
                    println!("[--] Config file: {} (using defaults)", path.display());
                }
            }
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
    }

    let db_config = database_config(database, &config)?;
    match Database::new(db_config).await {
        Ok(db) => match db.health_check().await {
            Ok(()) => {
                if !quiet {
                    println!("[OK] Database: Connected");
                    println!("     Path: {}", db.path().display());
                    match db.migration_status().await {
                        Ok(status) if status.needs_migration => println!(
                            "[!!] Database: Migrations pending (v{} -> v{})",
                            status.current_version, status.target_version
                        ),
                        Ok(status) => println!("[OK] Database: Schema v{}", status.current_version),
                        Err(e) => println!("[!!] Database: Migration check failed - {}", e),
                    }
                    let store = SqliteGraphStore::new(db.pool().clone());
                    match store.snapshot_count().await {
                        Ok(count) => println!("     Snapshots: {}", count),
                        Err(e) => println!("[!!] Database: Snapshot count failed - {}", e),
                    }
                }
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Database: Health check failed - {}", e);
                }
            }
        },
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: Failed to initialize - {}", e);
            }
        }
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(())
}
