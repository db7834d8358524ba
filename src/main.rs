//! maat CLI: legal knowledge engine.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use maat::category::LegalCategory;
use maat::consult::ConsultRequest;
use maat::engine::{Engine, EngineConfig};
use maat::entry::{EntryId, EntryPatch};
use maat::graph::RelationType;
use maat::graph::traverse::ClosureConfig;
use maat::search::SearchFilters;

#[derive(Parser)]
#[command(name = "maat", version, about = "Legal knowledge engine")]
struct Cli {
    /// Data directory for persistent storage.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new maat data directory.
    Init,

    /// Create a knowledge entry.
    Add {
        #[arg(long)]
        title: String,
        /// Inline content; use --file to read from disk instead.
        #[arg(long, conflicts_with = "file")]
        content: Option<String>,
        /// Read content from a file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Category id (see `maat categories`).
        #[arg(long)]
        category: String,
        /// Comma-separated tags.
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long, default_value = "")]
        source: String,
    },

    /// Show a knowledge entry.
    Get { id: u64 },

    /// List active knowledge entries.
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "0")]
        skip: usize,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Apply a versioned partial update to an entry.
    Update {
        id: u64,
        /// The version you last read (optimistic concurrency token).
        #[arg(long)]
        expected_version: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Comma-separated tags (replaces the tag set).
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        source: Option<String>,
    },

    /// Soft-delete an entry.
    Deactivate { id: u64 },

    /// Add a typed relation between two entries.
    Relate {
        source: u64,
        target: u64,
        /// Relation type: citation, hierarchical, or causal.
        #[arg(long, default_value = "citation")]
        relation_type: String,
        #[arg(long, default_value = "1.0")]
        confidence: f32,
    },

    /// Show entries related to an entry (one hop, both directions).
    Related {
        id: u64,
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Bounded transitive closure over outgoing relations.
    Closure {
        id: u64,
        #[arg(long, default_value = "3")]
        max_depth: usize,
    },

    /// Hybrid search over the knowledge base.
    Search {
        query: String,
        #[arg(long)]
        category: Option<String>,
        /// Comma-separated tags that must all be present.
        #[arg(long)]
        tags: Option<String>,
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Classify a question against the legal taxonomy.
    Classify { question: String },

    /// Ask a legal question.
    Consult {
        question: String,
        #[arg(long)]
        context: Option<String>,
        /// Explicit category override.
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// Batch consultation: one question per line in the given file.
    Batch {
        file: PathBuf,
        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// Show consultation history, newest first.
    History {
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value = "0")]
        skip: usize,
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Import a document (text/html/pdf/csv) as knowledge entries.
    Import {
        file: PathBuf,
        /// Default category for imported entries.
        #[arg(long)]
        category: String,
    },

    /// Show knowledge base statistics.
    Stats,

    /// List the legal category taxonomy.
    Categories,

    /// Show engine info.
    Info,
}

fn parse_category(raw: &str) -> Result<LegalCategory> {
    LegalCategory::from_id(raw).ok_or_else(|| {
        miette::miette!(
            "unknown category \"{raw}\" — list valid categories with `maat categories`"
        )
    })
}

fn parse_id(raw: u64) -> Result<EntryId> {
    EntryId::new(raw).ok_or_else(|| miette::miette!("entry ids start at 1"))
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn print_entry(entry: &maat::entry::KnowledgeEntry) {
    println!("{} 《{}》 [{}]", entry.id, entry.title, entry.category);
    println!("  version:  {}", entry.version);
    println!("  active:   {}", entry.active);
    println!("  source:   {}", entry.source);
    if !entry.tags.is_empty() {
        let tags: Vec<&str> = entry.tags.iter().map(|t| t.as_str()).collect();
        println!("  tags:     {}", tags.join(", "));
    }
    println!("  content:  {}", maat::consult::compose::snippet(&entry.content, 120));
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path).into_diagnostic()?,
        None => EngineConfig::standard(),
    };
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }

    match cli.command {
        Commands::Init => {
            let data_dir = cli.data_dir.unwrap_or_else(|| PathBuf::from(".maat"));
            let config = EngineConfig {
                data_dir: Some(data_dir.clone()),
                ..config
            };
            let engine = Engine::new(config).into_diagnostic()?;
            println!("Initialized maat at {}", data_dir.display());
            println!("{}", engine.info());
        }

        Commands::Add {
            title,
            content,
            file,
            category,
            tags,
            source,
        } => {
            let engine = Engine::new(config).into_diagnostic()?;
            let content = match (content, file) {
                (Some(inline), _) => inline,
                (None, Some(path)) => std::fs::read_to_string(&path).into_diagnostic()?,
                (None, None) => miette::bail!("provide --content or --file"),
            };
            let entry = engine
                .create_entry(maat::entry::EntryDraft {
                    title,
                    content,
                    category: parse_category(&category)?,
                    tags: split_tags(&tags),
                    source,
                })
                .into_diagnostic()?;
            engine.quiesce_index();
            println!("Created {}", entry.id);
            print_entry(&entry);
        }

        Commands::Get { id } => {
            let engine = Engine::new(config).into_diagnostic()?;
            match engine.get_entry(parse_id(id)?) {
                Some(entry) => print_entry(&entry),
                None => miette::bail!("no entry with id {id}"),
            }
        }

        Commands::List {
            category,
            skip,
            limit,
        } => {
            let engine = Engine::new(config).into_diagnostic()?;
            let category = category.as_deref().map(parse_category).transpose()?;
            let entries = engine.list_entries(category, skip, limit);
            if entries.is_empty() {
                println!("No entries.");
            } else {
                for entry in &entries {
                    println!(
                        "{} 《{}》 [{}] v{}",
                        entry.id, entry.title, entry.category, entry.version
                    );
                }
            }
        }

        Commands::Update {
            id,
            expected_version,
            title,
            content,
            category,
            tags,
            source,
        } => {
            let engine = Engine::new(config).into_diagnostic()?;
            let patch = EntryPatch {
                expected_version,
                title,
                content,
                category: category.as_deref().map(parse_category).transpose()?,
                tags: tags.as_deref().map(split_tags),
                source,
            };
            let entry = engine.update_entry(parse_id(id)?, patch).into_diagnostic()?;
            engine.quiesce_index();
            println!("Updated {} to version {}", entry.id, entry.version);
        }

        Commands::Deactivate { id } => {
            let engine = Engine::new(config).into_diagnostic()?;
            let entry = engine.deactivate_entry(parse_id(id)?).into_diagnostic()?;
            engine.quiesce_index();
            println!("Deactivated {}", entry.id);
        }

        Commands::Relate {
            source,
            target,
            relation_type,
            confidence,
        } => {
            let engine = Engine::new(config).into_diagnostic()?;
            let relation_type = RelationType::from_id(&relation_type).ok_or_else(|| {
                miette::miette!("unknown relation type \"{relation_type}\" (citation, hierarchical, causal)")
            })?;
            let relation = engine
                .add_relation(parse_id(source)?, parse_id(target)?, relation_type, confidence)
                .into_diagnostic()?;
            println!(
                "{} -[{}]-> {} (confidence {:.2})",
                relation.source, relation.relation_type, relation.target, relation.confidence
            );
        }

        Commands::Related { id, limit } => {
            let engine = Engine::new(config).into_diagnostic()?;
            let related = engine.related_entries(parse_id(id)?, limit);
            if related.is_empty() {
                println!("No related entries.");
            } else {
                for neighbor in &related {
                    let title = engine
                        .get_entry(neighbor.entry_id)
                        .map(|e| e.title.clone())
                        .unwrap_or_default();
                    println!(
                        "{} 《{}》 [{}] confidence {:.2}",
                        neighbor.entry_id, title, neighbor.relation_type, neighbor.confidence
                    );
                }
            }
        }

        Commands::Closure { id, max_depth } => {
            let engine = Engine::new(config).into_diagnostic()?;
            let result = engine.transitive_closure(
                parse_id(id)?,
                &ClosureConfig {
                    max_depth,
                    ..Default::default()
                },
            );
            println!(
                "{} entries within {} hops ({} edges followed):",
                result.nodes.len(),
                max_depth,
                result.edges_followed
            );
            for node in &result.nodes {
                let title = engine
                    .get_entry(node.entry_id)
                    .map(|e| e.title.clone())
                    .unwrap_or_default();
                println!("  depth {}: {} 《{}》", node.depth, node.entry_id, title);
            }
        }

        Commands::Search {
            query,
            category,
            tags,
            limit,
        } => {
            let engine = Engine::new(config).into_diagnostic()?;
            engine.quiesce_index();
            let filters = SearchFilters {
                category: category.as_deref().map(parse_category).transpose()?,
                tags: tags.as_deref().map(split_tags).unwrap_or_default(),
                boost_category: None,
            };
            let hits = engine
                .search(&query, &filters, Some(limit))
                .into_diagnostic()?;
            if hits.is_empty() {
                println!("No results.");
            } else {
                for (i, hit) in hits.iter().enumerate() {
                    let title = engine
                        .get_entry(hit.entry_id)
                        .map(|e| e.title.clone())
                        .unwrap_or_default();
                    println!(
                        "{}. 《{}》 [{}] score {:.4} (lex {:.4} / sem {:.4})",
                        i + 1,
                        title,
                        hit.category,
                        hit.blended_score,
                        hit.lexical_score,
                        hit.semantic_score
                    );
                }
            }
        }

        Commands::Classify { question } => {
            let engine = Engine::new(config).into_diagnostic()?;
            let result = engine.classify(&question).into_diagnostic()?;
            println!(
                "{} ({}) confidence {:.4}",
                result.category,
                result.category.name(),
                result.confidence
            );
        }

        Commands::Consult {
            question,
            context,
            category,
            user,
        } => {
            let engine = Engine::new(config).into_diagnostic()?;
            engine.quiesce_index();
            let request = ConsultRequest {
                question,
                context,
                category: category.as_deref().map(parse_category).transpose()?,
                user,
                deadline_ms: None,
            };
            let record = engine.consult(&request).into_diagnostic()?;
            println!("[{}] {:?}", record.id, record.status);
            if let Some(confidence) = record.confidence {
                println!("confidence: {confidence:.4} / category: {}", record.category);
            }
            if !record.sources.is_empty() {
                let ids: Vec<String> = record.sources.iter().map(|s| s.to_string()).collect();
                println!("sources: {}", ids.join(", "));
            }
            println!("{}", record.answer);
        }

        Commands::Batch { file, user } => {
            let engine = Engine::new(config).into_diagnostic()?;
            engine.quiesce_index();
            let content = std::fs::read_to_string(&file).into_diagnostic()?;
            let requests: Vec<ConsultRequest> = content
                .lines()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(|q| ConsultRequest {
                    question: q.to_string(),
                    context: None,
                    category: None,
                    user: user.clone(),
                    deadline_ms: None,
                })
                .collect();
            let total = requests.len();
            let results = engine.consult_batch(requests);
            for (i, result) in results.iter().enumerate() {
                match result {
                    Ok(record) => println!(
                        "{}/{total} [{:?}] {}",
                        i + 1,
                        record.status,
                        maat::consult::compose::snippet(&record.question, 40)
                    ),
                    Err(e) => println!("{}/{total} [error] {e}", i + 1),
                }
            }
        }

        Commands::History { user, skip, limit } => {
            let engine = Engine::new(config).into_diagnostic()?;
            let records = engine.consultations(user.as_deref(), skip, limit);
            if records.is_empty() {
                println!("No consultations.");
            } else {
                for record in &records {
                    println!(
                        "{} [{:?}] {} — {}",
                        record.id,
                        record.status,
                        record.category,
                        maat::consult::compose::snippet(&record.question, 60)
                    );
                }
            }
        }

        Commands::Import { file, category } => {
            let engine = Engine::new(config).into_diagnostic()?;
            let entries = engine
                .import_path(&file, parse_category(&category)?)
                .into_diagnostic()?;
            engine.quiesce_index();
            println!("Imported {} entries from {}", entries.len(), file.display());
            for entry in &entries {
                println!("  {} 《{}》", entry.id, entry.title);
            }
        }

        Commands::Stats => {
            let engine = Engine::new(config).into_diagnostic()?;
            let stats = engine.stats();
            println!("total active entries: {}", stats.total);
            println!("by category:");
            for (category, count) in &stats.by_category {
                println!("  {category}: {count}");
            }
            if !stats.top_tags.is_empty() {
                println!("top tags:");
                for (tag, count) in &stats.top_tags {
                    println!("  {tag}: {count}");
                }
            }
        }

        Commands::Categories => {
            for category in LegalCategory::TAXONOMY {
                println!(
                    "{}  {} — {}",
                    category.id(),
                    category.name(),
                    category.description()
                );
            }
        }

        Commands::Info => {
            let engine = Engine::new(config).into_diagnostic()?;
            println!("{}", engine.info());
        }
    }

    Ok(())
}
