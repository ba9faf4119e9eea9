use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docent_embed::{EmbeddingProvider, GeminiEmbedProvider, RemoteEmbedConfig};
use docent_retriever::{
    capabilities::Capabilities,
    config::{DocentConfig, EmbedderChoice, EmbeddingSection},
    logging,
    retrieval::{
        index_builder::{BuildReport, IndexBuilder, IndexBuilderConfig, ResumePolicy},
        retriever::ScoredDocument,
        synthesizer::{AnswerSynthesizer, GeminiGenerator, QueryEngine},
    },
    status::IndexStatistics,
    storage::json_store,
};
use docent_context::GroundingPromptBuilder;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

/// Build a searchable index of a documentation folder and ask questions about it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a directory and embed new or changed documents into the index
    Build {
        /// Directory to scan
        #[arg(short, long)]
        root: Option<PathBuf>,
        /// Index file to create or update
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Embedding backend
        #[arg(short, long)]
        embedder: Option<EmbedderChoice>,
        /// Gemini API key for remote embedding
        #[arg(short = 'k', long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Documents per embedding call
        #[arg(long)]
        batch_size: Option<usize>,
        /// Save progress every N batches
        #[arg(long)]
        checkpoint_every: Option<usize>,
        /// When a stored embedding is reused
        #[arg(long)]
        resume_policy: Option<ResumePolicy>,
        /// Pause before each remote embedding request, in seconds
        #[arg(long)]
        request_delay_secs: Option<u64>,
        /// Skip files matched by .gitignore
        #[arg(long)]
        respect_gitignore: bool,
    },
    /// Answer questions interactively from the index
    Query {
        /// Index file to read
        #[arg(short, long)]
        index: Option<PathBuf>,
        /// Backend used to embed questions
        #[arg(short, long)]
        embedder: Option<EmbedderChoice>,
        /// Gemini API key for answer generation
        #[arg(short = 'k', long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Documents used as context per question
        #[arg(short = 'n', long)]
        top_k: Option<usize>,
    },
    /// Print the documents closest to a question without generating an answer
    Search {
        question: String,
        #[arg(short, long)]
        index: Option<PathBuf>,
        #[arg(short, long)]
        embedder: Option<EmbedderChoice>,
        #[arg(short = 'k', long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        #[arg(short = 'n', long)]
        top_k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show index statistics
    Stats {
        #[arg(short, long)]
        index: Option<PathBuf>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

/// Exit status after Ctrl-C, as shells report for SIGINT
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let args = Args::parse();
    let mut config = DocentConfig::load(args.config.as_deref())?;
    logging::init(&config.logging, args.verbose);

    match args.command {
        Commands::Build {
            root,
            out,
            embedder,
            api_key,
            batch_size,
            checkpoint_every,
            resume_policy,
            request_delay_secs,
            respect_gitignore,
        } => {
            let build = &mut config.build;
            if let Some(root) = root {
                build.root = root;
            }
            if let Some(out) = out {
                build.output = out;
            }
            if let Some(batch_size) = batch_size {
                build.batch_size = batch_size;
            }
            if let Some(every) = checkpoint_every {
                build.checkpoint_every = every;
            }
            if let Some(policy) = resume_policy {
                build.resume_policy = policy;
            }
            build.respect_gitignore |= respect_gitignore;
            if let Some(embedder) = embedder {
                config.embedding.backend = embedder;
            }
            if let Some(delay) = request_delay_secs {
                config.embedding.request_delay_secs = delay;
            }
            run_build(&config, api_key.as_deref()).await
        }
        Commands::Query {
            index,
            embedder,
            api_key,
            top_k,
        } => {
            apply_query_overrides(&mut config, index, embedder, top_k);
            run_query(&config, api_key.as_deref()).await?;
            Ok(0)
        }
        Commands::Search {
            question,
            index,
            embedder,
            api_key,
            top_k,
            format,
        } => {
            apply_query_overrides(&mut config, index, embedder, top_k);
            let engine = open_engine(&config, api_key.as_deref()).await?;
            let results = engine.search(&question).await?;
            print_results(&results, &format)?;
            Ok(0)
        }
        Commands::Stats { index, format } => {
            let index = index.unwrap_or(config.query.index);
            let stats = IndexStatistics::collect(&index);
            print_stats(&stats, &format)?;
            Ok(0)
        }
    }
}

fn apply_query_overrides(
    config: &mut DocentConfig,
    index: Option<PathBuf>,
    embedder: Option<EmbedderChoice>,
    top_k: Option<usize>,
) {
    if let Some(index) = index {
        config.query.index = index;
    }
    if let Some(embedder) = embedder {
        config.query.embedder = embedder;
    }
    if let Some(top_k) = top_k {
        config.query.top_k = top_k;
    }
}

fn non_empty_key(api_key: Option<&str>) -> Option<&str> {
    api_key.map(str::trim).filter(|key| !key.is_empty())
}

/// Resolve `auto` for a build: remote with a key, otherwise no embedder.
fn resolve_build_embedder(choice: EmbedderChoice, api_key: Option<&str>) -> EmbedderChoice {
    match (choice, non_empty_key(api_key)) {
        (EmbedderChoice::Auto, Some(_)) => EmbedderChoice::Remote,
        (EmbedderChoice::Auto, None) => EmbedderChoice::None,
        (choice, _) => choice,
    }
}

/// Resolve `auto` for queries: remote with a key, otherwise local.
fn resolve_query_embedder(choice: EmbedderChoice, api_key: Option<&str>) -> EmbedderChoice {
    match (choice, non_empty_key(api_key)) {
        (EmbedderChoice::Auto, Some(_)) => EmbedderChoice::Remote,
        (EmbedderChoice::Auto, None) => EmbedderChoice::Local,
        (choice, _) => choice,
    }
}

async fn make_provider(
    choice: EmbedderChoice,
    settings: &EmbeddingSection,
    batch_size: usize,
    api_key: Option<&str>,
) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    Capabilities::detect().require(choice)?;
    match choice {
        EmbedderChoice::None | EmbedderChoice::Auto => Ok(None),
        EmbedderChoice::Local => Ok(Some(local_provider(settings, batch_size).await?)),
        EmbedderChoice::Remote => {
            let Some(key) = non_empty_key(api_key) else {
                bail!(
                    "remote embedding needs a Gemini API key \
                     (pass --api-key or set GEMINI_API_KEY)"
                );
            };
            let remote = RemoteEmbedConfig::gemini(key)
                .with_model(settings.remote_model.clone())
                .with_request_delay(Duration::from_secs(settings.request_delay_secs));
            Ok(Some(Arc::new(GeminiEmbedProvider::new(remote)?)))
        }
    }
}

#[cfg(feature = "local-embed")]
async fn local_provider(
    settings: &EmbeddingSection,
    batch_size: usize,
) -> Result<Arc<dyn EmbeddingProvider>> {
    use docent_embed::{FastEmbedProvider, LocalEmbedConfig};

    let cache_dir = settings
        .cache_dir
        .clone()
        .unwrap_or_else(docent_embed::config::default_cache_dir);
    let local = LocalEmbedConfig::multilingual_e5(settings.local_model.clone(), cache_dir)
        .with_batch_size(batch_size.max(1));
    Ok(Arc::new(FastEmbedProvider::create(local).await?))
}

#[cfg(not(feature = "local-embed"))]
async fn local_provider(
    _settings: &EmbeddingSection,
    _batch_size: usize,
) -> Result<Arc<dyn EmbeddingProvider>> {
    Capabilities::detect().require(EmbedderChoice::Local)?;
    bail!("local embedding is not available in this build")
}

async fn run_build(config: &DocentConfig, api_key: Option<&str>) -> Result<i32> {
    let build = &config.build;
    let capabilities = Capabilities::detect();
    println!("Indexing {} into {}", build.root.display(), build.output.display());
    for line in capabilities.summary_lines() {
        println!("{line}");
    }

    let choice = resolve_build_embedder(config.embedding.backend, api_key);
    if choice == EmbedderChoice::None {
        println!("No embedder selected; documents will be stored without embeddings.");
    }
    let provider = make_provider(choice, &config.embedding, build.batch_size, api_key).await?;

    let builder_config = IndexBuilderConfig::new(build.root.clone(), build.output.clone())
        .with_batch_size(build.batch_size)
        .with_checkpoint_every(build.checkpoint_every)
        .with_resume_policy(build.resume_policy)
        .with_max_text_chars(build.max_text_chars)
        .with_respect_gitignore(build.respect_gitignore);
    let mut builder = IndexBuilder::new(builder_config);
    if let Some(provider) = provider {
        builder = builder.with_provider(provider);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, saving progress...");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = builder.build_with_shutdown(shutdown_rx).await?;
    print_report(&report, &build.output);
    Ok(if report.interrupted {
        EXIT_INTERRUPTED
    } else {
        0
    })
}

fn print_report(report: &BuildReport, output: &Path) {
    println!(
        "\n{} {}",
        if report.interrupted {
            "Build interrupted; partial index saved to"
        } else {
            "Index saved to"
        },
        output.display()
    );
    println!("  Files scanned: {}", report.scanned);
    println!("  Unchanged (skipped): {}", report.skipped_complete);
    println!("  Documents written: {}", report.documents_written);
    println!("  Embedded: {}", report.embedded);
    println!("  Embedding failures: {}", report.embedding_failed);
    println!("  Unreadable or empty: {}", report.extraction_failed);
    println!(
        "  Batches: {} ({} checkpoints)",
        report.batches, report.checkpoints
    );
}

async fn open_engine(config: &DocentConfig, api_key: Option<&str>) -> Result<QueryEngine> {
    let query = &config.query;
    if !query.index.exists() {
        bail!(
            "index {} not found; run `docent build` first",
            query.index.display()
        );
    }
    let documents = json_store::load(&query.index);

    let choice = resolve_query_embedder(query.embedder, api_key);
    let Some(provider) = make_provider(choice, &config.embedding, 1, api_key).await? else {
        bail!("queries need an embedder; use --embedder local or remote");
    };

    let engine = QueryEngine::new(provider, documents).with_top_k(query.top_k);
    if engine.retriever().searchable() == 0 {
        bail!(
            "index {} has no embedded documents; rebuild it with an embedder",
            query.index.display()
        );
    }
    Ok(engine)
}

async fn run_query(config: &DocentConfig, api_key: Option<&str>) -> Result<()> {
    let Some(key) = non_empty_key(api_key) else {
        bail!(
            "answers need a Gemini API key (pass --api-key or set GEMINI_API_KEY); \
             `docent search` works without one"
        );
    };
    let generator = GeminiGenerator::new(key)?.with_model(config.query.generation_model.clone());
    let synthesizer = AnswerSynthesizer::new(Arc::new(generator))
        .with_prompt_builder(GroundingPromptBuilder::new(config.query.context_chars));
    let engine = open_engine(config, api_key).await?.with_synthesizer(synthesizer);

    println!(
        "Loaded {} searchable documents. Type a question, or 'exit' to quit.",
        engine.retriever().searchable()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nQuestion: ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match engine.ask(question).await {
            Ok(answer) => {
                println!("\n{}", answer.text.trim());
                println!("\nSources:");
                for scored in &answer.sources {
                    println!(
                        "  [{:.3}] {} ({})",
                        scored.score, scored.document.title, scored.document.source
                    );
                }
            }
            Err(e) => println!("Error: {e:#}"),
        }
    }
    Ok(())
}

fn print_results(results: &[ScoredDocument], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results)?);
        }
        OutputFormat::Summary => {
            println!("Found {} documents:", results.len());
            for scored in results {
                println!(
                    "  Similarity: {:.3} | {} | {}",
                    scored.score, scored.document.source, scored.document.title
                );
            }
        }
        OutputFormat::Full => {
            for scored in results {
                println!("Similarity: {:.3}", scored.score);
                println!("Source: {}", scored.document.source);
                println!("Title: {}", scored.document.title);
                println!("Content:\n{}", scored.document.text);
                println!("---");
            }
        }
    }
    Ok(())
}

fn print_stats(stats: &IndexStatistics, format: &OutputFormat) -> Result<()> {
    if *format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }

    println!("Index Statistics: {}", stats.index_path);
    match stats.index_size_bytes {
        Some(size) => println!("  File size: {size} bytes"),
        None => println!("  File size: (missing)"),
    }
    println!("  Documents: {}", stats.total_documents);
    println!("  Embedded: {}", stats.embedded_documents);
    println!("  Awaiting embedding: {}", stats.pending_documents);
    println!("  With content hash: {}", stats.hashed_documents);
    println!("  Text characters: {}", stats.total_text_chars);
    let dimensions: Vec<String> = stats
        .embedding_dimensions
        .iter()
        .map(ToString::to_string)
        .collect();
    println!(
        "  Embedding dimensions: {}{}",
        if dimensions.is_empty() {
            "none".to_string()
        } else {
            dimensions.join(", ")
        },
        if stats.dimensions_consistent() {
            ""
        } else {
            " (mixed models!)"
        }
    );
    if !stats.documents_by_extension.is_empty() {
        println!("  By extension:");
        for (extension, count) in &stats.documents_by_extension {
            println!("    {extension}: {count}");
        }
    }
    Ok(())
}
