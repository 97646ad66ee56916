//! Clausebook CLI
//!
//! The `clausebook` command runs the contract structuring pipeline.
//!
//! ## Commands
//!
//! - `extract`: Print the text of a PDF or DOCX contract
//! - `parse`: Structure one contract into a JSON document tree
//! - `cluster`: Group similar clauses across parsed contracts
//! - `kdist`: k-distance curve and suggested `eps` for clustering
//! - `playbook`: Generate a negotiation playbook from clusters
//! - `run`: All of the above, end to end

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clausebook_core::metrics::METRICS;
use clausebook_core::obs::PipelineSpan;
use clausebook_core::{
    render_playbook_md, render_playbook_xml, CachingEmbedder, CallPolicy, ClauseClusterer,
    ClausebookConfig, ClusterMap, Contract, EmbeddingProvider, EmbeddingService, FailurePolicy,
    HashingEmbedder, ParseStrategy, Playbook, PlaybookGenerator, PlaybookReport, RateLimiter,
    StructuredLlm, StructuredParser, TextExtractor,
};
use clausebook_extract::FileTextExtractor;
use clausebook_providers::{ChatCompletionsClient, HttpEmbedder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "clausebook")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Contract structuring and negotiation playbook synthesis", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file (environment variables still override it)
    #[arg(long, global = true, env = "CLAUSEBOOK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the extracted text of a contract file
    Extract {
        /// Contract file (.pdf or .docx)
        file: PathBuf,
    },

    /// Parse a contract into a structured document tree (JSON)
    Parse {
        /// Contract file (.pdf or .docx)
        file: PathBuf,

        /// Parsing strategy: single or multi (default from config)
        #[arg(short, long)]
        strategy: Option<ParseStrategy>,

        /// Output path for the contract JSON (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Cluster the clauses of parsed contracts
    Cluster {
        /// Contract JSON files produced by `parse`
        #[arg(required = true)]
        contracts: Vec<PathBuf>,

        #[command(flatten)]
        clustering: ClusteringArgs,

        /// Output path for the cluster map JSON (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the k-distance curve and a suggested eps
    Kdist {
        /// Contract JSON files produced by `parse`
        #[arg(required = true)]
        contracts: Vec<PathBuf>,

        /// Neighbour rank (default: clustering.min_samples)
        #[arg(short)]
        k: Option<usize>,

        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate a playbook from a cluster map
    Playbook {
        /// Cluster map JSON produced by `cluster`
        clusters: PathBuf,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Extract, parse, cluster and generate a playbook in one go
    Run {
        /// Contract files (.pdf or .docx)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Parsing strategy: single or multi (default from config)
        #[arg(short, long)]
        strategy: Option<ParseStrategy>,

        #[command(flatten)]
        clustering: ClusteringArgs,

        #[command(flatten)]
        export: ExportArgs,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
struct ClusteringArgs {
    /// Maximum cosine distance between neighbours
    #[arg(long)]
    eps: Option<f32>,

    /// Minimum neighbourhood size for a dense region
    #[arg(long)]
    min_samples: Option<usize>,
}

#[derive(clap::Args, Debug, Clone)]
struct ExportArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "xml")]
    format: ExportFormat,

    /// Output path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip clusters whose playbook section fails validation
    #[arg(long)]
    skip_failed: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Xml,
    Md,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    clausebook_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let _span = PipelineSpan::enter(&run_id);

    let result = match cli.command {
        Commands::Extract { file } => cmd_extract(&file),
        Commands::Parse {
            file,
            strategy,
            output,
        } => cmd_parse(&config, &file, strategy, output.as_deref()).await,
        Commands::Cluster {
            contracts,
            clustering,
            output,
        } => {
            let config = clustering.apply(config)?;
            cmd_cluster(&config, &contracts, output.as_deref()).await
        }
        Commands::Kdist {
            contracts,
            k,
            output,
        } => cmd_kdist(&config, &contracts, k, output.as_deref()).await,
        Commands::Playbook { clusters, export } => cmd_playbook(&config, &clusters, &export).await,
        Commands::Run {
            files,
            strategy,
            clustering,
            export,
        } => {
            let config = clustering.apply(config)?;
            cmd_run(&config, &files, strategy, &export).await
        }
    };

    METRICS.flush();
    result
}

fn load_config(path: Option<&Path>) -> Result<ClausebookConfig> {
    match path {
        Some(path) => ClausebookConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        None => ClausebookConfig::from_env().context("Invalid configuration"),
    }
}

impl ClusteringArgs {
    fn apply(&self, mut config: ClausebookConfig) -> Result<ClausebookConfig> {
        if let Some(eps) = self.eps {
            config.clustering.eps = eps;
        }
        if let Some(min_samples) = self.min_samples {
            config.clustering.min_samples = min_samples;
        }
        config.validate().context("Invalid clustering parameters")?;
        Ok(config)
    }
}

/// Clients shared by every command of one process.
struct Services {
    llm: Arc<dyn StructuredLlm>,
    policy: CallPolicy,
}

impl Services {
    /// All LLM calls go through one limiter, so parsing and playbook
    /// generation share the upstream request budget.
    fn new(config: &ClausebookConfig) -> Result<Self> {
        if config.llm.api_key.is_none() {
            bail!("No LLM API key configured. Set MISTRAL_API_KEY or llm.api_key in the config file.");
        }
        let llm: Arc<dyn StructuredLlm> = Arc::new(
            ChatCompletionsClient::from_settings(&config.llm)
                .context("Failed to create LLM client")?,
        );
        let limiter = RateLimiter::new(config.parser.requests_per_second, config.parser.burst)?;
        let policy = CallPolicy::new(config.llm.timeout())
            .with_retry(config.retry)
            .with_limiter(limiter);
        Ok(Services { llm, policy })
    }

    fn parser(&self) -> StructuredParser {
        StructuredParser::new(self.llm.clone(), self.policy.clone())
            .with_section_limiter(RateLimiter::unlimited())
    }

    fn generator(&self, config: &ClausebookConfig, skip_failed: bool) -> PlaybookGenerator {
        let mut settings = config.playbook;
        if skip_failed {
            settings.failure_policy = FailurePolicy::Skip;
        }
        PlaybookGenerator::new(
            self.llm.clone(),
            settings,
            self.policy.clone(),
            config.llm.output_language.clone(),
        )
    }
}

fn build_embedder(config: &ClausebookConfig) -> Result<Arc<dyn EmbeddingService>> {
    let embedder: Arc<dyn EmbeddingService> = match config.embedding.provider {
        EmbeddingProvider::Remote => {
            if config.embedding.api_key.is_none() {
                bail!(
                    "No embedding API key configured. Set MISTRAL_API_KEY or use embedding.provider = \"hashing\"."
                );
            }
            let client = HttpEmbedder::from_settings(&config.embedding)
                .context("Failed to create embedding client")?;
            Arc::new(CachingEmbedder::new(client))
        }
        EmbeddingProvider::Hashing => Arc::new(CachingEmbedder::new(HashingEmbedder::new(
            config.embedding.dimensions,
        ))),
    };
    Ok(embedder)
}

fn build_clusterer(config: &ClausebookConfig) -> Result<ClauseClusterer> {
    Ok(ClauseClusterer::from_config(build_embedder(config)?, config)?)
}

fn cmd_extract(file: &Path) -> Result<()> {
    let text = FileTextExtractor::new()
        .extract(file)
        .with_context(|| format!("Failed to extract text from {:?}", file))?;
    println!("{}", text);
    Ok(())
}

async fn parse_file(
    parser: &StructuredParser,
    file: &Path,
    strategy: ParseStrategy,
) -> Result<Contract> {
    let text = FileTextExtractor::new()
        .extract(file)
        .with_context(|| format!("Failed to extract text from {:?}", file))?;
    let contract = parser
        .parse(&text, strategy)
        .await
        .with_context(|| format!("Failed to parse {:?}", file))?;
    info!(
        file = %file.display(),
        contract_id = %contract.id,
        sections = contract.section_count(),
        clauses = contract.clause_count(),
        "contract parsed"
    );
    Ok(contract)
}

async fn cmd_parse(
    config: &ClausebookConfig,
    file: &Path,
    strategy: Option<ParseStrategy>,
    output: Option<&Path>,
) -> Result<()> {
    let services = Services::new(config)?;
    let strategy = strategy.unwrap_or(config.parser.strategy);
    let contract = parse_file(&services.parser(), file, strategy).await?;
    emit(output, &serde_json::to_string_pretty(&contract)?)
}

fn load_contracts(paths: &[PathBuf]) -> Result<Vec<Contract>> {
    paths
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse contract JSON {:?}", path))
        })
        .collect()
}

async fn cmd_cluster(
    config: &ClausebookConfig,
    paths: &[PathBuf],
    output: Option<&Path>,
) -> Result<()> {
    let contracts = load_contracts(paths)?;
    let clusters = build_clusterer(config)?.cluster(&contracts).await?;
    eprintln!(
        "{} clusters, {} noise clauses",
        clusters.cluster_count(),
        clusters.noise().len()
    );
    emit(output, &serde_json::to_string_pretty(&clusters)?)
}

async fn cmd_kdist(
    config: &ClausebookConfig,
    paths: &[PathBuf],
    k: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let contracts = load_contracts(paths)?;
    let k = k.unwrap_or(config.clustering.min_samples);
    let report = build_clusterer(config)?
        .k_distance_report(&contracts, k)
        .await?;

    if let Some(path) = output {
        return emit(Some(path), &serde_json::to_string_pretty(&report)?);
    }

    println!("k = {} ({} points)", report.k, report.distances.len());
    for (rank, distance) in report.distances.iter().enumerate() {
        println!("{:>5}  {:.4}", rank, distance);
    }
    match report.suggested_eps {
        Some(eps) => println!("suggested eps: {:.4}", eps),
        None => println!("suggested eps: none (curve has no clear elbow)"),
    }
    Ok(())
}

async fn cmd_playbook(config: &ClausebookConfig, path: &Path, export: &ExportArgs) -> Result<()> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let clusters: ClusterMap = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse cluster map {:?}", path))?;

    let services = Services::new(config)?;
    let report = services
        .generator(config, export.skip_failed)
        .generate_report(&clusters)
        .await?;
    finish_playbook(report, export)
}

async fn cmd_run(
    config: &ClausebookConfig,
    files: &[PathBuf],
    strategy: Option<ParseStrategy>,
    export: &ExportArgs,
) -> Result<()> {
    let services = Services::new(config)?;
    let parser = services.parser();
    let strategy = strategy.unwrap_or(config.parser.strategy);

    let mut contracts = Vec::with_capacity(files.len());
    for file in files {
        contracts.push(parse_file(&parser, file, strategy).await?);
    }

    let clusters = build_clusterer(config)?.cluster(&contracts).await?;
    if clusters.cluster_count() == 0 {
        warn!(
            noise = clusters.noise().len(),
            "no clause clusters found; the playbook will be empty"
        );
    }

    let report = services
        .generator(config, export.skip_failed)
        .generate_report(&clusters)
        .await?;
    finish_playbook(report, export)
}

fn finish_playbook(report: PlaybookReport, export: &ExportArgs) -> Result<()> {
    for skipped in &report.skipped {
        eprintln!(
            "skipped cluster {} ({} clauses): {}",
            skipped.cluster_id, skipped.clauses, skipped.reason
        );
    }
    let rendered = render(&report.playbook, export.format)?;
    emit(export.output.as_deref(), &rendered)
}

fn render(playbook: &Playbook, format: ExportFormat) -> Result<String> {
    Ok(match format {
        ExportFormat::Xml => render_playbook_xml(playbook),
        ExportFormat::Md => render_playbook_md(playbook),
        ExportFormat::Json => serde_json::to_string_pretty(playbook)?,
    })
}

/// Write to `output`, or print to stdout.
fn emit(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
            eprintln!("Wrote {:?}", path);
        }
        None => println!("{}", content),
    }
    Ok(())
}
