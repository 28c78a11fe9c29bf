//! Truth Gate entry point
//!
//! Validates text against a Canon storage directory and manages its claims.

use canon_core::{CanonApi, CanonConfig, ClaimId, ClaimStatus, CreateClaimParams, QueryFilter};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use truth_gate::cli::{parse_value, CatalogOutput, OutputFormat, Render, VerifyOutput};
use truth_gate::telemetry::GateMetricsRegistry;
use truth_gate::{GateInput, TruthGate, TruthGateConfig};

#[derive(Parser)]
#[command(name = "truth-gate")]
#[command(about = "Truth Gate - deterministic validation of text against the Canon")]
#[command(version)]
struct Cli {
    /// Canon storage directory
    #[arg(long, global = true, env = "CANON_STORAGE_DIR", default_value = ".canon")]
    canon: PathBuf,

    /// Canon config file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "CANON_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check text against the canon (exit code 1 on FAIL)
    Check {
        /// Text to check
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,

        /// File holding the text to check
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Scope folded into fact ids
        #[arg(long)]
        context: Option<String>,

        /// Report every violation kind
        #[arg(long)]
        comprehensive: bool,

        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },

    /// Create a claim
    Claim {
        #[arg(short, long)]
        subject: String,

        #[arg(short, long)]
        predicate: String,

        /// JSON value; anything that does not parse is stored as a string
        #[arg(short, long)]
        value: String,

        /// Id of the claim this one replaces
        #[arg(long)]
        supersedes: Option<String>,

        /// Create as CONDITIONAL instead of ACTIVE
        #[arg(long)]
        conditional: bool,
    },

    /// Query claims
    Query {
        #[arg(short, long)]
        subject: Option<String>,

        #[arg(short, long)]
        predicate: Option<String>,

        /// ACTIVE, SUPERSEDED or CONDITIONAL
        #[arg(long)]
        status: Option<String>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Verify chain, hashes and manifest
    Verify,

    /// Print the predicate catalog
    Catalog,
}

fn open_canon(cli: &Cli) -> anyhow::Result<Arc<CanonApi>> {
    let config = match &cli.config {
        Some(path) => CanonConfig::from_file(path)?,
        None => CanonConfig::new(&cli.canon),
    }
    .apply_env_overrides()?;

    let api = CanonApi::new(config);
    api.init()?;
    Ok(Arc::new(api))
}

fn read_input(text: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
        (None, None) => {
            let mut buffer = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)?;
            Ok(buffer)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let api = open_canon(&cli)?;
    let format = cli.output;

    match cli.command {
        Commands::Check {
            text,
            file,
            context,
            comprehensive,
            metrics,
        } => {
            let mut input = GateInput::new(read_input(text, file)?);
            if let Some(context) = context {
                input = input.with_context(context);
            }

            let registry = GateMetricsRegistry::new()?;
            let config = TruthGateConfig::for_canon(Arc::clone(&api)).with_comprehensive(comprehensive);
            let gate = TruthGate::new(config).with_metrics(registry.gate());
            let output = gate.execute(&input).await?;

            println!("{}", output.render(format)?);
            if metrics {
                println!("{}", registry.encode_text()?);
            }
            api.close()?;

            if output.is_fail() {
                std::process::exit(1);
            }
        }

        Commands::Claim {
            subject,
            predicate,
            value,
            supersedes,
            conditional,
        } => {
            let mut params = CreateClaimParams::new(subject, predicate, parse_value(&value));
            if let Some(id) = supersedes {
                params = params.with_supersedes(&ClaimId::new(id)?);
            }
            if conditional {
                params = params.with_status(ClaimStatus::Conditional);
            }

            let result = api.create_claim(params);
            api.close()?;
            let claim = result?;
            println!("{}", vec![claim].render(format)?);
        }

        Commands::Query {
            subject,
            predicate,
            status,
            limit,
        } => {
            let mut filter = QueryFilter::new();
            if let Some(subject) = subject {
                filter = filter.subject(subject);
            }
            if let Some(predicate) = predicate {
                filter = filter.predicate(predicate);
            }
            if let Some(status) = status {
                let status: ClaimStatus = serde_json::from_value(serde_json::Value::String(status.to_uppercase()))?;
                filter = filter.status(status);
            }
            if let Some(limit) = limit {
                filter = filter.limit(limit);
            }

            let result = api.query(&filter)?;
            api.close()?;
            println!("{}", result.claims.render(format)?);
        }

        Commands::Verify => {
            let output = VerifyOutput {
                integrity: api.verify_integrity()?,
                stats: api.get_stats(),
            };
            api.close()?;
            println!("{}", output.render(format)?);

            if !output.integrity.valid {
                std::process::exit(1);
            }
        }

        Commands::Catalog => {
            let catalog = api.catalog();
            let output = CatalogOutput {
                version: catalog.catalog_version(),
                predicates: catalog.list_predicates(),
            };
            api.close()?;
            println!("{}", output.render(format)?);
        }
    }

    Ok(())
}
