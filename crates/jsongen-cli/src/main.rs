//! jsongen CLI - generate random JSON documents from JSON Schemas

mod http;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use jsongen_core::{Cache, Config, DirCache, SchemaCatalog};

use http::HttpCache;

#[derive(Parser)]
#[command(name = "jsongen")]
#[command(about = "Generate random JSON documents from JSON Schemas")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: .jsongen.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate documents for a named schema (or a random one)
    Generate {
        /// Schema name; omit to pick one at random per document
        name: Option<String>,

        /// How many documents to emit
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Seed for reproducible output (overrides the config)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Pretty-print each document
        #[arg(long)]
        pretty: bool,
    },

    /// List the schema names in the catalog
    Schemas,

    /// Initialize config file
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(std::path::Path::new(path))?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::Generate {
            name,
            count,
            seed,
            pretty,
        } => {
            let mut catalog = build_catalog(&config, seed)?;
            for _ in 0..count {
                let serialized = catalog.generate(name.as_deref())?;
                if pretty {
                    let parsed: serde_json::Value = serde_json::from_str(&serialized)
                        .context("generated document is not valid JSON")?;
                    println!("{}", serde_json::to_string_pretty(&parsed)?);
                } else {
                    println!("{serialized}");
                }
            }
            Ok(())
        }

        Commands::Schemas => {
            let catalog = build_catalog(&config, None)?;
            for name in catalog.names() {
                println!("{name}");
            }
            Ok(())
        }

        Commands::Init => {
            let path = std::path::Path::new(".jsongen.toml");
            if path.exists() {
                bail!(".jsongen.toml already exists");
            }
            std::fs::write(path, Config::example()).context("cannot write .jsongen.toml")?;
            eprintln!("Wrote .jsongen.toml");
            Ok(())
        }
    }
}

fn build_catalog(config: &Config, seed_override: Option<u64>) -> Result<SchemaCatalog> {
    if config.urls.is_empty() {
        bail!("no schema urls configured; run `jsongen init` and edit .jsongen.toml");
    }

    let cache: Arc<dyn Cache> = match &config.schema_dir {
        Some(dir) => Arc::new(DirCache::new(dir)),
        None => Arc::new(HttpCache::new().map_err(|e| anyhow::anyhow!(e))?),
    };

    let mut catalog = SchemaCatalog::new(config.urls.iter().cloned()).with_cache(cache);
    if let Some(seed) = seed_override.or(config.seed) {
        catalog = catalog.with_seed(seed);
    }
    if !config.formats.is_empty() {
        catalog = catalog.with_formats(config.formats.clone())?;
    }
    Ok(catalog)
}
