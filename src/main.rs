use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use rtender::config::load_config_file;
use rtender::dictionary::LabelDictionary;
use rtender::harness::{HarnessOptions, run_harness};
use rtender::pipeline::{
    CrawlOptions, ExtractOptions, ValidateOptions, crawl, effective_dictionary, extract_document,
    validate_configs,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rtender",
    about = "Procurement portal crawler with label-driven field extraction"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk the results view and write one record per notice.
    Crawl {
        #[arg(long)]
        max_pages: Option<usize>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Extract a single detail document.
    Extract {
        #[arg(long, conflicts_with = "file")]
        url: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        base_url: Option<String>,
    },
    Validate {
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },
    /// Print the effective label dictionary.
    Labels,
    /// Crawl a file-mode site twice and compare the output.
    Harness,
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl { max_pages, dry_run } => {
            let Some(config_path) = cli.config else {
                bail!("crawl needs --config");
            };
            let summary = crawl(&CrawlOptions {
                config_path,
                max_pages,
                dry_run,
            })?;

            info!(
                portal = %summary.portal,
                pages = summary.report.pages_visited,
                emitted = summary.report.emitted,
                duplicates = summary.report.duplicates,
                failed = summary.report.failed,
                "crawl summary"
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Extract {
            url,
            file,
            base_url,
        } => {
            let record = extract_document(&ExtractOptions {
                config_path: cli.config,
                url,
                file,
                base_url,
            })?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Validate { config_dir } => {
            let messages = validate_configs(&ValidateOptions {
                config_dir,
                config_file: cli.config,
            })?;
            for line in messages {
                println!("{line}");
            }
        }
        Commands::Labels => {
            let dictionary = match &cli.config {
                Some(path) => effective_dictionary(&load_config_file(path)?.config)?,
                None => LabelDictionary::builtin(),
            };
            println!("{}", serde_json::to_string_pretty(&dictionary)?);
        }
        Commands::Harness => {
            let Some(config_path) = cli.config else {
                bail!("harness needs --config");
            };
            let report = run_harness(&HarnessOptions { config_path })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
