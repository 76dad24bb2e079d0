//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use pagekit_cache::AssetCache;
use pagekit_core::{EnrichmentContext, EnrichmentProgress, EnrichmentReport, Enricher};
use pagekit_shared::{
    AppConfig, CacheSettings, ContentTree, RunLimits, init_config, load_config,
    validate_credentials,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pagekit: fill landing-page image slots from stock photos, cache, or generation.
#[derive(Parser)]
#[command(
    name = "pagekit",
    version,
    about = "Fill the image slots of landing-page content from stock providers, a local cache, or generation.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fill missing images in a content tree (JSON).
    Enrich {
        /// Content tree file.
        tree: PathBuf,

        /// Subject domain label, e.g. "bakery".
        #[arg(short, long)]
        domain: String,

        /// Subject (business) name.
        #[arg(short, long)]
        name: Option<String>,

        /// Write the enriched tree here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Skip generative fallback.
        #[arg(long)]
        no_generate: bool,

        /// Hot-link stock URLs instead of downloading them into the cache.
        #[arg(long)]
        no_download: bool,

        /// Print the run report as JSON on stderr.
        #[arg(long)]
        report: bool,
    },

    /// Asset cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Show entry count, size, and age range.
    Stats,
    /// Delete every cached asset.
    Clear,
    /// Delete entries older than the configured maximum age.
    Sweep,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pagekit=info",
        1 => "pagekit=debug",
        _ => "pagekit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so the enriched tree can be piped from stdout.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Enrich {
            tree,
            domain,
            name,
            out,
            no_generate,
            no_download,
            report,
        } => {
            let options = EnrichOptions {
                domain,
                name: name.unwrap_or_default(),
                out,
                no_generate,
                no_download,
                report,
            };
            cmd_enrich(&tree, options).await
        }
        Command::Cache { action } => match action {
            CacheAction::Stats => cmd_cache_stats().await,
            CacheAction::Clear => cmd_cache_clear().await,
            CacheAction::Sweep => cmd_cache_sweep().await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Enrich
// ---------------------------------------------------------------------------

struct EnrichOptions {
    domain: String,
    name: String,
    out: Option<PathBuf>,
    no_generate: bool,
    no_download: bool,
    report: bool,
}

async fn cmd_enrich(tree_path: &Path, options: EnrichOptions) -> Result<()> {
    // Credentials are checked before anything touches the network.
    let mut config = load_config()?;
    if options.no_generate {
        config.generation.enabled = false;
    }
    validate_credentials(&config)?;

    let raw = tokio::fs::read_to_string(tree_path)
        .await
        .wrap_err_with(|| format!("cannot read content tree '{}'", tree_path.display()))?;
    let mut tree = ContentTree::from_json(&raw)
        .wrap_err_with(|| format!("'{}' is not a valid content tree", tree_path.display()))?;

    let cache = Arc::new(open_cache(&config).await?);
    let enricher = Enricher::from_config(&config, cache)?;

    let mut limits = RunLimits::from(&config);
    if options.no_download {
        limits.download_assets = false;
    }
    let ctx = EnrichmentContext::new(options.domain, options.name).with_limits(limits);

    info!(
        tree = %tree_path.display(),
        domain = %ctx.domain,
        missing = tree.missing_slot_count(),
        "enriching content tree"
    );

    let progress = CliProgress::new();
    let report = enricher
        .enrich_with_progress(&mut tree, &ctx, &progress)
        .await;
    progress.finish();

    let json = tree.to_json_pretty()?;
    match &options.out {
        Some(path) => {
            tokio::fs::write(path, format!("{json}\n"))
                .await
                .wrap_err_with(|| format!("cannot write '{}'", path.display()))?;
        }
        None => println!("{json}"),
    }

    if options.report {
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, options.out.as_deref());
    }

    Ok(())
}

fn print_summary(report: &EnrichmentReport, out: Option<&Path>) {
    eprintln!();
    eprintln!("  Enrichment complete");
    eprintln!("  Run:         {}", report.run_id);
    eprintln!("  Stock:       {}", report.stock_count());
    eprintln!("  Generated:   {}", report.generative_count());
    eprintln!("  Placeholder: {}", report.placeholder_count());
    eprintln!("  Calls:       {}", report.external_calls);
    if report.timed_out {
        eprintln!("  Deadline:    reached (unresolved slots got placeholders)");
    }
    if let Some(path) = out {
        eprintln!("  Output:      {}", path.display());
    }
    eprintln!("  Time:        {:.1}s", report.elapsed.as_secs_f64());
    eprintln!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl EnrichmentProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn task_progress(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("Resolving [{current}/{total}] {detail}"));
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

async fn open_cache(config: &AppConfig) -> Result<AssetCache> {
    let settings = CacheSettings::try_from(config)?;
    Ok(AssetCache::open(settings).await?)
}

async fn cmd_cache_stats() -> Result<()> {
    let config = load_config()?;
    let cache = open_cache(&config).await?;
    let stats = cache.stats().await;

    println!();
    println!("  Directory:    {}", cache.dir().display());
    println!("  Entries:      {}", stats.entry_count);
    println!(
        "  Size:         {} / {} bytes",
        stats.total_size_bytes, config.cache.capacity_bytes
    );
    println!("  Oldest:       {}", fmt_time(stats.oldest_created_at));
    println!("  Newest:       {}", fmt_time(stats.newest_created_at));
    println!("  Last cleanup: {}", fmt_time(stats.last_cleanup_at));
    println!();
    Ok(())
}

fn fmt_time<T: std::fmt::Display>(t: Option<T>) -> String {
    t.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
}

async fn cmd_cache_clear() -> Result<()> {
    let config = load_config()?;
    let cache = open_cache(&config).await?;
    cache.clear().await?;
    println!("Cache cleared: {}", cache.dir().display());
    Ok(())
}

async fn cmd_cache_sweep() -> Result<()> {
    let config = load_config()?;
    let cache = open_cache(&config).await?;
    let removed = cache.sweep_expired().await?;
    println!("Removed {removed} expired entries");
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_enrich_flags() {
        let cli = Cli::try_parse_from([
            "pagekit",
            "-vv",
            "enrich",
            "page.json",
            "--domain",
            "bakery",
            "--name",
            "Sweet Crumbs",
            "-o",
            "out.json",
            "--no-generate",
            "--report",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Enrich {
                tree,
                domain,
                name,
                out,
                no_generate,
                no_download,
                report,
            } => {
                assert_eq!(tree, PathBuf::from("page.json"));
                assert_eq!(domain, "bakery");
                assert_eq!(name.as_deref(), Some("Sweet Crumbs"));
                assert_eq!(out, Some(PathBuf::from("out.json")));
                assert!(no_generate && report && !no_download);
            }
            _ => panic!("expected enrich"),
        }
    }

    #[test]
    fn enrich_requires_domain() {
        assert!(Cli::try_parse_from(["pagekit", "enrich", "page.json"]).is_err());
    }

    #[test]
    fn parses_cache_subcommands() {
        let cli = Cli::try_parse_from(["pagekit", "--log-format", "json", "cache", "sweep"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheAction::Sweep
            }
        ));
    }
}
