mod cli;
mod config;
mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cli::{discover::discover_cmd, list::list_cmd, ColorMode};
use tracing_subscriber::EnvFilter;

#[derive(Default, Clone, Copy, ValueEnum, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum RequestedColorMode {
    #[default]
    Auto,
    On,
    Off,
}

/// Log line formats
#[derive(Default, Clone, Copy, ValueEnum, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Parser)]
#[command(name = "apiscout")]
#[command(
    about = "Find and verify the API behind an LLM provider's website",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, global = true, default_value_t = RequestedColorMode::default())]
    color: RequestedColorMode,
    /// Read configuration from this file instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Format of diagnostic log lines on stderr (level set by RUST_LOG)
    #[arg(long, global = true, default_value_t = LogFormat::default())]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the API behind a website
    Discover(DiscoverArgs),
    /// List built-in data
    List(ListArgs),
    /// Print the registry slug derived from a domain
    Slug {
        /// Domain name, e.g. www.anthropic.com
        domain: String,
    },
}

/// Output formats
#[derive(ValueEnum, Default, Clone, Copy, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub(crate) enum ListingFormat {
    /// Format the output as a table
    #[default]
    Table,
    /// Format the output as JSON
    Json,
    /// Format the output as a table without a header
    HeaderlessTable,
}

#[derive(Parser)]
pub(crate) struct DiscoverArgs {
    /// Website of the provider, e.g. https://groq.com
    url: String,
    /// Output the result with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
    /// Bearer token sent with API probes (default: $APISCOUT_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
    /// Permit plain http:// URLs
    #[arg(long)]
    allow_http: bool,
}

/// Possible listings
#[derive(Subcommand, Clone, Copy)]
pub(crate) enum ListObject {
    /// Known providers
    Providers,
    /// Failure reasons a discovery can report
    Reasons,
}

#[derive(Parser)]
pub(crate) struct ListArgs {
    /// Output the listing with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
    /// List the specified object
    #[command(subcommand)]
    object: ListObject,
}

fn init_logging(format: LogFormat, color: ColorMode) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.with_ansi(color == ColorMode::On).init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let color = ColorMode::resolve_auto(cli.color);

    utils::errors::configure_color(color);

    init_logging(cli.log_format, color);

    match &cli.command {
        Commands::Discover(args) => {
            let config = match config::read_config(cli.config.clone()) {
                Ok(config) => config,
                Err(err) => die!("{}", err),
            };

            discover_cmd(&config, args).await
        }
        Commands::List(args) => list_cmd(args),
        Commands::Slug { domain } => println!("{}", apiscout::domain_to_slug(domain)),
    }
}
