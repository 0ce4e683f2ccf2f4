mod commands;
mod serve;
mod tiers;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Two-tier record store: hot primary tier, cold archive tier.
#[derive(Parser)]
#[command(
    name = "tierstore",
    version,
    about = "Two-tier record store with age-based archival"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one migration cycle, moving aged records to the archive tier
    Migrate {
        /// Archive records strictly older than this RFC 3339 instant
        /// (default: now minus the configured retention)
        #[arg(long, value_parser = parse_rfc3339)]
        cutoff: Option<OffsetDateTime>,
    },

    /// Look up a record in whichever tier holds it
    Get {
        /// Record id
        id: String,
    },

    /// Insert or replace a record in the primary tier
    Put {
        /// Record id
        id: String,
        /// Record payload as a JSON document
        #[arg(long)]
        payload: String,
        /// Record timestamp in RFC 3339 (default: now)
        #[arg(long, value_parser = parse_rfc3339)]
        timestamp: Option<OffsetDateTime>,
    },

    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },
}

fn parse_rfc3339(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

fn init_logging(level: &str, quiet: bool) {
    let fallback = if quiet { "error" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let Cli {
        output,
        quiet,
        config,
        log_level,
        command,
    } = Cli::parse();
    init_logging(&log_level, quiet);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {e}"), output, quiet);
            process::exit(1);
        }
    };

    let config = config.as_deref();
    let result = runtime.block_on(async move {
        match command {
            Commands::Migrate { cutoff } => {
                commands::migrate::cmd_migrate(config, cutoff, output, quiet).await
            }
            Commands::Get { id } => commands::get::cmd_get(config, &id, output).await,
            Commands::Put {
                id,
                payload,
                timestamp,
            } => commands::put::cmd_put(config, &id, &payload, timestamp, output, quiet).await,
            Commands::Serve { port } => serve::start_server(config, port).await,
        }
    });

    if let Err(e) = result {
        report_error(&e.to_string(), output, quiet);
        process::exit(1);
    }
}

/// Report an error to stderr in the requested format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}

/// Print a serializable value as pretty JSON on stdout.
pub(crate) fn print_json(value: &impl serde::Serialize) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
