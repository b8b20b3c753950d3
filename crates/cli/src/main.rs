use std::path::PathBuf;

use {
    anyhow::{Context, bail},
    archiver_config::{ArchiverConfig, Severity},
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "git-archiver",
    version,
    about = "Clone git repositories in throwaway containers and serve them as archives"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (skips discovery in ./ and ~/.config/git-archiver/).
    #[arg(long, global = true, env = "GIT_ARCHIVER_CONFIG")]
    config: Option<PathBuf>,
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default when no subcommand is provided).
    Serve,
    /// Validate the effective configuration and print it.
    CheckConfig,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Effective config: file (explicit or discovered), then `GIT_ARCHIVER_*`
/// environment overrides, then command-line flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<ArchiverConfig> {
    let mut config = match cli.config {
        Some(ref path) => archiver_config::load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => archiver_config::discover_and_load(),
    };
    archiver_config::apply_env_overrides(&mut config);

    if let Some(ref bind) = cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

/// Log every diagnostic and fail if any is an error.
fn check(config: &ArchiverConfig) -> anyhow::Result<()> {
    let result = archiver_config::validate(config);
    for diagnostic in &result.diagnostics {
        match diagnostic.severity {
            Severity::Error => tracing::error!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
        }
    }
    if result.has_errors() {
        bail!("configuration is invalid");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "git-archiver starting");

    let config = resolve_config(&cli)?;
    check(&config)?;

    match cli.command {
        None | Some(Commands::Serve) => archiver_gateway::start_gateway(config).await,
        Some(Commands::CheckConfig) => {
            // Secrets are redacted by the schema's serializer.
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        },
    }
}
