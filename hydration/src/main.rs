use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use grants_hydration::config::{LoggingConfig, PortalConfig};
use grants_hydration::{HydrationOrchestrator, ProfileRequest};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "grants-hydration")]
#[command(about = "Grants applicant portal profile hydration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "/etc/grants/hydration.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information
    Version,
    /// Validate configuration
    Validate,
    /// List registered plugins
    Plugins,
    /// List plugin features grouped by provider
    Features,
    /// Return cached profile data, populating it on a miss
    Retrieve(ProfileArgs),
    /// Populate profile data and overwrite the cache entry
    Hydrate(ProfileArgs),
}

#[derive(Args)]
struct ProfileArgs {
    #[arg(long)]
    profile_id: Uuid,

    #[arg(long)]
    plugin: String,

    #[arg(long)]
    provider: String,

    #[arg(long)]
    key: String,

    /// Additional data forwarded to the plugin, as key=value
    #[arg(long = "data", value_parser = parse_key_val)]
    data: Vec<(String, serde_json::Value)>,
}

impl ProfileArgs {
    fn to_request(&self) -> ProfileRequest {
        let request = ProfileRequest::new(self.profile_id, &self.plugin, &self.provider, &self.key);
        if self.data.is_empty() {
            request
        } else {
            request.with_additional_data(self.data.iter().cloned().collect::<BTreeMap<_, _>>())
        }
    }
}

/// `key=value`; the value is taken as JSON when it parses, otherwise as a string.
fn parse_key_val(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value pair: {}", s))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_logging(logging: &LoggingConfig, debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if debug { "debug" } else { logging.level.as_str() };
        EnvFilter::new(format!("grants_hydration={}", level))
    });

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<(PortalConfig, bool)> {
    if path.exists() {
        Ok((PortalConfig::load(path)?, true))
    } else {
        Ok((PortalConfig::default_config(), false))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("grants-hydration {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if let Commands::Validate = cli.command {
        let cfg = PortalConfig::load(&cli.config)?;
        println!("Configuration valid: {:?}", cli.config);
        println!("{:#?}", cfg);
        return Ok(());
    }

    let (cfg, from_file) = load_config(&cli.config)?;
    init_logging(&cfg.logging, cli.debug);
    if from_file {
        info!("Configuration loaded from {:?}", cli.config);
    } else {
        warn!("Configuration file {:?} not found, using defaults", cli.config);
    }

    let orchestrator = HydrationOrchestrator::from_config(&cfg).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling");
            on_signal.cancel();
        }
    });

    match &cli.command {
        Commands::Plugins => {
            let plugins = orchestrator.list_plugins();
            println!("{}", serde_json::to_string_pretty(&plugins)?);
        }
        Commands::Features => {
            let features = orchestrator.list_plugin_features();
            println!("{}", serde_json::to_string_pretty(&features)?);
        }
        Commands::Retrieve(args) => {
            let data = orchestrator
                .retrieve_profile(&args.to_request(), &cancel)
                .await
                .context("Retrieve failed")?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Commands::Hydrate(args) => {
            let data = orchestrator
                .hydrate_profile(&args.to_request(), &cancel)
                .await
                .context("Hydrate failed")?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Commands::Version | Commands::Validate => {}
    }

    Ok(())
}
