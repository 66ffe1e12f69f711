//! Anvil CLI - 플러그인 런타임 관리 도구

mod commands;

use anvil_foundation::{HostConfig, RuntimeConfig, SecurityLevel};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Anvil - component and plugin runtime administration
#[derive(Parser, Debug)]
#[command(name = "anvil")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Extra plugin search path, searched before the defaults (repeatable)
    #[arg(short = 'p', long = "plugin-dir", global = true)]
    plugin_dirs: Vec<PathBuf>,

    /// Override the security level (low, moderate, high, strict)
    #[arg(long, global = true)]
    level: Option<SecurityLevel>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered plugins with status and persisted state
    List,
    /// Scan the search paths and report newly found plugins
    Discover,
    /// Run the security gate against a plugin binary
    Validate {
        /// Path to the plugin binary
        path: PathBuf,
    },
    /// Print the SHA-256 of a plugin binary
    Hash {
        /// Path to the plugin binary
        path: PathBuf,
        /// Register the hash as trusted for this plugin name
        #[arg(long)]
        trust: Option<String>,
    },
    /// Show or edit per-plugin configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Load and activate a plugin, report its health, then unload it
    Load {
        /// Plugin name
        name: String,
        /// Keep the plugin running until Ctrl-C
        #[arg(short, long)]
        wait: bool,
    },
    /// Show plugin details (health, dependencies)
    Info {
        /// Plugin name
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the plugin's configuration document
    Show { name: String },
    /// Set a plugin setting (value parsed as JSON, falling back to a string)
    Set {
        name: String,
        key: String,
        value: String,
    },
    /// Mark the plugin enabled
    Enable { name: String },
    /// Mark the plugin disabled
    Disable { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut runtime = RuntimeConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load runtime config: {}", e);
        RuntimeConfig::default()
    });
    runtime.prepend_search_paths(args.plugin_dirs.clone());
    if let Some(level) = args.level {
        runtime.security_level = level;
    }
    tracing::debug!("Runtime config: {:?}", runtime);

    let ctx = commands::Context {
        host: Arc::new(HostConfig::default()),
        runtime,
    };

    match args.command {
        Command::List => commands::list(&ctx).await,
        Command::Discover => commands::discover(&ctx).await,
        Command::Validate { path } => commands::validate(&ctx, &path).await,
        Command::Hash { path, trust } => commands::hash(&ctx, &path, trust.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Show { name } => commands::config_show(&ctx, &name).await,
            ConfigAction::Set { name, key, value } => {
                commands::config_set(&ctx, &name, &key, &value).await
            }
            ConfigAction::Enable { name } => commands::config_enable(&ctx, &name, true).await,
            ConfigAction::Disable { name } => commands::config_enable(&ctx, &name, false).await,
        },
        Command::Load { name, wait } => commands::load(&ctx, &name, wait).await,
        Command::Info { name } => commands::info(&ctx, &name).await,
    }
}
