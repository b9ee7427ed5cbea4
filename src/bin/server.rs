use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use termlab::config::{Config, LabCatalog};
use termlab::server::LabServer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "termlab-server")]
#[command(about = "Terminal lab server: simulated shells for hands-on security labs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the lab server
    Start {
        /// Override server host
        #[arg(long)]
        host: Option<String>,

        /// Override server port
        #[arg(long)]
        port: Option<u16>,

        /// Override the lab definitions directory
        #[arg(long)]
        labs: Option<PathBuf>,
    },

    /// Inspect lab definitions
    #[command(subcommand)]
    Labs(LabCommands),

    /// Generate default configuration file
    Config {
        /// Output path for config file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file and lab definitions
    Validate,
}

#[derive(Subcommand)]
enum LabCommands {
    /// List the labs the server would serve
    List,

    /// Show one lab, including its answers
    Show {
        /// Lab id
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config_path = cli
        .config
        .unwrap_or_else(|| Config::get_default_config_path().unwrap_or_else(|_| PathBuf::from("termlab.toml")));

    let result = match cli.command {
        Commands::Start { host, port, labs } => start_server(&config_path, host, port, labs).await,
        Commands::Labs(command) => handle_lab_command(&config_path, command),
        Commands::Config { output, force } => generate_config(&output.unwrap_or(config_path), force),
        Commands::Validate => validate_config(&config_path),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("termlab={},termlab_server={}", level, level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        Config::load_from_file(config_path)
            .with_context(|| format!("Failed to load configuration from {}", config_path.display()))
    } else {
        warn!("Configuration file not found at {:?}, using defaults", config_path);
        Ok(Config::default())
    }
}

fn load_catalog(config: &Config) -> Result<LabCatalog> {
    LabCatalog::load_or_builtin(config.labs_dir.as_deref()).context("Failed to load lab definitions")
}

async fn start_server(
    config_path: &Path,
    host_override: Option<String>,
    port_override: Option<u16>,
    labs_override: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(host) = host_override {
        config.server.host = host;
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }
    if labs_override.is_some() {
        config.labs_dir = labs_override;
    }

    config.validate().context("Configuration validation failed")?;
    let catalog = load_catalog(&config)?;
    info!(labs = catalog.len(), "Lab catalog ready");

    let mut server = LabServer::new(config, catalog)?;
    info!("Starting terminal lab server on {}", server.config().bind_address());

    tokio::select! {
        result = server.start() => {
            match result {
                Ok(_) => info!("Terminal lab server stopped normally"),
                Err(e) => error!("Terminal lab server error: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    server.stop().await?;
    Ok(())
}

fn handle_lab_command(config_path: &Path, command: LabCommands) -> Result<()> {
    let config = load_config(config_path)?;
    let catalog = load_catalog(&config)?;

    match command {
        LabCommands::List => {
            println!("Labs:");
            for id in catalog.ids() {
                let lab = catalog.get(id)?;
                println!(
                    "  {} - {} ({:?}, {} XP, {} objectives)",
                    lab.id,
                    lab.title,
                    lab.difficulty,
                    lab.xp_reward,
                    lab.objectives.len()
                );
            }
        }
        LabCommands::Show { id } => {
            let lab = catalog.get(&id)?;
            println!("Lab: {}", lab.title);
            println!("  Id: {}", lab.id);
            println!("  Difficulty: {:?}", lab.difficulty);
            println!("  XP: {} ({}% penalty after viewing the solution)", lab.xp_reward, lab.xp_penalty_for_solution);
            if let Some(minutes) = lab.time_limit {
                println!("  Time limit: {} minutes", minutes);
            }
            if !lab.allowed_commands.is_empty() {
                let allowed: Vec<&str> = lab.allowed_commands.iter().map(String::as_str).collect();
                println!("  Allowed commands: {}", allowed.join(", "));
            }
            println!("  Objectives:");
            for (index, objective) in lab.objectives.iter().enumerate() {
                println!("    {}. {} [{:?}]", index + 1, objective.description, objective.kind);
            }
            println!("  Hints: {}", lab.hints.len());
            println!("  Flags: {}", lab.flags.join(", "));
        }
    }

    Ok(())
}

fn generate_config(output_path: &Path, force: bool) -> Result<()> {
    if output_path.exists() && !force {
        bail!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output_path
        );
    }

    Config::default().save_to_file(output_path)?;

    println!("Default configuration file generated at {:?}", output_path);
    println!("Set labs_dir to a directory of lab definitions and then start the server.");

    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    let config = Config::load_from_file(config_path)?;
    config.validate()?;

    println!("✓ Configuration is valid");
    println!("Server settings:");
    println!("  Address: {}", config.bind_address());
    println!("  Max connections: {}", config.server.max_connections);
    println!("  Idle simulator eviction: {} minutes", config.server.session_idle_minutes);

    println!("Terminal settings:");
    println!("  Whitelisted commands: {}", config.terminal.whitelist.len());
    println!("  Blocked patterns: {}", config.terminal.blocked_patterns.len());
    println!("  Commands per minute: {}", config.terminal.commands_per_minute);

    let catalog = load_catalog(&config)?;
    println!("Labs: {}", catalog.len());
    for id in catalog.ids() {
        println!("  ✓ {}", id);
    }

    Ok(())
}
