use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use termlab::client::{LabClient, Terminal};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "termlab-client")]
#[command(about = "Terminal lab client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:4242")]
    server: String,

    /// Student identifier
    #[arg(short, long, default_value = "student")]
    user: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive terminal for a lab
    Connect {
        /// Lab id
        lab: String,
    },

    /// Run a single command in a lab and exit
    Exec {
        /// Lab id
        lab: String,

        /// Command line, quoted as one argument or spread over several
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// Submit a flag for a lab
    Submit {
        /// Lab id
        lab: String,

        /// Flag value
        flag: String,
    },

    /// List the labs offered by the server
    Labs,

    /// Test connection to server
    Test,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let client = LabClient::new(cli.server, cli.user);

    let result = match cli.command {
        Commands::Connect { lab } => connect_interactive(client, lab).await,
        Commands::Exec { lab, command } => execute_command(client, &lab, &command.join(" ")).await,
        Commands::Submit { lab, flag } => submit_flag(client, &lab, &flag).await,
        Commands::Labs => list_labs(client).await,
        Commands::Test => test_connection(client).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("termlab={},termlab_client={}", level, level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn connect_interactive(client: LabClient, lab: String) -> Result<()> {
    let mut terminal = Terminal::new(client, lab);
    terminal.run().await.context("Terminal session failed")?;
    Ok(())
}

async fn execute_command(mut client: LabClient, lab: &str, command: &str) -> Result<()> {
    client.connect().await?;
    client.start_lab(lab).await?;

    let outcome = client.execute(lab, command).await?;
    if outcome.is_error {
        eprintln!("{}", outcome.output);
    } else if !outcome.output.is_empty() {
        println!("{}", outcome.output);
    }

    for index in &outcome.objectives_completed {
        println!("Objective {} complete", index + 1);
    }
    if outcome.lab_completed {
        println!("Lab complete!");
    }

    client.disconnect().await?;

    if outcome.return_code != 0 {
        std::process::exit(outcome.return_code);
    }
    Ok(())
}

async fn submit_flag(mut client: LabClient, lab: &str, flag: &str) -> Result<()> {
    client.connect().await?;
    client.start_lab(lab).await?;

    let verdict = client.submit_flag(lab, flag).await?;
    println!("{}", verdict.message);
    if verdict.xp_awarded > 0 {
        println!("+{} XP", verdict.xp_awarded);
    }

    client.disconnect().await?;
    Ok(())
}

async fn list_labs(mut client: LabClient) -> Result<()> {
    let welcome = client.connect().await?;

    println!("Labs on this server:");
    for lab in &welcome.labs {
        println!("  {} - {} ({:?}, {} XP)", lab.id, lab.title, lab.difficulty, lab.xp_reward);
        for objective in &lab.objectives {
            println!("      - {}", objective);
        }
    }

    client.disconnect().await?;
    Ok(())
}

async fn test_connection(mut client: LabClient) -> Result<()> {
    info!("Testing connection to server...");

    let welcome = client.connect().await?;
    client.ping().await?;

    println!("✓ Connected to server version {}", welcome.server_version);
    println!("✓ {} lab(s) available", welcome.labs.len());

    client.disconnect().await?;
    Ok(())
}
