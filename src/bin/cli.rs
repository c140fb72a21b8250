//! chatsweep CLI
//!
//! Command-line interface for checking configuration and running the
//! stuck-conversation recovery workflow.

use chatsweep::backend::{RecordGateway, RestBackend};
use chatsweep::config::LogConfig;
use chatsweep::gateway::GatewayClient;
use chatsweep::workflow::RecoveryWorkflow;
use chatsweep::{Config, Result, VERSION};
use clap::{Parser, Subcommand};
use console::style;
use std::io::{self, Write};
use std::path::Path;

#[derive(Parser)]
#[command(
    name = "chatsweep",
    author = "chatsweep contributors",
    version = VERSION,
    about = "Recover stuck live-chat conversations",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a .env file from the bundled template (run this first)
    Init {
        /// Force overwrite an existing .env file
        #[arg(long, short)]
        force: bool,
    },

    /// Verify configuration, backend login and a gateway round trip
    Check,

    /// List stuck conversations without touching them
    List,

    /// Recover stuck conversations
    Run {
        /// Recover at most this many conversations
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_logging(&config.log);

    let result = match cli.command {
        Commands::Init { force } => init_env(force),
        Commands::Check => check(&config).await,
        Commands::List => list(&config).await,
        Commands::Run { limit } => run(&config, limit).await,
    };

    if let Err(e) = result {
        if e.is_protocol_error() {
            eprintln!(
                "\n{} chat gateway protocol failure: {}",
                style("✗").red().bold(),
                e
            );
            eprintln!("   The gateway session is gone; re-run to start a fresh one.");
        } else {
            eprintln!("\n{} {}", style("✗").red().bold(), e);
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize logging from config
fn init_logging(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&log.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if log.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

// ============================================================================
// Init Command
// ============================================================================

/// Write the bundled .env template into the current directory
fn init_env(force: bool) -> Result<()> {
    let env_path = Path::new(".env");

    if env_path.exists() && !force {
        println!(
            "{} .env already exists. Use --force to overwrite.",
            style("!").yellow()
        );
        return Ok(());
    }

    let template = include_str!("../../.env.example");
    std::fs::write(env_path, template)?;

    println!("{} Created .env", style("✓").green());
    println!("   Fill in the gateway and backend credentials, then run: chatsweep check");
    Ok(())
}

// ============================================================================
// Check Command
// ============================================================================

/// Verify configuration and both sides of the integration
async fn check(config: &Config) -> Result<()> {
    config.validate()?;
    println!("{} Configuration loaded", style("✓").green());
    println!("   └─ Gateway: {}", style(&config.gateway.host).cyan());
    println!("   └─ Backend: {}", style(&config.backend.host).cyan());

    print!("   Backend token login... ");
    io::stdout().flush()?;
    let backend = RestBackend::new(config.backend.clone())?;
    match backend.session_id().await {
        Ok(_) => println!("{}", style("✓ Connected").green()),
        Err(e) => {
            println!("{} {}", style("✗").red(), e);
            return Err(e);
        }
    }

    print!("   Gateway session round trip... ");
    io::stdout().flush()?;
    let mut client = GatewayClient::new(config.gateway.clone())?;
    match gateway_round_trip(&mut client).await {
        Ok(_) => println!("{}", style("✓ OK").green()),
        Err(e) => {
            println!("{} {}", style("✗").red(), e);
            return Err(e);
        }
    }

    println!("\n{} All checks passed", style("✓").green().bold());
    Ok(())
}

/// Open and immediately tear down a gateway session
async fn gateway_round_trip(client: &mut GatewayClient) -> Result<()> {
    client.login().await?;
    client.delete_session().await
}

// ============================================================================
// List and Run Commands
// ============================================================================

/// Print the stuck conversations the run command would recover
async fn list(config: &Config) -> Result<()> {
    config.validate()?;
    let backend = RestBackend::new(config.backend.clone())?;
    let workflow = RecoveryWorkflow::new(config, backend)?;

    let stuck = workflow.list_stuck().await?;
    if stuck.is_empty() {
        println!("{} No stuck conversations.", style("✓").green());
        return Ok(());
    }

    println!("{} stuck conversation(s):", style(stuck.len()).bold());
    for record in &stuck {
        println!("   {}", record["Id"].as_str().unwrap_or("<missing id>"));
    }
    Ok(())
}

/// Execute the recovery workflow
async fn run(config: &Config, limit: Option<usize>) -> Result<()> {
    config.validate()?;
    let backend = RestBackend::new(config.backend.clone())?;
    let mut workflow = RecoveryWorkflow::new(config, backend)?;

    let summary = workflow.run(limit).await?;

    println!(
        "\n{} Recovered {}/{} conversation(s)",
        style("✓").green().bold(),
        summary.recovered,
        summary.found
    );
    if summary.recovered < summary.found {
        println!("   Re-run to pick up the remaining conversations.");
    }
    Ok(())
}
