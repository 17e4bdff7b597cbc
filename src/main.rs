//! nobbler - route knob events to actions and views

use anyhow::Result;
use clap::Parser;
use colored::*;
use nobbler::cli::Repl;
use nobbler::config::{AppConfig, InterfaceKind, TriggerConfig};
use nobbler::drivers::{ConnectorRegistry, ConsoleConnector};
use nobbler::paths::AppPaths;
use nobbler::App;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// nobbler - map knob rotation and presses to actions, and focused windows to views
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "NOBBLER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Run without the interactive console
    #[arg(long)]
    no_repl: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    let config_path = args.config.clone().unwrap_or_else(|| AppPaths::detect().config);
    info!("Configuration file: {}", config_path.display());

    let config = AppConfig::load(&config_path).await?;

    if args.check {
        print_summary(&config);
        return Ok(());
    }

    let console = Arc::new(ConsoleConnector::new());
    let mut registry = ConnectorRegistry::new();
    registry.register(InterfaceKind::Console, console.clone());

    let app = App::start(Arc::new(config), &registry).await?;

    if args.no_repl {
        shutdown_signal().await;
    } else {
        let repl = Repl::new(app.router().clone(), console);
        let (done_tx, done_rx) = oneshot::channel();

        // rustyline blocks; a plain thread never holds up runtime shutdown
        std::thread::spawn(move || {
            if let Err(e) = repl.run() {
                warn!("REPL error: {}", e);
            }
            let _ = done_tx.send(());
        });

        tokio::select! {
            _ = shutdown_signal() => {}
            _ = done_rx => {}
        }
    }

    app.shutdown().await;
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_summary(config: &AppConfig) {
    println!("\n{}", "=== Configuration OK ===".bold().green());

    println!("\n{}", "Knob interfaces:".bold());
    for (index, interface) in config.knobs.interfaces.iter().enumerate() {
        println!("  {} ({})", interface.knob_id(index).cyan(), interface.kind);
    }

    println!("\n{}", "Actions:".bold());
    for action in &config.actions {
        let source = match &action.get_command {
            Some(cmd) => format!(" ← {} ({:?})", cmd, action.get_mode),
            None => String::new(),
        };
        println!("  {} [{} steps]{}", action.name.cyan(), action.steps.len(), source);
    }

    println!("\n{}", "Views:".bold());
    for view in &config.views {
        println!(
            "  {} \"{}\" [{}..{}] rotate → {} / press → {}",
            view.name.cyan(),
            view.config.text,
            view.config.min_position,
            view.config.max_position,
            view.knob_action.as_deref().unwrap_or("-"),
            view.press_action.as_deref().unwrap_or("-"),
        );
    }

    let mappings: usize = config
        .triggers
        .iter()
        .map(|t| match t {
            TriggerConfig::ActiveWindow { mappings } => mappings.len(),
        })
        .sum();
    println!(
        "\n{} {} trigger(s), {} window mapping(s)\n",
        "Triggers:".bold(),
        config.triggers.len(),
        mappings
    );
}
