use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cubewatch::app;
use cubewatch::config::{default_config_path, ResolvedConfig};
use cubewatch::cube::CubeId;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cubewatch")]
#[command(about = "Daily rebalancing monitor for xueqiu portfolios")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,

    /// Classify cubes as active, closed, missing, or malformed
    Status {
        /// Cube symbols (e.g. ZH123456); defaults to every configured cube
        cubes: Vec<String>,
    },

    /// Show name, creation date, and latest net value of a cube
    Info { cube: String },

    /// List a cube's successful rebalances on one day
    Events {
        cube: String,

        /// Day as YYYYMMDD or YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Poll every configured cube and deliver the report
    Run {
        /// Day as YYYYMMDD or YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cube_ids(raw: &[String]) -> Vec<CubeId> {
    raw.iter().map(|id| CubeId::new(id.trim())).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();

    let cli = Cli::parse();

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;

    match cli.command {
        Some(Command::Config) => print_json(&app::config_output(&config)?)?,
        Some(Command::Status { cubes }) => {
            let cubes = if cubes.is_empty() {
                cubewatch::watchlist::configured_cubes(&config.config)?
            } else {
                cube_ids(&cubes)
            };
            let context = app::default_client_context(&config)?;
            print_json(&app::check_statuses(&context, &cubes).await)?;
        }
        Some(Command::Info { cube }) => {
            let context = app::default_client_context(&config)?;
            print_json(&app::cube_info(&context, &CubeId::new(cube.trim())).await?)?;
        }
        Some(Command::Events { cube, date }) => {
            let context = app::default_client_context(&config)?;
            let date = app::resolve_target_date(&context, date.as_deref())?;
            print_json(&app::cube_events(&context, &CubeId::new(cube.trim()), date).await?)?;
        }
        Some(Command::Run { date }) => {
            let context = app::default_client_context(&config)?;
            let date = app::resolve_target_date(&context, date.as_deref())?;

            let cancel = context.cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received; stopping after the current cube");
                    cancel.cancel();
                }
            });

            print_json(&app::run_report(&config, context, date).await?)?;
        }
        None => {
            println!("cubewatch - xueqiu rebalancing monitor");
            println!("======================================\n");
            println!("Config: {}\n", config.path.display());
            println!("Commands:");
            println!("  config    Show current configuration");
            println!("  status    Classify cubes");
            println!("  info      Show cube name, creation date, and value");
            println!("  events    List a cube's rebalances on one day");
            println!("  run       Poll all cubes and deliver the report\n");
            println!("Run 'cubewatch --help' for more options.");
        }
    }

    Ok(())
}
