use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use songrec_api::{
    api::{create_router, AppState},
    config::Config,
    services::{
        catalog::Catalog,
        recommendations::{RecommenderManager, RecommenderSettings},
        results::ResultsWriter,
        simulation::{default_agents, run_simulation, SimulationOptions},
    },
};

#[derive(Parser, Debug)]
#[command(name = "songrec", about = "Simulated music recommendation service")]
struct Cli {
    /// Catalog CSV, overrides CATALOG_PATH
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Onboard the default agents, recommend once and dump the results
    Simulate {
        /// Recommendations per agent
        #[arg(long)]
        recommendations: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        results_dir: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn build_manager(config: &Config) -> anyhow::Result<RecommenderManager> {
    let report = Catalog::from_path(&config.catalog_path)
        .with_context(|| format!("Failed to load catalog from {}", config.catalog_path))?;
    if !report.problems.is_empty() {
        tracing::warn!(skipped = report.problems.len(), "Catalog rows skipped");
    }
    if report.catalog.is_empty() {
        anyhow::bail!("Catalog {} contains no usable songs", config.catalog_path);
    }

    let manager = RecommenderManager::new(
        Arc::new(report.catalog),
        config.feature_encoding,
        RecommenderSettings::try_from(config)?,
    )?;
    Ok(manager)
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let manager = build_manager(&config)?;
    let addr = format!("{}:{}", config.host, config.port);

    let app = create_router(AppState::new(manager, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "Server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn simulate(config: Config) -> anyhow::Result<()> {
    let mut manager = build_manager(&config)?;
    let mut agents = default_agents();

    let report = run_simulation(
        &mut manager,
        &mut agents,
        SimulationOptions {
            recommendations: config.default_recommendations,
            seed: config.simulation_seed,
            now: Utc::now(),
        },
    )?;

    let run_dir = ResultsWriter::new(&config.results_dir).write(&report)?;
    tracing::info!(
        path = %run_dir.display(),
        playlists = report.playlists_created(),
        skipped = report.skipped_agents.len(),
        "Simulation results written"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(catalog) = cli.catalog {
        config.catalog_path = catalog.display().to_string();
    }

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        Command::Simulate {
            recommendations,
            seed,
            results_dir,
        } => {
            if let Some(n) = recommendations {
                config.default_recommendations = n;
            }
            if let Some(seed) = seed {
                config.simulation_seed = seed;
            }
            if let Some(dir) = results_dir {
                config.results_dir = dir.display().to_string();
            }
            config.validate()?;
            simulate(config)
        }
    }
}
