use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

mod api;
mod assembler;
mod config;
mod csv;
mod emails;
mod error;
mod export;
mod geo;
mod matcher;
mod models;
mod places;
mod reconcile;
mod search;
mod store;

use search::{App, RequestedMode, SearchReport, SearchRequest};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML format)
    #[arg(long, env = "PLACE_SCOUT_CONFIG")]
    config_file: Option<String>,

    /// API key for the places lookup service
    #[arg(long, env = "PLACE_SCOUT_API_KEY")]
    api_key: Option<String>,

    /// Path of the persisted store file
    #[arg(long, env = "PLACE_SCOUT_STORE")]
    store: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search by category and typed place name
    Typed {
        /// Business category, e.g. "restaurant"
        #[arg(short, long)]
        category: String,

        /// Place name, e.g. "Nijmegen"
        #[arg(short, long)]
        place: String,
    },
    /// Search by category around a map-selected center
    Map {
        /// Business category, e.g. "restaurant"
        #[arg(short, long)]
        category: String,

        /// Latitude of the search center
        #[arg(long)]
        lat: f64,

        /// Longitude of the search center
        #[arg(long)]
        lon: f64,

        /// Search radius in meters
        #[arg(short, long, default_value_t = 1000)]
        radius: u32,
    },
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = config::build_config(
        cli.config_file.as_deref(),
        cli.api_key.as_deref(),
        cli.store.as_deref(),
    )?;

    match cli.command {
        Commands::Typed { category, place } => {
            config.show_progress = true;
            let app = App::new(Arc::new(config))?;
            let request = SearchRequest {
                category,
                mode: RequestedMode::Typed { place },
            };
            run_cli_search(&app, &request).await
        }
        Commands::Map {
            category,
            lat,
            lon,
            radius,
        } => {
            config.show_progress = true;
            let app = App::new(Arc::new(config))?;
            let request = SearchRequest {
                category,
                mode: RequestedMode::Map {
                    latitude: Some(lat),
                    longitude: Some(lon),
                    radius_m: radius,
                },
            };
            run_cli_search(&app, &request).await
        }
        Commands::Serve { port } => {
            let app = Arc::new(App::new(Arc::new(config))?);
            api::start_api_server(app, port)
                .await
                .map_err(|e| anyhow::anyhow!("API server failed: {}", e))
        }
    }
}

async fn run_cli_search(app: &App, request: &SearchRequest) -> Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Cancellation requested; stopping at the next fetch boundary");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let report = app.execute(request, &cancel).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SearchReport) {
    if report.no_results {
        println!("No results found for: {}", report.input_context);
        return;
    }

    print_table(&report.table.columns, &report.table.rows);

    println!(
        "\n{} new, {} changed, {} unchanged, {} vanished",
        report.summary.new,
        report.summary.changed,
        report.summary.unchanged,
        report.summary.vanished
    );
    println!("Export written: {}", report.filename);
    if !report.persisted {
        eprintln!("WARNING: results were NOT saved to the store; display only.");
    }
}

fn print_table(columns: &[String], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let print_row = |cells: &[String]| {
        let line = cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<width$}", c, width = widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join("  ");
        println!("{}", line.trim_end());
    };

    print_row(columns);
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));
    for row in rows {
        print_row(row);
    }
}
