#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Console client for the relief map.
//!
//! ```text
//! relief_map watch
//! relief_map reports [--filter medical --filter help-needed]
//! relief_map alerts [--read <id>]
//! relief_map submit --type help-needed --title "Stuck on roof" --description "Water rising fast"
//! ```
//!
//! Configuration comes from `--config <file.toml>` and/or the
//! `RELIEF_MAP_*` environment variables. Without a database URL the client
//! runs against an empty in-memory store.

mod render;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use relief_map_report_models::{FilterSet, FilterType, LatLng, Priority, ReportType};
use relief_map_store::AppAction;
use relief_map_store::alerts::open_alert_actions;
use relief_map_store::filters::{toggle_filter, visible_reports};
use relief_map_sync::{AppConfig, AppContext, ReportDraft, SubmitOutcome};

/// How long to wait for the first snapshots.
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "relief_map", about = "Disaster relief map console client")]
struct Cli {
    /// TOML config file; `RELIEF_MAP_*` variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow reports and alerts live until Ctrl-C
    Watch,
    /// List reports, optionally filtered by category
    Reports {
        /// Category to show (repeatable); toggled in order like the filter bar
        #[arg(long = "filter", value_parser = parse_kebab::<FilterType>)]
        filters: Vec<FilterType>,
    },
    /// List alerts, newest first
    Alerts {
        /// Alert ids to open (marks them read)
        #[arg(long = "read")]
        read: Vec<String>,
    },
    /// Submit a report
    Submit {
        /// Report category
        #[arg(long = "type", value_parser = parse_kebab::<ReportType>)]
        report_type: ReportType,
        /// Short title (at least 3 characters)
        #[arg(long)]
        title: String,
        /// Description (at least 10 characters)
        #[arg(long)]
        description: String,
        /// Urgency
        #[arg(long, value_parser = parse_kebab::<Priority>, default_value = "medium")]
        priority: Priority,
        /// Latitude; defaults to the device position
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Longitude; defaults to the device position
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,
        /// City
        #[arg(long)]
        city: Option<String>,
        /// Contact details
        #[arg(long)]
        contact: Option<String>,
        /// Kind of resource offered (required for `resources`)
        #[arg(long)]
        resource_type: Option<String>,
        /// Capacity of a shelter or resource point
        #[arg(long)]
        capacity: Option<u32>,
        /// Times to retry a write that only succeeded locally
        #[arg(long, default_value = "3")]
        retries: u32,
        /// Delay between retries, in milliseconds
        #[arg(long, default_value = "2000")]
        retry_delay_ms: u64,
    },
}

fn parse_kebab<T: FromStr>(value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("unrecognized value '{value}'"))
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, relief_map_sync::ConfigError> {
    match path {
        Some(path) => AppConfig::load(path)?.with_env_overrides(),
        None => AppConfig::from_env(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    let context = AppContext::init(&config).await?;
    if !context.wait_for(|state| !state.is_loading, LOAD_TIMEOUT).await {
        log::warn!("Timed out waiting for the first snapshot");
    }

    let result = run(&context, cli.command).await;
    context.dispose();
    result
}

async fn run(context: &AppContext, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Watch => watch(context).await?,
        Commands::Reports { filters } => {
            let store = context.store();
            let selection = filters
                .into_iter()
                .fold(FilterSet::all(), |active, clicked| toggle_filter(&active, clicked));
            store.dispatch(AppAction::SetFilters(selection));

            let state = context.state();
            println!("{}", render::filter_bar(&state));
            println!();
            let reports = visible_reports(&state);
            if reports.is_empty() {
                println!("No reports.");
            }
            for report in reports {
                println!("{}", render::report_row(report));
            }
        }
        Commands::Alerts { read } => {
            let store = context.store();
            for id in &read {
                let state = store.state();
                match state.alerts.iter().find(|alert| &alert.id == id) {
                    Some(alert) => store.dispatch_all(open_alert_actions(alert)),
                    None => eprintln!("No alert with id {id}"),
                }
            }

            let state = context.state();
            println!("{}", render::summary(&state));
            println!();
            if state.alerts.is_empty() {
                println!("No alerts.");
            }
            for alert in &state.alerts {
                println!("{}", render::alert_row(&state, alert));
            }
        }
        Commands::Submit {
            report_type,
            title,
            description,
            priority,
            lat,
            lng,
            city,
            contact,
            resource_type,
            capacity,
            retries,
            retry_delay_ms,
        } => {
            let draft = ReportDraft {
                report_type,
                title,
                description,
                city,
                location: lat.zip(lng).map(|(lat, lng)| LatLng::new(lat, lng)),
                priority,
                contact,
                resource_type,
                capacity,
            };
            submit(context, &draft, retries, Duration::from_millis(retry_delay_ms)).await?;
        }
    }
    Ok(())
}

async fn watch(context: &AppContext) -> Result<(), Box<dyn std::error::Error>> {
    let store = context.store();
    println!("{}", render::summary(&store.state()));
    let listener = store.subscribe(|state| println!("{}", render::summary(state)));

    tokio::signal::ctrl_c().await?;
    store.unsubscribe(listener);
    Ok(())
}

async fn submit(
    context: &AppContext,
    draft: &ReportDraft,
    retries: u32,
    delay: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = context.controller();
    let outcome = controller.submit_report(draft).await?;
    println!("{}", render::outcome(&outcome));

    if !matches!(outcome, SubmitOutcome::LocalOnly { .. }) {
        return Ok(());
    }

    for attempt in 1..=retries {
        tokio::time::sleep(delay).await;
        let report = controller.retry_pending().await;
        if report.remaining == 0 {
            println!("Report synced after {attempt} retries");
            return Ok(());
        }
        log::info!("Retry {attempt}/{retries}: still offline");
    }

    let pending = controller.pending_writes();
    if let Some(write) = pending.first() {
        eprintln!(
            "Report not synced after {} attempts: {}",
            write.attempts, write.last_error
        );
    }
    Ok(())
}
