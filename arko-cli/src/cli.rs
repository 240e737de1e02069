use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use arko_core::{
    Aggregator, CapacityWatcher, CenterSnapshot, Config, Coordinates, ProviderId, WeatherPoller,
};
use clap::{Args, Parser, Subcommand};
use inquire::{Confirm, Password};

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "arko", version, about = "Arko flood-monitoring weather aggregator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enable/disable a provider and store its credentials.
    Configure {
        /// Provider short name: "openweather", "weatherapi" or "openmeteo".
        provider: String,
    },

    /// Aggregate the current weather once and print it.
    Show {
        #[command(flatten)]
        location: LocationArgs,

        /// Print the aggregated result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Keep polling and print every new aggregated reading until Ctrl-C.
    Watch {
        #[command(flatten)]
        location: LocationArgs,

        /// Poll interval in seconds; defaults to `poll_interval_secs` from config.
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Replay evacuation-center snapshots through the capacity watcher.
    Capacity {
        /// JSON files, each an array of centers, in chronological order.
        #[arg(required = true)]
        snapshots: Vec<PathBuf>,

        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
pub struct LocationArgs {
    /// Latitude; falls back to the configured [location].
    #[arg(long, allow_negative_numbers = true, requires = "lon")]
    lat: Option<f64>,

    /// Longitude; falls back to the configured [location].
    #[arg(long, allow_negative_numbers = true, requires = "lat")]
    lon: Option<f64>,
}

impl LocationArgs {
    fn resolve(&self, config: &Config) -> Result<Coordinates> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)?),
            (None, None) => config.default_location(),
            _ => bail!("--lat and --lon must be given together"),
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Show { location, json } => show(&location, json).await,
            Command::Watch { location, interval } => watch(&location, interval).await,
            Command::Capacity { snapshots, json } => capacity(&snapshots, json),
        }
    }
}

fn configure(provider: &str) -> Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    let enabled = Confirm::new(&format!("Use {id} as a weather source?"))
        .with_default(true)
        .prompt()
        .context("Configuration prompt was cancelled")?;

    if enabled && id.requires_api_key() {
        let api_key = Password::new(&format!("{id} API key:"))
            .without_confirmation()
            .prompt()
            .context("Configuration prompt was cancelled")?;

        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            bail!("API key for {id} must not be empty");
        }
        config.upsert_provider_api_key(id, api_key);
    } else {
        config.set_provider_enabled(id, enabled);
    }

    config.save()?;
    println!(
        "{id} {} (config: {})",
        if enabled { "enabled" } else { "disabled" },
        Config::config_file_path()?.display()
    );

    Ok(())
}

async fn show(location: &LocationArgs, json: bool) -> Result<()> {
    let config = Config::load()?;
    let coords = location.resolve(&config)?;

    let aggregator = Aggregator::from_config(&config);
    let weather = aggregator.get_aggregated_weather(coords).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&weather).context("Failed to serialize weather")?
        );
    } else {
        print!("{}", output::weather_report(coords, &weather));
    }

    Ok(())
}

async fn watch(location: &LocationArgs, interval: Option<u64>) -> Result<()> {
    let config = Config::load()?;
    let coords = location.resolve(&config)?;
    let interval = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.poll_interval());

    let aggregator = Arc::new(Aggregator::from_config(&config));
    let handle = WeatherPoller::new(aggregator, coords, interval).spawn();
    let mut updates = handle.subscribe();

    tracing::info!(%coords, interval_secs = interval.as_secs(), "polling weather, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(update) = latest {
                    println!("#{}", update.seq);
                    print!("{}", output::weather_report(coords, &update.weather));
                }
            }
        }
    }

    handle.stop().await;
    Ok(())
}

fn capacity(snapshots: &[PathBuf], json: bool) -> Result<()> {
    let config = Config::load()?;
    let mut watcher = CapacityWatcher::new(config.watcher_settings());

    for path in snapshots {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        let centers: Vec<CenterSnapshot> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;

        for event in watcher.update(&centers) {
            if json {
                println!(
                    "{}",
                    serde_json::to_string(&event).context("Failed to serialize event")?
                );
            } else {
                println!("{}: {event}", path.display());
            }
        }
    }

    Ok(())
}
