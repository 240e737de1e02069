//! Core library for the Arko flood-monitoring dashboard.
//!
//! This crate defines:
//! - Provider adapters that normalize external weather APIs into one reading shape
//! - The aggregator that merges them into a consensus reading with a confidence score
//! - A simulated fallback reading for total outages
//! - The evacuation-center capacity watcher
//! - A caller-owned polling loop and on-disk configuration
//!
//! It is used by `arko-cli`, but can also be embedded by other front-ends.

pub mod aggregator;
pub mod config;
pub mod evacuation;
pub mod model;
pub mod poller;
pub mod provider;
pub mod simulation;

pub use aggregator::{Aggregator, AggregatorSettings, DisagreementThresholds};
pub use config::{Config, LocationConfig, ProviderConfig};
pub use evacuation::{CapacityEvent, CapacityWatcher, CenterSnapshot, WatcherSettings};
pub use model::{
    AggregatedWeather, ConditionTag, Coordinates, InvalidCoordinates, Measurements, Reading,
    ReadingSource,
};
pub use poller::{PollHandle, SequencedWeather, WeatherPoller};
pub use provider::{AdapterError, AdapterResult, ProviderId, WeatherProvider};
