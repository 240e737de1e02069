//! Caller-owned refresh loop around an [`Aggregator`].
//!
//! Each poll is tagged with a sequence number. Polls run independently, so a
//! manual refresh can overlap a timer poll; results older than the one
//! already published are dropped.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Notify, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{aggregator::Aggregator, model::AggregatedWeather, model::Coordinates};

#[derive(Debug, Clone, PartialEq)]
pub struct SequencedWeather {
    pub seq: u64,
    pub weather: AggregatedWeather,
}

pub type WeatherUpdates = watch::Receiver<Option<SequencedWeather>>;

#[derive(Debug)]
pub struct WeatherPoller {
    aggregator: Arc<Aggregator>,
    coords: Coordinates,
    interval: Duration,
}

impl WeatherPoller {
    pub fn new(aggregator: Arc<Aggregator>, coords: Coordinates, interval: Duration) -> Self {
        Self { aggregator, coords, interval }
    }

    /// Start polling: once immediately, then every interval, plus whenever
    /// [`PollHandle::refresh`] is called.
    pub fn spawn(self) -> PollHandle {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let refresh = Arc::new(Notify::new());

        let task = tokio::spawn(run(self, tx, cancel.clone(), refresh.clone()));

        PollHandle { cancel, refresh, updates: rx, task }
    }
}

async fn run(
    poller: WeatherPoller,
    tx: watch::Sender<Option<SequencedWeather>>,
    cancel: CancellationToken,
    refresh: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(poller.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut next_seq: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = refresh.notified() => {
                tracing::debug!("manual weather refresh requested");
            }
        }

        let seq = next_seq;
        next_seq += 1;

        let aggregator = poller.aggregator.clone();
        let coords = poller.coords;
        let tx = tx.clone();
        tokio::spawn(async move {
            let weather = aggregator.get_aggregated_weather(coords).await;
            if !publish_if_newer(&tx, SequencedWeather { seq, weather }) {
                tracing::debug!(seq, "discarding stale weather result");
            }
        });
    }

    tracing::debug!("weather poller stopped");
}

/// Publish `update` unless something at least as new is already out.
pub fn publish_if_newer(
    tx: &watch::Sender<Option<SequencedWeather>>,
    update: SequencedWeather,
) -> bool {
    tx.send_if_modified(|current| {
        if current.as_ref().is_none_or(|c| c.seq < update.seq) {
            *current = Some(update);
            true
        } else {
            false
        }
    })
}

/// Running poller. Dropping the handle does not stop the loop; call [`stop`](Self::stop).
#[derive(Debug)]
pub struct PollHandle {
    cancel: CancellationToken,
    refresh: Arc<Notify>,
    updates: WeatherUpdates,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    pub fn subscribe(&self) -> WeatherUpdates {
        self.updates.clone()
    }

    pub fn latest(&self) -> Option<SequencedWeather> {
        self.updates.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop scheduling polls. Polls already in flight still finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "weather poller task ended abnormally");
        }
    }
}
