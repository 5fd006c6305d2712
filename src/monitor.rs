//! Periodic backend health checks.
//!
//! The monitor counts the rows of a fixed set of collections and records the
//! date span of the date-bearing ones. A failed cycle marks the backend
//! unavailable but keeps the last good figures, and the next cycle runs as
//! scheduled.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::HealthProbe;
use crate::config::DEFAULT_POLL_SECS;
use crate::error::Result;
use crate::models::{Collection, DateRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// No check has completed yet.
    Checking,
    Connected,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectivitySnapshot {
    pub status: Connectivity,
    /// Row counts from the last successful check; `None` before the first one.
    pub counts: Option<BTreeMap<Collection, u64>>,
    pub date_ranges: Option<BTreeMap<Collection, DateRange>>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ConnectivitySnapshot {
    pub fn checking() -> Self {
        Self {
            status: Connectivity::Checking,
            counts: None,
            date_ranges: None,
            last_checked: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub collections: Vec<Collection>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_SECS),
            collections: vec![
                Collection::Students,
                Collection::DailyEvaluations,
                Collection::IncidentReports,
                Collection::ContactLogs,
                Collection::BehaviorSummaries,
            ],
        }
    }
}

type Figures = (BTreeMap<Collection, u64>, BTreeMap<Collection, DateRange>);

async fn collect<P: HealthProbe + ?Sized>(probe: &P, collections: &[Collection]) -> Result<Figures> {
    let mut counts = BTreeMap::new();
    let mut ranges = BTreeMap::new();

    for &collection in collections {
        counts.insert(collection, probe.count_rows(collection).await?);
        if let Some(column) = collection.date_column() {
            if let Some(range) = probe.date_range(collection, column).await? {
                ranges.insert(collection, range);
            }
        }
    }

    Ok((counts, ranges))
}

/// Runs one check cycle. Collections are queried one at a time, in order.
pub async fn check_once<P: HealthProbe + ?Sized>(
    probe: &P,
    collections: &[Collection],
    previous: &ConnectivitySnapshot,
) -> ConnectivitySnapshot {
    let now = Utc::now();
    match collect(probe, collections).await {
        Ok((counts, ranges)) => ConnectivitySnapshot {
            status: Connectivity::Connected,
            counts: Some(counts),
            date_ranges: Some(ranges),
            last_checked: Some(now),
            last_error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Connectivity check failed");
            ConnectivitySnapshot {
                status: Connectivity::Unavailable,
                counts: previous.counts.clone(),
                date_ranges: previous.date_ranges.clone(),
                last_checked: Some(now),
                last_error: Some(e.to_string()),
            }
        }
    }
}

pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
    /// Starts polling `probe` on a background task. The first check runs immediately.
    pub fn spawn<P>(probe: Arc<P>, config: MonitorConfig) -> MonitorHandle
    where
        P: HealthProbe + ?Sized + 'static,
    {
        let (tx, rx) = watch::channel(ConnectivitySnapshot::checking());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(probe, config, tx, cancel.clone()));

        MonitorHandle {
            status: rx,
            cancel,
            task: Some(task),
        }
    }
}

async fn run<P>(
    probe: Arc<P>,
    config: MonitorConfig,
    tx: watch::Sender<ConnectivitySnapshot>,
    cancel: CancellationToken,
) where
    P: HealthProbe + ?Sized,
{
    tracing::info!(
        interval_secs = config.interval.as_secs(),
        collections = config.collections.len(),
        "Connectivity monitor started"
    );

    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let previous = tx.borrow().clone();
        let checked = tokio::select! {
            _ = cancel.cancelled() => None,
            snapshot = check_once(&*probe, &config.collections, &previous) => Some(snapshot),
        };

        // A result that arrives after stop() is discarded.
        let Some(snapshot) = checked.filter(|_| !cancel.is_cancelled()) else {
            break;
        };

        if snapshot.status != previous.status {
            match snapshot.status {
                Connectivity::Connected => tracing::info!("Backend connected"),
                _ => tracing::warn!("Backend unavailable"),
            }
        }
        tx.send_replace(snapshot);
    }

    tracing::info!("Connectivity monitor stopped");
}

/// Owns the polling task. Dropping the handle stops polling.
pub struct MonitorHandle {
    status: watch::Receiver<ConnectivitySnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn subscribe(&self) -> watch::Receiver<ConnectivitySnapshot> {
        self.status.clone()
    }

    pub fn snapshot(&self) -> ConnectivitySnapshot {
        self.status.borrow().clone()
    }

    /// Cancels polling and waits for the task to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Connectivity monitor task ended abnormally");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
