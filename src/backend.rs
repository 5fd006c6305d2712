use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::HostedBackend;
use crate::error::Result;
use crate::local::LocalBackend;
use crate::models::{Collection, DateRange, Filter, SortSpec};
use crate::store::FileKeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Hosted,
    Local,
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendMode::Hosted => f.write_str("hosted"),
            BackendMode::Local => f.write_str("local"),
        }
    }
}

/// Lightweight existence queries used by the connectivity monitor.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn count_rows(&self, collection: Collection) -> Result<u64>;

    /// Earliest and latest value of `column`, or `None` when the collection is empty.
    async fn date_range(&self, collection: Collection, column: &str) -> Result<Option<DateRange>>;
}

/// Record storage behind the entity facades. Records travel as JSON objects
/// whose keys are the collection's columns.
#[async_trait]
pub trait Backend: HealthProbe {
    fn mode(&self) -> BackendMode;

    async fn list(&self, collection: Collection, sort: Option<&SortSpec>) -> Result<Vec<Value>>;

    async fn filter(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>>;

    /// Stores a new record and returns it with `id` and `created_at` assigned.
    async fn insert(&self, collection: Collection, record: Value) -> Result<Value>;

    async fn update(&self, collection: Collection, id: Uuid, patch: Value) -> Result<Value>;

    /// Removes the record and every dependent row referencing it.
    async fn delete(&self, collection: Collection, id: Uuid) -> Result<()>;

    async fn supports_dashboards(&self) -> bool;
}

/// Picks the backend once: hosted when a valid database URL is configured,
/// local storage otherwise.
pub fn select(config: &AppConfig) -> Result<Arc<dyn Backend>> {
    match config.hosted_url() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
                .connect_lazy(url)?;
            tracing::info!("Using hosted backend");
            Ok(Arc::new(HostedBackend::new(pool)))
        }
        None => {
            let kv = FileKeyValueStore::open(&config.data_dir)?;
            tracing::info!(data_dir = %config.data_dir.display(), "No hosted backend configured, using local storage");
            Ok(Arc::new(LocalBackend::new(kv)))
        }
    }
}
