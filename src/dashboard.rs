//! Dashboard scoping: which dashboard is active, what it is called, and how
//! it narrows student queries.
//!
//! Every accessor on [`DashboardScope`] degrades instead of failing. When the
//! provider is missing, uninitialized or returns an error, the accessor logs
//! it and hands back a fixed fallback wrapped in [`Resolved::Fallback`].

use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::facade::Services;
use crate::models::{Dashboard, Filter, SortSpec, DEFAULT_DASHBOARD_ID};

/// Shown when no usable default dashboard name is configured.
pub const FALLBACK_DASHBOARD_NAME: &str = "Main Dashboard";

/// Settings key holding the display name of the default dashboard.
pub const DEFAULT_DASHBOARD_NAME_KEY: &str = "default_dashboard_name";

/// Settings key remembering the last selected dashboard.
pub const SELECTED_DASHBOARD_KEY: &str = "selected_dashboard_id";

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardContext {
    pub selected_dashboard_id: String,
    pub dashboards: Vec<Dashboard>,
    pub default_dashboard_name: String,
    pub dashboards_supported: bool,
    pub disable_dashboards: bool,
}

impl DashboardContext {
    /// Reads dashboards and dashboard settings from storage.
    ///
    /// `selected` overrides the persisted selection.
    pub async fn load(services: &Services, selected: Option<&str>, disable_dashboards: bool) -> Result<Self> {
        let dashboards_supported = services.backend().supports_dashboards().await;

        let dashboards = if dashboards_supported {
            services.dashboards.list(Some(&SortSpec::asc("name"))).await?
        } else {
            Vec::new()
        };

        let default_dashboard_name = services
            .settings
            .get(DEFAULT_DASHBOARD_NAME_KEY)
            .await?
            .unwrap_or_else(|| FALLBACK_DASHBOARD_NAME.to_string());

        let selected_dashboard_id = match selected {
            Some(id) => id.to_string(),
            None => services
                .settings
                .get(SELECTED_DASHBOARD_KEY)
                .await?
                .unwrap_or_else(|| DEFAULT_DASHBOARD_ID.to_string()),
        };

        Ok(Self {
            selected_dashboard_id,
            dashboards,
            default_dashboard_name,
            dashboards_supported,
            disable_dashboards,
        })
    }

    fn scoping_enabled(&self) -> bool {
        self.dashboards_supported && !self.disable_dashboards
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("dashboard context is not initialized")]
    Uninitialized,

    #[error("dashboard context lock poisoned")]
    Poisoned,
}

/// Source of the current dashboard context.
pub trait DashboardProvider: Send + Sync {
    fn context(&self) -> std::result::Result<DashboardContext, ScopeError>;
}

impl DashboardProvider for DashboardContext {
    fn context(&self) -> std::result::Result<DashboardContext, ScopeError> {
        Ok(self.clone())
    }
}

/// A context that can be filled in, or changed, after the scope is handed out.
#[derive(Default)]
pub struct SharedDashboardContext {
    inner: RwLock<Option<DashboardContext>>,
}

impl SharedDashboardContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, context: DashboardContext) -> std::result::Result<(), ScopeError> {
        let mut inner = self.inner.write().map_err(|_| ScopeError::Poisoned)?;
        *inner = Some(context);
        Ok(())
    }

    pub fn select(&self, dashboard_id: &str) -> std::result::Result<(), ScopeError> {
        let mut inner = self.inner.write().map_err(|_| ScopeError::Poisoned)?;
        let context = inner.as_mut().ok_or(ScopeError::Uninitialized)?;
        context.selected_dashboard_id = dashboard_id.to_string();
        Ok(())
    }
}

impl DashboardProvider for SharedDashboardContext {
    fn context(&self) -> std::result::Result<DashboardContext, ScopeError> {
        let inner = self.inner.read().map_err(|_| ScopeError::Poisoned)?;
        inner.clone().ok_or(ScopeError::Uninitialized)
    }
}

/// A value read from the live context, or the substitute used instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    Live(T),
    Fallback(T),
}

impl<T> Resolved<T> {
    pub fn into_inner(self) -> T {
        match self {
            Resolved::Live(value) | Resolved::Fallback(value) => value,
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Resolved::Live(value) | Resolved::Fallback(value) => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolved::Fallback(_))
    }
}

fn non_empty_name(name: &str) -> Resolved<String> {
    if name.trim().is_empty() {
        Resolved::Fallback(FALLBACK_DASHBOARD_NAME.to_string())
    } else {
        Resolved::Live(name.to_string())
    }
}

#[derive(Clone)]
pub struct DashboardScope {
    provider: Option<Arc<dyn DashboardProvider>>,
}

impl DashboardScope {
    pub fn new(provider: Arc<dyn DashboardProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// A scope with no provider behind it; every accessor falls back.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self { provider: None }
    }

    fn context(&self, accessor: &'static str) -> Option<DashboardContext> {
        let Some(provider) = self.provider.as_ref() else {
            tracing::warn!(accessor, "No dashboard provider, using fallback");
            return None;
        };
        match provider.context() {
            Ok(context) => Some(context),
            Err(e) => {
                tracing::warn!(accessor, error = %e, "Dashboard context unavailable, using fallback");
                None
            }
        }
    }

    pub fn selected_dashboard_id(&self) -> Resolved<String> {
        match self.context("selected_dashboard_id") {
            Some(context) => Resolved::Live(context.selected_dashboard_id),
            None => Resolved::Fallback(DEFAULT_DASHBOARD_ID.to_string()),
        }
    }

    pub fn dashboards(&self) -> Resolved<Vec<Dashboard>> {
        match self.context("dashboards") {
            Some(context) => Resolved::Live(context.dashboards),
            None => Resolved::Fallback(Vec::new()),
        }
    }

    /// Display name of the selected dashboard. Never empty.
    pub fn current_dashboard_name(&self) -> Resolved<String> {
        let Some(context) = self.context("current_dashboard_name") else {
            return Resolved::Fallback(FALLBACK_DASHBOARD_NAME.to_string());
        };

        if context.selected_dashboard_id == DEFAULT_DASHBOARD_ID {
            return non_empty_name(&context.default_dashboard_name);
        }

        let matched = context
            .dashboards
            .iter()
            .find(|dashboard| dashboard.id.to_string() == context.selected_dashboard_id)
            .map(|dashboard| dashboard.name.as_str())
            .filter(|name| !name.trim().is_empty());

        match matched {
            Some(name) => Resolved::Live(name.to_string()),
            None => {
                tracing::debug!(
                    selected = %context.selected_dashboard_id,
                    "Selected dashboard not found, using default name"
                );
                Resolved::Fallback(non_empty_name(&context.default_dashboard_name).into_inner())
            }
        }
    }

    /// `base` narrowed to the selected dashboard, or `base` unchanged when
    /// dashboards are unsupported, disabled or unavailable. `base` itself is
    /// never modified.
    pub fn build_student_filter(&self, base: &Filter) -> Resolved<Filter> {
        match self.context("build_student_filter") {
            Some(context) if context.scoping_enabled() => {
                Resolved::Live(base.and("dashboard_id", context.selected_dashboard_id))
            }
            Some(_) => Resolved::Live(base.clone()),
            None => Resolved::Fallback(base.clone()),
        }
    }
}
