use std::path::PathBuf;
use std::time::Duration;

/// Default seconds between connectivity checks.
pub const DEFAULT_POLL_SECS: u64 = 30;

const DEFAULT_DATA_DIR: &str = "bright-track-data";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Credentials for the optional hosted sign-in provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
}

/// Runtime configuration read from the environment.
///
/// | Env Var                 | Default              |
/// |-------------------------|----------------------|
/// | `SUPABASE_DB_URL`       | --                   |
/// | `DATABASE_URL`          | --                   |
/// | `BRIGHT_TRACK_DATA_DIR` | `bright-track-data`  |
/// | `STATUS_POLL_SECS`      | `30`                 |
/// | `DB_CONNECT_TIMEOUT_SECS` | `5`                |
/// | `DISABLE_DASHBOARDS`    | `false`              |
/// | `FIREBASE_API_KEY`, `FIREBASE_AUTH_DOMAIN`, `FIREBASE_PROJECT_ID` | -- |
///
/// Missing or invalid values never fail startup: an unusable database URL
/// selects local storage, and malformed numbers fall back to their defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub poll_interval: Duration,
    pub connect_timeout_secs: u64,
    pub disable_dashboards: bool,
    pub auth: Option<AuthConfig>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable source; used by tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = lookup("SUPABASE_DB_URL")
            .filter(|url| is_usable_database_url(url))
            .or_else(|| lookup("DATABASE_URL").filter(|url| is_usable_database_url(url)));

        let data_dir = lookup("BRIGHT_TRACK_DATA_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let poll_secs = parse_or("STATUS_POLL_SECS", lookup("STATUS_POLL_SECS"), DEFAULT_POLL_SECS).max(1);
        let connect_timeout_secs = parse_or(
            "DB_CONNECT_TIMEOUT_SECS",
            lookup("DB_CONNECT_TIMEOUT_SECS"),
            DEFAULT_CONNECT_TIMEOUT_SECS,
        );

        let disable_dashboards = lookup("DISABLE_DASHBOARDS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let auth = match (
            lookup("FIREBASE_API_KEY"),
            lookup("FIREBASE_AUTH_DOMAIN"),
            lookup("FIREBASE_PROJECT_ID"),
        ) {
            (Some(api_key), Some(auth_domain), Some(project_id))
                if [&api_key, &auth_domain, &project_id]
                    .iter()
                    .all(|v| !is_placeholder(v)) =>
            {
                Some(AuthConfig {
                    api_key,
                    auth_domain,
                    project_id,
                })
            }
            _ => None,
        };

        Self {
            database_url,
            data_dir,
            poll_interval: Duration::from_secs(poll_secs),
            connect_timeout_secs,
            disable_dashboards,
            auth,
        }
    }

    pub fn hosted_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }
}

fn parse_or(name: &str, raw: Option<String>, default: u64) -> u64 {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, default, "Ignoring malformed setting");
            default
        }),
    }
}

fn is_placeholder(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    value.is_empty() || value.contains("your-") || value.contains("your_") || value.contains('<')
}

fn is_usable_database_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("postgres://") || url.starts_with("postgresql://")) && !is_placeholder(url)
}
