//! Run configuration: credentials, worker pool sizing and retry knobs.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;
use xref_adapters::{github, linear};
use xref_http::{default_user_agent, HttpClientConfig, RetryPolicy};

pub const PRIMARY_TOKEN_VAR: &str = "LINEAR_API_TOKEN";
pub const SECONDARY_TOKEN_VAR: &str = "GITHUB_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("LINEAR_API_TOKEN is required; add it to your .env file or create one at https://linear.app/settings/api")]
    MissingPrimaryToken,
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("reading env file {}: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub primary_token: Option<String>,
    pub secondary_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("primary_token", &self.primary_token.as_ref().map(|_| "<redacted>"))
            .field("secondary_token", &self.secondary_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn validate(&self) -> Result<&str, ConfigError> {
        self.primary_token
            .as_deref()
            .ok_or(ConfigError::MissingPrimaryToken)
    }

    pub fn has_elevated_access(&self) -> bool {
        self.secondary_token.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub credentials: Credentials,
    pub linear_api_url: String,
    pub github_api_url: String,
    pub workers_authenticated: usize,
    pub workers_anonymous: usize,
    pub page_size: u32,
    pub page_delay: Duration,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
    pub user_agent: String,
    pub progress_every: usize,
}

impl ReconcileConfig {
    /// Reads `.env` (or `XREF_ENV_FILE`) without touching the process
    /// environment. Values in the file win; the process environment fills
    /// in whatever the file leaves unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("XREF_ENV_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".env"));
        let file_vars = read_env_file(&path)?;
        Self::from_sources(&file_vars, |key| std::env::var(key).ok())
    }

    fn from_sources(
        file_vars: &HashMap<String, String>,
        process: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| file_vars.get(key).cloned().or_else(|| process(key)))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = RetryPolicy::default();

        Ok(Self {
            credentials: Credentials {
                primary_token: non_empty(PRIMARY_TOKEN_VAR),
                secondary_token: non_empty(SECONDARY_TOKEN_VAR),
            },
            linear_api_url: non_empty("LINEAR_API_URL")
                .unwrap_or_else(|| linear::DEFAULT_ENDPOINT.to_string()),
            github_api_url: non_empty("GITHUB_API_URL")
                .unwrap_or_else(|| github::DEFAULT_API_URL.to_string()),
            workers_authenticated: parse_or(&lookup, "XREF_WORKERS_AUTHENTICATED", 10)?,
            workers_anonymous: parse_or(&lookup, "XREF_WORKERS_ANONYMOUS", 2)?,
            page_size: parse_or(&lookup, "XREF_PAGE_SIZE", linear::DEFAULT_PAGE_SIZE)?,
            page_delay: Duration::from_millis(parse_or(&lookup, "XREF_PAGE_DELAY_MS", 250)?),
            retry: RetryPolicy {
                max_attempts: parse_or(&lookup, "XREF_MAX_ATTEMPTS", defaults.max_attempts)?,
                rate_limit_base: Duration::from_secs(parse_or(
                    &lookup,
                    "XREF_RATE_LIMIT_BASE_SECS",
                    defaults.rate_limit_base.as_secs(),
                )?),
                error_delay: Duration::from_secs(parse_or(
                    &lookup,
                    "XREF_ERROR_DELAY_SECS",
                    defaults.error_delay.as_secs(),
                )?),
            },
            http_timeout: Duration::from_secs(parse_or(&lookup, "XREF_HTTP_TIMEOUT_SECS", 30)?),
            user_agent: non_empty("XREF_USER_AGENT").unwrap_or_else(default_user_agent),
            progress_every: parse_or(&lookup, "XREF_PROGRESS_EVERY", 50)?,
        })
    }

    /// Pool size for this run; anonymous access gets the smaller pool.
    pub fn worker_count(&self) -> usize {
        let workers = if self.credentials.has_elevated_access() {
            self.workers_authenticated
        } else {
            self.workers_anonymous
        };
        workers.max(1)
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: self.http_timeout,
            user_agent: Some(self.user_agent.clone()),
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key, value: raw })
        }
        _ => Ok(default),
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no env file, using process environment only");
        return Ok(HashMap::new());
    }
    let to_err = |source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };
    let mut vars = HashMap::new();
    for entry in dotenvy::from_path_iter(path).map_err(to_err)? {
        let (key, value) = entry.map_err(to_err)?;
        vars.insert(key, value);
    }
    debug!(path = %path.display(), count = vars.len(), "loaded env file");
    Ok(vars)
}

/// Settings resolved once per run and passed explicitly to every stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub config: ReconcileConfig,
    pub workers: usize,
}

impl RunContext {
    /// Fails before any network activity when the primary token is absent.
    pub fn new(config: ReconcileConfig) -> Result<Self, ConfigError> {
        config.credentials.validate()?;
        let workers = config.worker_count();
        if !config.credentials.has_elevated_access() {
            warn!(
                workers,
                "GITHUB_TOKEN not set; using anonymous GitHub rate limits. \
                 Create a token at https://github.com/settings/tokens"
            );
        }
        Ok(Self {
            run_id: Uuid::new_v4(),
            config,
            workers,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}
