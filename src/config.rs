//! Configuration types.
//!
//! Everything is read once at startup into an immutable [`RosterConfig`] and
//! handed to the loader, notifier and web layer by reference.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::notify::template::BodyFormat;
use crate::roster::loader::FileKind;

/// Default upload limit: 25 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;
pub const DEFAULT_MAX_COLUMNS: usize = 29;
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Subject line of every roster notification.
pub const ROSTER_SUBJECT: &str = "Updated Roster";

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    pub fn has_credentials(&self) -> bool {
        use secrecy::ExposeSecret;
        !self.username.is_empty() && !self.password.expose_secret().is_empty()
    }
}

/// Limits applied to uploaded files.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Maximum accepted file size in bytes.
    pub max_file_size: u64,
    /// Lowercase extensions accepted by the loader.
    pub allowed_extensions: BTreeSet<String>,
    /// Columns beyond this count are dropped.
    pub max_columns: usize,
    /// Rows per CSV read chunk.
    pub chunk_size: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: ["xlsx", "xls", "csv"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_columns: DEFAULT_MAX_COLUMNS,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Notification dispatch settings.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum number of sends in flight.
    pub workers: usize,
    pub subject: String,
    pub body_format: BodyFormat,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_MAX_WORKERS,
            subject: ROSTER_SUBJECT.to_string(),
            body_format: BodyFormat::Plain,
        }
    }
}

/// Service configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct RosterConfig {
    pub smtp: SmtpConfig,
    pub upload: UploadLimits,
    pub dispatch: DispatchConfig,
    /// Sessions idle longer than this lose their stored batch.
    pub session_ttl: Duration,
    pub bind_addr: SocketAddr,
}

impl RosterConfig {
    /// Build config from the process environment, honouring a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let username = var("EMAIL_HOST_USER").unwrap_or_default();
        let smtp = SmtpConfig {
            host: var("EMAIL_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port: parse_or(var("EMAIL_PORT"), "EMAIL_PORT", 587)?,
            from_address: var("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone()),
            username,
            password: SecretString::from(var("EMAIL_HOST_PASSWORD").unwrap_or_default()),
        };

        let allowed_extensions = match var("ROSTER_ALLOWED_EXTENSIONS") {
            Some(raw) => parse_extensions(&raw)?,
            None => UploadLimits::default().allowed_extensions,
        };

        let upload = UploadLimits {
            max_file_size: positive(
                parse_or(var("ROSTER_MAX_FILE_SIZE"), "ROSTER_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
                "ROSTER_MAX_FILE_SIZE",
            )?,
            allowed_extensions,
            max_columns: positive(
                parse_or(var("ROSTER_MAX_COLUMNS"), "ROSTER_MAX_COLUMNS", DEFAULT_MAX_COLUMNS)?,
                "ROSTER_MAX_COLUMNS",
            )?,
            chunk_size: positive(
                parse_or(var("ROSTER_CHUNK_SIZE"), "ROSTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
                "ROSTER_CHUNK_SIZE",
            )?,
        };

        let dispatch = DispatchConfig {
            workers: positive(
                parse_or(var("ROSTER_MAX_WORKERS"), "ROSTER_MAX_WORKERS", DEFAULT_MAX_WORKERS)?,
                "ROSTER_MAX_WORKERS",
            )?,
            subject: ROSTER_SUBJECT.to_string(),
            body_format: parse_or(var("ROSTER_BODY_FORMAT"), "ROSTER_BODY_FORMAT", BodyFormat::Plain)?,
        };

        let session_ttl_secs: u64 = positive(
            parse_or(var("ROSTER_SESSION_TTL_SECS"), "ROSTER_SESSION_TTL_SECS", 86_400)?,
            "ROSTER_SESSION_TTL_SECS",
        )?;

        let bind_addr = parse_or(
            var("ROSTER_BIND_ADDR"),
            "ROSTER_BIND_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 8000)),
        )?;

        Ok(Self {
            smtp,
            upload,
            dispatch,
            session_ttl: Duration::from_secs(session_ttl_secs),
            bind_addr,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

fn positive<T>(value: T, key: &str) -> Result<T, ConfigError>
where
    T: PartialEq + Default,
{
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn parse_extensions(raw: &str) -> Result<BTreeSet<String>, ConfigError> {
    let mut set = BTreeSet::new();
    for ext in raw.split(',').map(|s| s.trim().trim_start_matches('.').to_lowercase()) {
        if ext.is_empty() {
            continue;
        }
        if FileKind::from_extension(&ext).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "ROSTER_ALLOWED_EXTENSIONS".to_string(),
                message: format!("unsupported extension '{ext}'"),
            });
        }
        set.insert(ext);
    }
    if set.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "ROSTER_ALLOWED_EXTENSIONS".to_string(),
            message: "at least one extension is required".to_string(),
        });
    }
    Ok(set)
}
