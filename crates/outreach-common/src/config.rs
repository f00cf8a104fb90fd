//! Configuration for Outreach
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `OUTREACH__SECTION__KEY` environment variables, then the well-known provider
//! variables (`RESEND_API_KEY`, `CRON_SECRET`, `DATABASE_URL`, ...).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound email provider configuration
    #[serde(default)]
    pub mailer: MailerConfig,

    /// Campaign send scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Run embedded migrations at startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            run_migrations: true,
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// API configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Shared secret expected as `Authorization: Bearer <secret>` on the cron trigger.
    /// When unset the trigger is open.
    pub cron_secret: Option<String>,

    /// Token required on operator endpoints. When unset they are open.
    pub admin_token: Option<String>,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Outbound email provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailerProvider {
    Resend,
    Smtp,
}

impl Default for MailerProvider {
    fn default() -> Self {
        MailerProvider::Resend
    }
}

/// Mailer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Which provider delivers campaign mail
    #[serde(default)]
    pub provider: MailerProvider,

    /// Sender address
    #[serde(default = "default_from_email")]
    pub from_email: String,

    /// Sender display name
    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Resend HTTP API settings
    #[serde(default)]
    pub resend: ResendConfig,

    /// SMTP relay settings
    #[serde(default)]
    pub smtp: SmtpConfig,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            provider: MailerProvider::default(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            resend: ResendConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl MailerConfig {
    /// Formatted `From` header value
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }
}

fn default_from_email() -> String {
    "noreply@example.com".to_string()
}

fn default_from_name() -> String {
    "Email Campaign".to_string()
}

/// Resend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendConfig {
    /// API key; the provider counts as unconfigured without it
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_resend_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_resend_base_url(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

fn default_resend_base_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

/// SMTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host; the provider counts as unconfigured without it
    pub host: Option<String>,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Implicit TLS
    #[serde(default)]
    pub use_tls: bool,

    /// STARTTLS upgrade
    #[serde(default = "default_true")]
    pub use_starttls: bool,

    /// Command timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            use_tls: false,
            use_starttls: true,
            timeout_secs: default_provider_timeout(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

/// What to do with a recipient whose campaign template cannot be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTemplatePolicy {
    /// Send a generic placeholder subject and body
    Generic,
    /// Mark the recipient failed without sending
    Fail,
}

impl Default for MissingTemplatePolicy {
    fn default() -> Self {
        MissingTemplatePolicy::Generic
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the in-process periodic worker
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between worker ticks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Upper bound on sends per campaign per pass
    #[serde(default = "default_max_per_pass")]
    pub max_per_pass: u32,

    /// Lower bound of the randomized inter-send delay, in seconds
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,

    /// Upper bound of the randomized inter-send delay, in seconds
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    /// Missing template handling
    #[serde(default)]
    pub missing_template: MissingTemplatePolicy,

    /// Claimed recipients older than this are released back to pending
    #[serde(default = "default_claim_timeout")]
    pub claim_timeout_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
            max_per_pass: default_max_per_pass(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
            missing_template: MissingTemplatePolicy::default(),
            claim_timeout_minutes: default_claim_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    300
}

fn default_max_per_pass() -> u32 {
    3
}

fn default_min_delay() -> u64 {
    5 * 60
}

fn default_max_delay() -> u64 {
    15 * 60
}

fn default_claim_timeout() -> i64 {
    120
}

/// Environment variables honored outside the `OUTREACH__` namespace
const WELL_KNOWN_ENV: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("RESEND_API_KEY", "mailer.resend.api_key"),
    ("RESEND_FROM_EMAIL", "mailer.from_email"),
    ("RESEND_FROM_NAME", "mailer.from_name"),
    ("CRON_SECRET", "api.cron_secret"),
];

impl Config {
    /// Load configuration from a file, ignoring the environment
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        Self::from_sources(Some(path), HashMap::new())
    }

    /// Build configuration from an optional file and an explicit environment map
    pub fn from_sources(path: Option<&Path>, env: HashMap<String, String>) -> crate::Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let overrides: Vec<(&str, Option<String>)> = WELL_KNOWN_ENV
            .iter()
            .map(|(var, key)| (*key, env.get(*var).filter(|v| !v.is_empty()).cloned()))
            .collect();

        builder = builder.add_source(
            ::config::Environment::with_prefix("OUTREACH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.into_iter().collect())),
        );

        for (key, value) in overrides {
            builder = builder
                .set_override_option(key, value)
                .map_err(|e| crate::Error::Config(format!("Invalid override {}: {}", key, e)))?;
        }

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default locations and the process environment
    pub fn load() -> crate::Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();

        let explicit = env.get("OUTREACH_CONFIG").map(PathBuf::from);
        let candidates = [
            PathBuf::from("./outreach.toml"),
            PathBuf::from("/etc/outreach/config.toml"),
        ];

        let path = match explicit {
            Some(path) => Some(path),
            None => candidates.into_iter().find(|p| p.exists()),
        };

        Self::from_sources(path.as_deref(), env)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let scheduler = &self.scheduler;

        if scheduler.max_per_pass == 0 {
            return Err(crate::Error::Config(
                "scheduler.max_per_pass must be at least 1".to_string(),
            ));
        }
        if scheduler.poll_interval_secs == 0 {
            return Err(crate::Error::Config(
                "scheduler.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if scheduler.min_delay_secs > scheduler.max_delay_secs {
            return Err(crate::Error::Config(format!(
                "scheduler.min_delay_secs ({}) exceeds max_delay_secs ({})",
                scheduler.min_delay_secs, scheduler.max_delay_secs
            )));
        }
        if scheduler.claim_timeout_minutes <= 0 {
            return Err(crate::Error::Config(
                "scheduler.claim_timeout_minutes must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
