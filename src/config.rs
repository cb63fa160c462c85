use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub components: Vec<Component>,
    pub broker: BrokerConfig,
    pub topics: TopicsConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub builder: BuilderConfig,
    pub matcher: MatcherConfig,
    pub retry: RetryConfig,
    pub channels: ChannelConfig,
}

/// Pipeline components a process can host.
///
/// The snapshot builder must run as a single instance: two builders racing on
/// the snapshot blob would corrupt it. Enforce that by scheduling exactly one
/// process whose `PIPELINE_COMPONENTS` contains `builder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Builder,
    Matcher,
    Notifier,
    Dispatcher,
}

impl FromStr for Component {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "builder" => Ok(Component::Builder),
            "matcher" => Ok(Component::Matcher),
            "notifier" => Ok(Component::Notifier),
            "dispatcher" => Ok(Component::Dispatcher),
            other => Err(ConfigError::UnknownComponent(other.to_string())),
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Component::Builder => write!(f, "builder"),
            Component::Matcher => write!(f, "matcher"),
            Component::Notifier => write!(f, "notifier"),
            Component::Dispatcher => write!(f, "dispatcher"),
        }
    }
}

/// Event bus connection configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub brokers: String,
    pub group_id: String,
    pub session_timeout: Duration,
    pub write_timeout: Duration,
    /// Poison messages go here when set; without it they are logged and skipped.
    pub dead_letter_topic: Option<String>,
}

/// Topic names for the pipeline stages
#[derive(Debug, Clone)]
pub struct TopicsConfig {
    pub alerts: String,
    pub matched: String,
    pub ready: String,
    pub rule_changed: String,
}

/// Shared cache (snapshot blob + version counter) configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub url: String,
    pub snapshot_key: String,
    pub version_key: String,
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

/// Snapshot builder configuration
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Consecutive incremental-apply failures before forcing a full rebuild.
    pub rebuild_threshold: u32,
    /// Pause between rebuild attempts when the rule store is unreachable.
    pub rebuild_backoff: Duration,
}

/// Matcher and hot-reload configuration
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Interval of the cache version poll. Rule-changed events shorten the
    /// detection tail; the poll is the safety net.
    pub poll_interval: Duration,
}

/// Retry/backoff budget shared by all components
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Delivery channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub smtp: SmtpConfig,
    /// HMAC signing secret for webhook posts; unsigned when absent.
    pub webhook_secret: Option<String>,
    pub http_timeout: Duration,
}

/// Global SMTP settings for the email channel
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            components: parse_components(
                &env::var("PIPELINE_COMPONENTS")
                    .unwrap_or_else(|_| "builder,matcher,notifier,dispatcher".to_string()),
            )?,
            broker: BrokerConfig::from_env()?,
            topics: TopicsConfig::from_env(),
            cache: CacheConfig::from_env(),
            database: DatabaseConfig::from_env()?,
            builder: BuilderConfig::from_env(),
            matcher: MatcherConfig::from_env(),
            retry: RetryConfig::from_env(),
            channels: ChannelConfig::from_env(),
        })
    }
}

fn parse_components(raw: &str) -> Result<Vec<Component>, ConfigError> {
    let mut components = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let component = part.parse()?;
        if !components.contains(&component) {
            components.push(component);
        }
    }
    if components.is_empty() {
        return Err(ConfigError::NoComponents);
    }
    Ok(components)
}

impl BrokerConfig {
    /// Load event bus configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let brokers = env::var("KAFKA_BROKERS").map_err(|_| ConfigError::MissingBrokers)?;

        Ok(Self {
            brokers,
            group_id: env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "alertpipe".to_string()),
            session_timeout: duration_secs("KAFKA_SESSION_TIMEOUT_SECS", 6),
            write_timeout: duration_secs("KAFKA_WRITE_TIMEOUT_SECS", 10),
            dead_letter_topic: env::var("KAFKA_DEAD_LETTER_TOPIC").ok(),
        })
    }
}

impl TopicsConfig {
    /// Load topic names from environment variables
    pub fn from_env() -> Self {
        Self {
            alerts: env::var("TOPIC_ALERTS").unwrap_or_else(|_| "alerts.new".to_string()),
            matched: env::var("TOPIC_MATCHED").unwrap_or_else(|_| "alerts.matched".to_string()),
            ready: env::var("TOPIC_READY").unwrap_or_else(|_| "notifications.ready".to_string()),
            rule_changed: env::var("TOPIC_RULE_CHANGED")
                .unwrap_or_else(|_| "rule.changed".to_string()),
        }
    }
}

impl CacheConfig {
    /// Load cache configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            url: env::var("CACHE_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            snapshot_key: env::var("CACHE_SNAPSHOT_KEY")
                .unwrap_or_else(|_| "alertpipe:snapshot".to_string()),
            version_key: env::var("CACHE_VERSION_KEY")
                .unwrap_or_else(|_| "alertpipe:snapshot:version".to_string()),
        }
    }
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            url,
            max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: parsed_or("DATABASE_MIN_CONNECTIONS", 1),
            acquire_timeout: duration_secs("DATABASE_ACQUIRE_TIMEOUT_SECS", 5),
            idle_timeout: duration_secs("DATABASE_IDLE_TIMEOUT_SECS", 600),
            max_lifetime: duration_secs("DATABASE_MAX_LIFETIME_SECS", 1800),
        })
    }
}

impl BuilderConfig {
    /// Load builder configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            rebuild_threshold: parsed_or("BUILDER_REBUILD_THRESHOLD", 5),
            rebuild_backoff: duration_secs("BUILDER_REBUILD_BACKOFF_SECS", 5),
        }
    }
}

impl MatcherConfig {
    /// Load matcher configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            poll_interval: duration_secs("MATCHER_POLL_INTERVAL_SECS", 5),
        }
    }
}

impl RetryConfig {
    /// Load retry configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            max_retries: parsed_or("RETRY_MAX_RETRIES", 3),
            base_delay: Duration::from_millis(parsed_or("RETRY_BASE_DELAY_MS", 100)),
            max_delay: Duration::from_millis(parsed_or("RETRY_MAX_DELAY_MS", 5000)),
        }
    }
}

impl ChannelConfig {
    /// Load channel configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            smtp: SmtpConfig::from_env(),
            webhook_secret: env::var("WEBHOOK_SIGNING_SECRET").ok(),
            http_timeout: duration_secs("CHANNEL_HTTP_TIMEOUT_SECS", 30),
        }
    }
}

impl SmtpConfig {
    /// Load SMTP settings from environment variables
    pub fn from_env() -> Self {
        Self {
            host: env::var("SMTP_HOST").ok(),
            port: parsed_or("SMTP_PORT", 587),
            username: env::var("SMTP_USERNAME").ok(),
            password: env::var("SMTP_PASSWORD").ok(),
            from_address: env::var("SMTP_FROM")
                .unwrap_or_else(|_| "alerts@alertpipe.local".to_string()),
        }
    }
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn duration_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(parsed_or(key, default))
}

#[derive(Debug)]
pub enum ConfigError {
    MissingBrokers,
    MissingDatabaseUrl,
    UnknownComponent(String),
    NoComponents,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingBrokers => {
                write!(f, "KAFKA_BROKERS environment variable is required")
            }
            ConfigError::MissingDatabaseUrl => {
                write!(f, "DATABASE_URL environment variable is required")
            }
            ConfigError::UnknownComponent(name) => {
                write!(
                    f,
                    "unknown component '{}' in PIPELINE_COMPONENTS (expected builder, matcher, notifier, dispatcher)",
                    name
                )
            }
            ConfigError::NoComponents => {
                write!(f, "PIPELINE_COMPONENTS must name at least one component")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
