//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::{IpAddr, SocketAddr},
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "marketlens";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 100;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 10;
const DEFAULT_DB_MAX_LIFETIME_SECS: u64 = 3600;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_SCAN_BATCH: u64 = 100;
const MIN_JWT_SECRET_BYTES: usize = 32;
const DEFAULT_JWT_ISSUER: &str = "marketlens";
const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_ARGON2_MEMORY_KIB: u32 = 65_536;
const DEFAULT_ARGON2_ITERATIONS: u32 = 3;
const DEFAULT_ARGON2_PARALLELISM: u32 = 1;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 100;
const DEFAULT_LOGIN_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_LOGIN_MAX_ATTEMPTS: u64 = 5;
const DEFAULT_CSRF_TTL_SECS: u64 = 3600;
const DEFAULT_CSRF_COOKIE: &str = "csrf_token";
const DEFAULT_CSRF_HEADER: &str = "X-CSRF-Token";
const DEFAULT_AUDIT_QUEUE_CAPACITY: u64 = 100;
const DEFAULT_AUDIT_FLUSH_DEADLINE_SECS: u64 = 5;
const DEFAULT_SCHEDULER_CADENCE_SECS: u64 = 60;
const DEFAULT_CDN_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const DEFAULT_CDN_TIMEOUT_SECS: u64 = 30;

/// Command-line arguments for the MarketLens binary.
#[derive(Debug, Parser)]
#[command(name = "marketlens", version, about = "MarketLens editorial API server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MARKETLENS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API, the scheduler and the audit worker.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the maximum request body size in bytes.
    #[arg(long = "server-max-body-bytes", value_name = "BYTES")]
    pub server_max_body_bytes: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Select the cache backend (redis|memory).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the cache connection URL.
    #[arg(long = "cache-url", value_name = "URL")]
    pub cache_url: Option<String>,

    /// Override the rate limit window size.
    #[arg(long = "rate-limit-window-seconds", value_name = "SECONDS")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Override the rate limit request ceiling.
    #[arg(long = "rate-limit-max-requests", value_name = "COUNT")]
    pub rate_limit_max_requests: Option<u64>,

    /// Override the scheduled publishing cadence.
    #[arg(long = "scheduler-cadence-seconds", value_name = "SECONDS")]
    pub scheduler_cadence_seconds: Option<u64>,

    /// Enable or disable the scheduled publishing task.
    #[arg(
        long = "scheduler-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub scheduler_enabled: Option<bool>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitSettings,
    pub csrf: CsrfSettings,
    pub audit: AuditSettings,
    pub scheduler: SchedulerSettings,
    pub cdn: CdnSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown cache backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub url: String,
    pub default_ttl: Duration,
    pub scan_batch: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Signing secret; `serve` refuses to start without one.
    pub jwt_secret: Option<String>,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u64,
    pub login_window: Duration,
    pub login_max_attempts: u64,
    /// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are believed.
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Debug, Clone)]
pub struct CsrfSettings {
    pub token_ttl: Duration,
    pub cookie_name: String,
    pub header_name: String,
    pub secure_cookie: bool,
}

#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub queue_capacity: usize,
    pub flush_deadline: Duration,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub cadence: Duration,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct CdnSettings {
    pub account_id: Option<String>,
    pub api_token: Option<String>,
    pub api_base: String,
    pub delivery_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("MARKETLENS").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    auth: RawAuthSettings,
    rate_limit: RawRateLimitSettings,
    csrf: RawCsrfSettings,
    audit: RawAuditSettings,
    scheduler: RawSchedulerSettings,
    cdn: RawCdnSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(bytes) = overrides.server_max_body_bytes {
            self.server.max_body_bytes = Some(bytes);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.cache_url.as_ref() {
            self.cache.url = Some(url.clone());
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = Some(max);
        }
        if let Some(cadence) = overrides.scheduler_cadence_seconds {
            self.scheduler.cadence_seconds = Some(cadence);
        }
        if let Some(enabled) = overrides.scheduler_enabled {
            self.scheduler.enabled = Some(enabled);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            auth,
            rate_limit,
            csrf,
            audit,
            scheduler,
            cdn,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            auth: build_auth_settings(auth)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
            csrf: build_csrf_settings(csrf)?,
            audit: build_audit_settings(audit)?,
            scheduler: build_scheduler_settings(scheduler)?,
            cdn: build_cdn_settings(cdn)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = positive_secs(
        server.graceful_shutdown_seconds,
        DEFAULT_GRACEFUL_SHUTDOWN_SECS,
        "server.graceful_shutdown_seconds",
    )?;

    let max_body = server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    if max_body == 0 {
        return Err(LoadError::invalid(
            "server.max_body_bytes",
            "must be greater than zero",
        ));
    }
    let max_body_bytes = usize::try_from(max_body).map_err(|_| {
        LoadError::invalid(
            "server.max_body_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown: graceful_secs,
        max_body_bytes,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    let min_connections = database
        .min_connections
        .unwrap_or(DEFAULT_DB_MIN_CONNECTIONS);
    if min_connections > max_connections.get() {
        return Err(LoadError::invalid(
            "database.min_connections",
            "must not exceed database.max_connections",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
        min_connections,
        max_lifetime: positive_secs(
            database.max_lifetime_seconds,
            DEFAULT_DB_MAX_LIFETIME_SECS,
            "database.max_lifetime_seconds",
        )?,
        acquire_timeout: positive_secs(
            database.acquire_timeout_seconds,
            DEFAULT_DB_ACQUIRE_TIMEOUT_SECS,
            "database.acquire_timeout_seconds",
        )?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend {
        Some(value) => CacheBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackend::Redis,
    };
    let url = non_blank(cache.url).unwrap_or_else(|| DEFAULT_CACHE_URL.to_string());

    let scan_batch = cache.scan_batch.unwrap_or(DEFAULT_CACHE_SCAN_BATCH);
    let scan_batch = usize::try_from(scan_batch)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid("cache.scan_batch", "must be greater than zero"))?;

    Ok(CacheSettings {
        backend,
        url,
        default_ttl: positive_secs(
            cache.default_ttl_seconds,
            DEFAULT_CACHE_TTL_SECS,
            "cache.default_ttl_seconds",
        )?,
        scan_batch,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let jwt_secret = non_blank(auth.jwt_secret);
    if let Some(secret) = jwt_secret.as_deref()
        && secret.len() < MIN_JWT_SECRET_BYTES
    {
        return Err(LoadError::invalid(
            "auth.jwt_secret",
            format!("must be at least {MIN_JWT_SECRET_BYTES} bytes"),
        ));
    }

    let issuer = non_blank(auth.issuer).unwrap_or_else(|| DEFAULT_JWT_ISSUER.to_string());
    let access_ttl = positive_secs(
        auth.access_ttl_seconds,
        DEFAULT_ACCESS_TTL_SECS,
        "auth.access_ttl_seconds",
    )?;
    let refresh_ttl = positive_secs(
        auth.refresh_ttl_seconds,
        DEFAULT_REFRESH_TTL_SECS,
        "auth.refresh_ttl_seconds",
    )?;
    if refresh_ttl <= access_ttl {
        return Err(LoadError::invalid(
            "auth.refresh_ttl_seconds",
            "must be longer than auth.access_ttl_seconds",
        ));
    }

    Ok(AuthSettings {
        jwt_secret,
        issuer,
        access_ttl,
        refresh_ttl,
        argon2_memory_kib: non_zero_u32(
            auth.argon2_memory_kib
                .unwrap_or(DEFAULT_ARGON2_MEMORY_KIB)
                .into(),
            "auth.argon2_memory_kib",
        )?
        .get(),
        argon2_iterations: non_zero_u32(
            auth.argon2_iterations
                .unwrap_or(DEFAULT_ARGON2_ITERATIONS)
                .into(),
            "auth.argon2_iterations",
        )?
        .get(),
        argon2_parallelism: non_zero_u32(
            auth.argon2_parallelism
                .unwrap_or(DEFAULT_ARGON2_PARALLELISM)
                .into(),
            "auth.argon2_parallelism",
        )?
        .get(),
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let max_requests = rate_limit
        .max_requests
        .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS);
    if max_requests == 0 {
        return Err(LoadError::invalid(
            "rate_limit.max_requests",
            "must be greater than zero",
        ));
    }
    let login_max_attempts = rate_limit
        .login_max_attempts
        .unwrap_or(DEFAULT_LOGIN_MAX_ATTEMPTS);
    if login_max_attempts == 0 {
        return Err(LoadError::invalid(
            "rate_limit.login_max_attempts",
            "must be greater than zero",
        ));
    }

    Ok(RateLimitSettings {
        window: positive_secs(
            rate_limit.window_seconds,
            DEFAULT_RATE_LIMIT_WINDOW_SECS,
            "rate_limit.window_seconds",
        )?,
        max_requests,
        login_window: positive_secs(
            rate_limit.login_window_seconds,
            DEFAULT_LOGIN_WINDOW_SECS,
            "rate_limit.login_window_seconds",
        )?,
        login_max_attempts,
        trusted_proxies: parse_trusted_proxies(rate_limit.trusted_proxies)?,
    })
}

fn parse_trusted_proxies(raw: Option<ProxyList>) -> Result<Vec<IpAddr>, LoadError> {
    let entries = match raw {
        None => return Ok(Vec::new()),
        Some(ProxyList::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
        Some(ProxyList::Items(items)) => items,
    };
    entries
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            IpAddr::from_str(entry).map_err(|_| {
                LoadError::invalid(
                    "rate_limit.trusted_proxies",
                    format!("`{entry}` is not an IP address"),
                )
            })
        })
        .collect()
}

fn build_csrf_settings(csrf: RawCsrfSettings) -> Result<CsrfSettings, LoadError> {
    Ok(CsrfSettings {
        token_ttl: positive_secs(
            csrf.token_ttl_seconds,
            DEFAULT_CSRF_TTL_SECS,
            "csrf.token_ttl_seconds",
        )?,
        cookie_name: non_blank(csrf.cookie_name).unwrap_or_else(|| DEFAULT_CSRF_COOKIE.to_string()),
        header_name: non_blank(csrf.header_name).unwrap_or_else(|| DEFAULT_CSRF_HEADER.to_string()),
        secure_cookie: csrf.secure_cookie.unwrap_or(true),
    })
}

fn build_audit_settings(audit: RawAuditSettings) -> Result<AuditSettings, LoadError> {
    let capacity = audit.queue_capacity.unwrap_or(DEFAULT_AUDIT_QUEUE_CAPACITY);
    let queue_capacity = usize::try_from(capacity)
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| LoadError::invalid("audit.queue_capacity", "must be greater than zero"))?;

    Ok(AuditSettings {
        queue_capacity,
        flush_deadline: positive_secs(
            audit.flush_deadline_seconds,
            DEFAULT_AUDIT_FLUSH_DEADLINE_SECS,
            "audit.flush_deadline_seconds",
        )?,
    })
}

fn build_scheduler_settings(
    scheduler: RawSchedulerSettings,
) -> Result<SchedulerSettings, LoadError> {
    Ok(SchedulerSettings {
        cadence: positive_secs(
            scheduler.cadence_seconds,
            DEFAULT_SCHEDULER_CADENCE_SECS,
            "scheduler.cadence_seconds",
        )?,
        enabled: scheduler.enabled.unwrap_or(true),
    })
}

fn build_cdn_settings(cdn: RawCdnSettings) -> Result<CdnSettings, LoadError> {
    let api_base = non_blank(cdn.api_base)
        .unwrap_or_else(|| DEFAULT_CDN_API_BASE.to_string())
        .trim_end_matches('/')
        .to_string();
    url::Url::parse(&api_base)
        .map_err(|err| LoadError::invalid("cdn.api_base", format!("invalid URL: {err}")))?;

    Ok(CdnSettings {
        account_id: non_blank(cdn.account_id),
        api_token: non_blank(cdn.api_token),
        api_base,
        delivery_url: non_blank(cdn.delivery_url),
        timeout: positive_secs(
            cdn.timeout_seconds,
            DEFAULT_CDN_TIMEOUT_SECS,
            "cdn.timeout_seconds",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    min_connections: Option<u32>,
    max_lifetime_seconds: Option<u64>,
    acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    url: Option<String>,
    default_ttl_seconds: Option<u64>,
    scan_batch: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    jwt_secret: Option<String>,
    issuer: Option<String>,
    access_ttl_seconds: Option<u64>,
    refresh_ttl_seconds: Option<u64>,
    argon2_memory_kib: Option<u32>,
    argon2_iterations: Option<u32>,
    argon2_parallelism: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
    login_window_seconds: Option<u64>,
    login_max_attempts: Option<u64>,
    trusted_proxies: Option<ProxyList>,
}

/// A TOML array, or a comma-separated string from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ProxyList {
    Joined(String),
    Items(Vec<String>),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCsrfSettings {
    token_ttl_seconds: Option<u64>,
    cookie_name: Option<String>,
    header_name: Option<String>,
    secure_cookie: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuditSettings {
    queue_capacity: Option<u64>,
    flush_deadline_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    cadence_seconds: Option<u64>,
    enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCdnSettings {
    account_id: Option<String>,
    api_token: Option<String>,
    api_base: Option<String>,
    delivery_url: Option<String>,
    timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn positive_secs(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
