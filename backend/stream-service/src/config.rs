/// Configuration management for stream-service
///
/// Loads configuration from environment variables with sensible defaults.
/// Secrets are redacted from `Debug` output.
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub cors: CorsConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub provider: ProviderConfig,
    pub webhook: WebhookConfig,
    pub reconciler: ReconcilerConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub run_migrations: bool,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("backend", &self.backend)
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("max_lifetime_secs", &self.max_lifetime_secs)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for bearer tokens and playback access keys
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Livepeer,
    Janus,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "livepeer" => Ok(ProviderKind::Livepeer),
            "janus" => Ok(ProviderKind::Janus),
            other => Err(format!("unknown MEDIA_PROVIDER '{other}'")),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub livepeer_api_url: String,
    pub livepeer_api_key: String,
    /// Playback-policy webhook registered with the provider for private streams
    pub livepeer_webhook_id: Option<String>,
    pub janus_server_url: String,
    pub janus_room_id: u64,
    pub janus_api_secret: Option<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("livepeer_api_url", &self.livepeer_api_url)
            .field("livepeer_api_key", &"[REDACTED]")
            .field("livepeer_webhook_id", &self.livepeer_webhook_id)
            .field("janus_server_url", &self.janus_server_url)
            .field("janus_room_id", &self.janus_room_id)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct WebhookConfig {
    pub shared_secret: Option<String>,
    /// Maximum accepted age of the signature timestamp; 0 disables the check
    pub tolerance_secs: u64,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("shared_secret", &self.shared_secret.as_ref().map(|_| "[REDACTED]"))
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReconcilerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub stale_after_secs: i64,
    pub max_attempts: i32,
    pub batch_size: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            stale_after_secs: 60,
            max_attempts: 10,
            batch_size: 50,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let backend = match env_or("STORE_BACKEND", "postgres".to_string()).as_str() {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => return Err(format!("unknown STORE_BACKEND '{other}'")),
        };

        let database_url = std::env::var("DATABASE_URL").unwrap_or_default();
        if backend == StoreBackend::Postgres && database_url.is_empty() {
            return Err("DATABASE_URL environment variable not set".to_string());
        }

        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "JWT_SECRET environment variable not set".to_string())?;

        let kind: ProviderKind = env_or("MEDIA_PROVIDER", "livepeer".to_string()).parse()?;
        let livepeer_api_key = std::env::var("LIVEPEER_API_KEY").unwrap_or_default();
        if kind == ProviderKind::Livepeer && livepeer_api_key.is_empty() {
            return Err("LIVEPEER_API_KEY must be set when MEDIA_PROVIDER=livepeer".to_string());
        }

        let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec!["*".to_string()]);

        Ok(Config {
            app: AppConfig {
                host: env_or("STREAM_SERVICE_HOST", "0.0.0.0".to_string()),
                port: env_or("STREAM_SERVICE_PORT", 8085),
                env: env_or("APP_ENV", "development".to_string()),
            },
            cors: CorsConfig { allowed_origins },
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections: env_or("DB_MAX_CONNECTIONS", 10),
                min_connections: env_or("DB_MIN_CONNECTIONS", 2),
                connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 5),
                acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", 10),
                idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 600),
                max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
                run_migrations: env_or("DB_RUN_MIGRATIONS", true),
            },
            auth: AuthConfig {
                jwt_secret,
                access_token_ttl_secs: env_or("ACCESS_TOKEN_TTL_SECS", 2 * 60 * 60),
            },
            provider: ProviderConfig {
                kind,
                livepeer_api_url: env_or(
                    "LIVEPEER_API_URL",
                    "https://livepeer.studio/api".to_string(),
                ),
                livepeer_api_key,
                livepeer_webhook_id: non_empty_var("LIVEPEER_WEBHOOK_ID"),
                janus_server_url: env_or(
                    "JANUS_SERVER_URL",
                    "http://localhost:8088/janus".to_string(),
                ),
                janus_room_id: env_or("JANUS_ROOM_ID", 1234),
                janus_api_secret: non_empty_var("JANUS_API_SECRET"),
                timeout_ms: env_or("PROVIDER_TIMEOUT_MS", 10_000),
                max_retries: env_or("PROVIDER_MAX_RETRIES", 3),
                initial_backoff_ms: env_or("PROVIDER_INITIAL_BACKOFF_MS", 200),
            },
            webhook: WebhookConfig {
                shared_secret: non_empty_var("LIVEPEER_SHARED_SECRET"),
                tolerance_secs: env_or("WEBHOOK_TOLERANCE_SECS", 0),
            },
            reconciler: ReconcilerConfig {
                enabled: env_or("RECONCILER_ENABLED", true),
                interval_secs: env_or("RECONCILER_INTERVAL_SECS", 30),
                stale_after_secs: env_or("RECONCILER_STALE_AFTER_SECS", 60),
                max_attempts: env_or("RECONCILER_MAX_ATTEMPTS", 10),
                batch_size: env_or("RECONCILER_BATCH_SIZE", 50),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.env == "production"
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
