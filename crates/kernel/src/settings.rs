use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "BIBLIO_ENV";
const CONFIG_DIR_ENV: &str = "BIBLIO_CONFIG_DIR";
const ENV_PREFIX: &str = "BIBLIO";

/// Signing secret used when nothing else is configured. Refused in production.
pub const DEV_JWT_SECRET: &str = "dev-secret-key-change-in-production";

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, environment overlay
    /// and `BIBLIO_*` variables (`__` separates nested keys).
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::current_dir()
                    .map(|cwd| cwd.join("config"))
                    .unwrap_or_else(|_| PathBuf::from("config"))
            });

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment));

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // Override environment field with parsed enum variant.
        settings.environment = match environment.as_str() {
            "local" => Environment::Local,
            "staging" => Environment::Staging,
            "production" => Environment::Production,
            other => {
                return Err(anyhow!(
                    "unsupported environment '{}'; expected local/staging/production",
                    other
                ));
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject combinations that would start a misconfigured service.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.environment == Environment::Production && self.auth.jwt_secret == DEV_JWT_SECRET {
            bail!("auth.jwt_secret must be set in production");
        }
        if self.catalog.default_per_page == 0 || self.catalog.max_per_page == 0 {
            bail!("catalog page sizes must be at least 1");
        }
        if self.catalog.default_per_page > self.catalog.max_per_page {
            bail!(
                "catalog.default_per_page ({}) exceeds catalog.max_per_page ({})",
                self.catalog.default_per_page,
                self.catalog.max_per_page
            );
        }
        if self.catalog.isbn_length == 0 {
            bail!("catalog.isbn_length must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

/// Storage options. Without a snapshot path the catalog lives in memory only.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "TelemetrySettings::default_filter")]
    pub filter: String,
}

impl TelemetrySettings {
    fn default_filter() -> String {
        "info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            filter: Self::default_filter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "AuthSettings::default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "AuthSettings::default_token_ttl_hours")]
    pub token_ttl_hours: u64,
}

impl AuthSettings {
    fn default_jwt_secret() -> String {
        DEV_JWT_SECRET.to_string()
    }

    fn default_token_ttl_hours() -> u64 {
        24
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: Self::default_jwt_secret(),
            token_ttl_hours: Self::default_token_ttl_hours(),
        }
    }
}

/// Catalog rules that are deployment tunables rather than code constants.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    #[serde(default = "CatalogSettings::default_per_page")]
    pub default_per_page: u32,
    #[serde(default = "CatalogSettings::default_max_per_page")]
    pub max_per_page: u32,
    #[serde(default = "CatalogSettings::default_isbn_length")]
    pub isbn_length: usize,
    #[serde(default = "CatalogSettings::default_max_commit_retries")]
    pub max_commit_retries: u32,
}

impl CatalogSettings {
    fn default_per_page() -> u32 {
        10
    }

    fn default_max_per_page() -> u32 {
        100
    }

    fn default_isbn_length() -> usize {
        13
    }

    fn default_max_commit_retries() -> u32 {
        16
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            default_per_page: Self::default_per_page(),
            max_per_page: Self::default_max_per_page(),
            isbn_length: Self::default_isbn_length(),
            max_commit_retries: Self::default_max_commit_retries(),
        }
    }
}

/// `Cache-Control: max-age` values (seconds) advertised per resource.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "CacheSettings::default_books")]
    pub books: u32,
    #[serde(default = "CacheSettings::default_book")]
    pub book: u32,
    #[serde(default = "CacheSettings::default_borrow_records")]
    pub borrow_records: u32,
    #[serde(default = "CacheSettings::default_borrow_record")]
    pub borrow_record: u32,
    #[serde(default = "CacheSettings::default_statistics")]
    pub statistics: u32,
}

impl CacheSettings {
    fn default_books() -> u32 {
        60
    }

    fn default_book() -> u32 {
        120
    }

    fn default_borrow_records() -> u32 {
        30
    }

    fn default_borrow_record() -> u32 {
        60
    }

    fn default_statistics() -> u32 {
        30
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            books: Self::default_books(),
            book: Self::default_book(),
            borrow_records: Self::default_borrow_records(),
            borrow_record: Self::default_borrow_record(),
            statistics: Self::default_statistics(),
        }
    }
}
