use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::mirror::{extract_notion_id, notion, DEFAULT_PAGE_URL_PREFIX};
use crate::store::FirestoreSettings;
use crate::sync::{DatabaseTargets, DatePrecision, SyncSettings};
use crate::timestamp::DEFAULT_UTC_OFFSET_MINUTES;

pub const CONFIG_FILE: &str = "fab-tracker.toml";
pub const RC_FILE: &str = ".fab-tracker-rc";
pub const ENV_PREFIX: &str = "FAB_TRACKER";

/// Main configuration structure for fab-tracker
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrackerConfig {
    pub store: StoreConfig,
    pub mirror: MirrorConfig,
    pub time: TimeConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Firestore,
    File,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Firestore REST endpoint root
    pub api_base: String,
    pub project_id: String,
    pub collection: String,
    /// Firebase ID token (can be set via env var)
    pub id_token: Option<String>,
    /// Directory for the file backend
    pub data_dir: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorBackend {
    Notion,
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MirrorConfig {
    pub enabled: bool,
    pub backend: MirrorBackend,
    /// Integration token (can be set via env var)
    pub token: Option<String>,
    pub api_base: String,
    pub api_version: String,
    /// Database share URLs or bare ids
    pub databases: DatabaseConfig,
    pub page_url_prefix: String,
    pub requests_per_second: u32,
    pub timeout_seconds: u64,
    pub date_precision: DatePrecision,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub fab: Option<String>,
    pub bluefors: Option<String>,
    pub iceoxford: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TimeConfig {
    /// Offset of the local timestamps from UTC, in minutes
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                backend: StoreBackend::File,
                api_base: "https://firestore.googleapis.com/v1".to_string(),
                project_id: String::new(),
                collection: "runs".to_string(),
                id_token: None, // FIRESTORE_ID_TOKEN
                data_dir: ".fab-tracker/runs".to_string(),
                timeout_seconds: 30,
            },
            mirror: MirrorConfig {
                enabled: false,
                backend: MirrorBackend::Notion,
                token: None, // NOTION_TOKEN
                api_base: notion::DEFAULT_API_BASE.to_string(),
                api_version: notion::DEFAULT_API_VERSION.to_string(),
                databases: DatabaseConfig::default(),
                page_url_prefix: DEFAULT_PAGE_URL_PREFIX.to_string(),
                requests_per_second: 3,
                timeout_seconds: 30,
                date_precision: DatePrecision::Date,
            },
            time: TimeConfig {
                utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json: true,
            },
        }
    }
}

impl TrackerConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (fab-tracker.toml, .fab-tracker-rc, then `explicit`)
    /// 3. Environment variables (FAB_TRACKER_STORE__PROJECT_ID, ...)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&TrackerConfig::default()).context("Failed to encode default configuration")?;
        let mut builder = Config::builder().add_source(defaults);

        if Path::new(CONFIG_FILE).exists() {
            builder = builder.add_source(File::new(CONFIG_FILE, FileFormat::Toml));
        }
        if Path::new(RC_FILE).exists() {
            builder = builder.add_source(File::new(RC_FILE, FileFormat::Toml));
        }
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut tracker_config: TrackerConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        tracker_config.apply_token_fallbacks();
        Ok(tracker_config)
    }

    fn apply_token_fallbacks(&mut self) {
        if self.store.id_token.is_none() {
            self.store.id_token = std::env::var("FIRESTORE_ID_TOKEN").ok().filter(|t| !t.is_empty());
        }
        if self.mirror.token.is_none() {
            self.mirror.token = std::env::var("NOTION_TOKEN").ok().filter(|t| !t.is_empty());
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn firestore_settings(&self) -> FirestoreSettings {
        FirestoreSettings {
            api_base: self.store.api_base.clone(),
            project_id: self.store.project_id.clone(),
            collection: self.store.collection.clone(),
            id_token: self.store.id_token.clone(),
            timeout: Duration::from_secs(self.store.timeout_seconds),
        }
    }

    pub fn notion_settings(&self) -> notion::NotionSettings {
        notion::NotionSettings {
            api_base: self.mirror.api_base.clone(),
            api_version: self.mirror.api_version.clone(),
            token: self.mirror.token.clone().unwrap_or_default(),
            requests_per_second: self.mirror.requests_per_second,
            timeout: Duration::from_secs(self.mirror.timeout_seconds),
        }
    }

    /// Sync settings with database URLs reduced to ids. Unparseable
    /// entries leave that database unconfigured.
    pub fn sync_settings(&self) -> SyncSettings {
        let database_id = |raw: &Option<String>| {
            let raw = raw.as_deref()?;
            let id = extract_notion_id(raw);
            if id.is_none() {
                tracing::warn!(database = raw, "Could not read a database id, mirror disabled for it");
            }
            id
        };
        SyncSettings {
            databases: DatabaseTargets {
                fab: database_id(&self.mirror.databases.fab),
                bluefors: database_id(&self.mirror.databases.bluefors),
                iceoxford: database_id(&self.mirror.databases.iceoxford),
            },
            page_url_prefix: self.mirror.page_url_prefix.clone(),
            date_precision: self.mirror.date_precision,
            utc_offset_minutes: self.time.utc_offset_minutes,
        }
    }
}
