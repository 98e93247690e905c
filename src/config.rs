//! Configuration
//!
//! TOML-backed settings for the connector: ERP credentials, buffer store
//! location, remote API access and sync tuning. The CLI loads this once and
//! hands typed pieces to the flows; the engine itself never reads files or
//! environment variables.

use crate::error::SyncError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default remote API base URL (staging tenant)
const DEFAULT_API_URL: &str = "https://api.staging.batisimply.fr";
/// Headquarters attached to pushed projects when none is configured
const DEFAULT_HEAD_QUARTER_ID: i64 = 33;
/// Default lookback window for the timesheet pull, in days
const DEFAULT_HEURES_DAYS_BACK: u32 = 180;

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// ERP source connection settings
    pub erp: ErpCredentials,
    /// Buffer store location
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Remote API and token endpoint settings
    pub remote: RemoteCredentials,
    /// Sync tuning knobs
    #[serde(default)]
    pub sync: SyncSettings,
}

impl AppConfig {
    /// Load and parse the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("invalid config file: {}", e)))?;
        Ok(config)
    }

    /// Default config file location under the platform config directory
    pub fn default_path() -> Result<PathBuf, SyncError> {
        let dirs = ProjectDirs::from("com", "batisync", "batisync")
            .ok_or_else(|| SyncError::Config("cannot determine config directory".to_string()))?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Resolve the buffer database path, falling back to the platform data directory
    pub fn buffer_path(&self) -> Result<PathBuf, SyncError> {
        if let Some(path) = &self.buffer.path {
            return Ok(path.clone());
        }
        let dirs = ProjectDirs::from("com", "batisync", "batisync")
            .ok_or_else(|| SyncError::Config("cannot determine data directory".to_string()))?;
        Ok(dirs.data_dir().join("buffer.duckdb"))
    }
}

/// Which ERP backend the connector talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErpKind {
    /// Batigest over SQL Server
    Batigest,
    /// Codial over HFSQL
    Codial,
}

impl fmt::Display for ErpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErpKind::Batigest => write!(f, "batigest"),
            ErpKind::Codial => write!(f, "codial"),
        }
    }
}

/// ERP connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErpCredentials {
    pub kind: ErpKind,
    pub server: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    /// Server port, HFSQL only (defaults to 4900 when absent)
    #[serde(default)]
    pub port: Option<String>,
    /// Pre-declared ODBC data source name, HFSQL only; takes precedence over
    /// the driver string when set
    #[serde(default)]
    pub dsn: Option<String>,
}

impl ErpCredentials {
    /// Check that the fields a connection attempt needs are present
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.server.trim().is_empty() && self.dsn.as_deref().unwrap_or("").trim().is_empty() {
            return Err(SyncError::Config(
                "ERP server (or dsn) is not configured".to_string(),
            ));
        }
        if self.database.trim().is_empty() {
            return Err(SyncError::Config("ERP database is not configured".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(SyncError::Config("ERP user is not configured".to_string()));
        }
        Ok(())
    }

    /// ODBC connection string for the configured backend
    pub fn connection_string(&self) -> String {
        self.build_connection_string(&self.password)
    }

    /// Connection string with the password masked, safe for logs
    pub fn redacted_connection_string(&self) -> String {
        self.build_connection_string("***")
    }

    fn build_connection_string(&self, password: &str) -> String {
        match self.kind {
            ErpKind::Batigest => format!(
                "DRIVER={{ODBC Driver 17 for SQL Server}};SERVER={};DATABASE={};UID={};PWD={};TrustServerCertificate=yes",
                self.server, self.database, self.user, password
            ),
            ErpKind::Codial => {
                if let Some(dsn) = self.dsn.as_deref().filter(|d| !d.trim().is_empty()) {
                    format!("DSN={};UID={};PWD={}", dsn, self.user, password)
                } else {
                    let port = self.port.as_deref().unwrap_or("4900");
                    format!(
                        "DRIVER={{HFSQL}};Server Name={};Server Port={};Database={};UID={};PWD={}",
                        self.server, port, self.database, self.user, password
                    )
                }
            }
        }
    }
}

/// Buffer store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Database file path; platform data directory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Remote API and authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCredentials {
    /// API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Token endpoint (password grant)
    pub auth_url: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// Headquarters id embedded in project payloads
    #[serde(default = "default_head_quarter_id")]
    pub head_quarter_id: i64,
}

/// Sync tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Which upstream entity feeds the remote side
    #[serde(default)]
    pub mode: SyncMode,
    /// Timesheet pull window, counted back from today
    #[serde(default = "default_heures_days_back")]
    pub heures_days_back: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            heures_days_back: DEFAULT_HEURES_DAYS_BACK,
        }
    }
}

/// Upstream entity selection for the to-remote pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Chantier,
    Devis,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Chantier => write!(f, "chantier"),
            SyncMode::Devis => write!(f, "devis"),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_head_quarter_id() -> i64 {
    DEFAULT_HEAD_QUARTER_ID
}

fn default_heures_days_back() -> u32 {
    DEFAULT_HEURES_DAYS_BACK
}
