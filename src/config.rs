use crate::defaults;
use crate::error::{MindtrackError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub paths: PathsConfig,
    pub providers: ProvidersConfig,
    pub timeouts: TimeoutConfig,
    pub sessions: SessionConfig,
    pub storage: StorageConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to call the API from a browser.
    pub allowed_origins: Vec<String>,
}

/// Shared-secret credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// End-user password checked by the login endpoint.
    pub app_password: String,
    /// Require the end-user password on every job endpoint, not just login.
    pub enforce_app_password: bool,
    /// Credential for the admin settings endpoints. Unset disables them.
    pub admin_password: Option<String>,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Parent of the per-job workspaces.
    pub workspace_root: PathBuf,
    /// Background music mixed under every meditation.
    pub music_path: PathBuf,
    /// Where the local artifact store keeps finished meditations.
    pub archive_dir: PathBuf,
}

/// External provider endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai_base_url: String,
    pub elevenlabs_base_url: String,
}

/// Per-call limits for external work
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "duration_str")]
    pub llm: Duration,
    #[serde(with = "duration_str")]
    pub speech: Duration,
    #[serde(with = "duration_str")]
    pub tool: Duration,
    #[serde(with = "duration_str")]
    pub storage: Duration,
}

/// Session registry housekeeping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(with = "duration_str")]
    pub retention: Duration,
    #[serde(with = "duration_str")]
    pub sweep_interval: Duration,
}

/// Durable storage and settings backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub bucket: String,
    pub records_table: String,
    pub settings_table: String,
    /// Fail the job when the final artifact cannot be persisted.
    pub strict: bool,
}

/// Storage backend enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Supabase,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_HOST.to_string(),
            port: defaults::DEFAULT_PORT,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
            ],
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_password: defaults::DEFAULT_APP_PASSWORD.to_string(),
            enforce_app_password: false,
            admin_password: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            workspace_root: defaults::workspace_root(),
            music_path: PathBuf::from(defaults::MUSIC_PATH),
            archive_dir: defaults::archive_dir(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai_base_url: defaults::OPENAI_BASE_URL.to_string(),
            elevenlabs_base_url: defaults::ELEVENLABS_BASE_URL.to_string(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm: defaults::LLM_TIMEOUT,
            speech: defaults::SPEECH_TIMEOUT,
            tool: defaults::TOOL_TIMEOUT,
            storage: defaults::STORAGE_TIMEOUT,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retention: defaults::SESSION_RETENTION,
            sweep_interval: defaults::SWEEP_INTERVAL,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            supabase_url: None,
            supabase_key: None,
            bucket: defaults::STORAGE_BUCKET.to_string(),
            records_table: defaults::RECORDS_TABLE.to_string(),
            settings_table: defaults::SETTINGS_TABLE.to_string(),
            strict: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(MindtrackError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Supported keys:
    /// - MINDTRACK_HOST → server.host
    /// - MINDTRACK_PORT, PORT → server.port
    /// - FRONTEND_URL → appended to server.allowed_origins
    /// - MINDTRACK_APP_PASSWORD, APP_PASSWORD → auth.app_password
    /// - MINDTRACK_ADMIN_PASSWORD → auth.admin_password
    /// - MINDTRACK_WORKSPACE_ROOT → paths.workspace_root
    /// - MINDTRACK_MUSIC_PATH → paths.music_path
    /// - SUPABASE_URL, SUPABASE_KEY → storage.* (and switch the backend to supabase)
    ///
    /// Empty values are ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(key))
                .find(|value| !value.trim().is_empty())
        };

        if let Some(host) = get(&["MINDTRACK_HOST"]) {
            self.server.host = host;
        }

        if let Some(raw) = get(&["MINDTRACK_PORT", "PORT"]) {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid port override"),
            }
        }

        if let Some(origin) = get(&["FRONTEND_URL"])
            && !self.server.allowed_origins.contains(&origin)
        {
            self.server.allowed_origins.push(origin);
        }

        if let Some(password) = get(&["MINDTRACK_APP_PASSWORD", "APP_PASSWORD"]) {
            self.auth.app_password = password;
        }

        if let Some(password) = get(&["MINDTRACK_ADMIN_PASSWORD"]) {
            self.auth.admin_password = Some(password);
        }

        if let Some(root) = get(&["MINDTRACK_WORKSPACE_ROOT"]) {
            self.paths.workspace_root = PathBuf::from(root);
        }

        if let Some(music) = get(&["MINDTRACK_MUSIC_PATH"]) {
            self.paths.music_path = PathBuf::from(music);
        }

        let supabase_url = get(&["SUPABASE_URL"]);
        let supabase_key = get(&["SUPABASE_KEY"]);
        if supabase_url.is_some() && supabase_key.is_some() {
            self.storage.backend = StorageBackend::Supabase;
        }
        if supabase_url.is_some() {
            self.storage.supabase_url = supabase_url;
        }
        if supabase_key.is_some() {
            self.storage.supabase_key = supabase_key;
        }

        self
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Supabase {
            if self.storage.supabase_url.is_none() {
                return Err(MindtrackError::ConfigInvalidValue {
                    key: "storage.supabase_url".to_string(),
                    message: "required when storage.backend = \"supabase\"".to_string(),
                });
            }
            if self.storage.supabase_key.is_none() {
                return Err(MindtrackError::ConfigInvalidValue {
                    key: "storage.supabase_key".to_string(),
                    message: "required when storage.backend = \"supabase\"".to_string(),
                });
            }
        }

        if self.sessions.sweep_interval.is_zero() {
            return Err(MindtrackError::ConfigInvalidValue {
                key: "sessions.sweep_interval".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MindtrackError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/mindtrack/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("mindtrack")
            .join("config.toml")
    }
}

/// Serde adapter for human-friendly durations ("90s", "15m", "1h").
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}
