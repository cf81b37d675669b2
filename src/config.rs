//! Configuration file parser for ~/.config/feedshelf/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as likely typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `admin_secret`.
pub const SECRET_ENV: &str = "FEEDSHELF_SECRET";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level configuration. Any subset of keys may be given.
///
/// SEC-015: Custom Debug impl masks `admin_secret`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of a remote feed admin API. When unset the local SQLite
    /// store is used.
    pub api_base_url: Option<String>,

    /// Shared admin secret. `FEEDSHELF_SECRET` takes precedence.
    pub admin_secret: Option<String>,

    /// Quiet period before a reorder is written, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            admin_secret: None,
            debounce_ms: 500,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field(
                "admin_secret",
                &self.admin_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("debounce_ms", &self.debounce_ms)
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 3] = ["api_base_url", "admin_secret", "debounce_ms"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            remote = config.api_base_url.is_some(),
            debounce_ms = config.debounce_ms,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Debounce window as a `Duration`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Resolve the admin secret: `env_value` (from `FEEDSHELF_SECRET`) wins
    /// over the config file. Blank values count as unset.
    pub fn resolve_secret(&self, env_value: Option<String>) -> Option<SecretString> {
        env_value
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                self.admin_secret
                    .clone()
                    .filter(|s| !s.trim().is_empty())
            })
            .map(SecretString::from)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.api_base_url.is_none());
        assert!(config.admin_secret.is_none());
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedshelf_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.debounce_ms, 500);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("feedshelf_config_test_whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.debounce_ms, 500);
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let path = write_config(
            "feedshelf_config_test_full",
            r#"
api_base_url = "https://admin.example.com/"
admin_secret = "hunter2"
debounce_ms = 250
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_base_url.as_deref(), Some("https://admin.example.com/"));
        assert_eq!(config.admin_secret.as_deref(), Some("hunter2"));
        assert_eq!(config.debounce(), Duration::from_millis(250));
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config(
            "feedshelf_config_test_unknown",
            "debounce_ms = 100\ndebounce = 5\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.debounce_ms, 100);
        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("feedshelf_config_test_invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = write_config("feedshelf_config_test_wrongtype", "debounce_ms = \"fast\"\n");
        assert!(Config::load(&path).is_err());
        cleanup(&path);
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("feedshelf_config_test_too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        cleanup(&path);
    }

    #[test]
    fn test_env_secret_takes_precedence() {
        let config = Config {
            admin_secret: Some("from-file".into()),
            ..Config::default()
        };

        let secret = config.resolve_secret(Some("from-env".into())).unwrap();
        assert_eq!(secret.expose_secret(), "from-env");

        let secret = config.resolve_secret(Some("  ".into())).unwrap();
        assert_eq!(secret.expose_secret(), "from-file");

        assert!(Config::default().resolve_secret(None).is_none());
    }

    // SEC-015: Debug output masks the secret
    #[test]
    fn test_debug_masks_secret() {
        let config = Config {
            admin_secret: Some("super-secret-12345".into()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
