//! Configuration for the withyou assistant.
//!
//! # Security
//!
//! - Config file permission validation on Unix systems
//! - Rejects world-readable files that hold an API key
//! - Warns about API keys stored in config files

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use withyou_common::{Result, WithYouError};
use withyou_llm::LlmConfig;
use withyou_memory::MemoryConfig;
use withyou_tools::{Calendar, InMemoryCalendar, LedgerCalendar, load_service_account};

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WithYouConfig {
    pub app_name: String,

    /// Locale used for resources when a turn carries none.
    pub default_locale: String,

    pub llm: LlmConfig,

    pub safety: SafetyConfig,

    pub calendar: CalendarConfig,

    pub session: MemoryConfig,
}

impl Default for WithYouConfig {
    fn default() -> Self {
        Self {
            app_name: "withyou".into(),
            default_locale: "global".into(),
            llm: LlmConfig::default(),
            safety: SafetyConfig::default(),
            calendar: CalendarConfig::default(),
            session: MemoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Phrases added to the built-in crisis pre-filter.
    pub extra_keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarBackend {
    #[default]
    Memory,
    Ledger,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub backend: CalendarBackend,

    /// JSON-lines file used by the ledger backend.
    pub ledger_path: PathBuf,

    /// Environment variable holding the service-account file path.
    pub service_account_env: String,

    /// Refuse to start without a readable service account.
    pub require_service_account: bool,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            backend: CalendarBackend::Memory,
            ledger_path: PathBuf::from("./data/calendar.jsonl"),
            service_account_env: "GOOGLE_APPLICATION_CREDENTIALS".into(),
            require_service_account: false,
        }
    }
}

impl CalendarConfig {
    /// Build the calendar backend. `lookup` resolves environment variables.
    ///
    /// With `require_service_account`, a missing variable or an unreadable
    /// account file is a configuration error.
    pub fn build<F>(&self, lookup: F) -> Result<Arc<dyn Calendar>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account_path = lookup(&self.service_account_env).filter(|p| !p.trim().is_empty());
        let account = match (account_path, self.require_service_account) {
            (Some(path), true) => Some(load_service_account(Path::new(&path))?),
            (Some(path), false) => match load_service_account(Path::new(&path)) {
                Ok(account) => Some(account),
                Err(e) => {
                    warn!(error = %e, "Ignoring unusable service account");
                    None
                }
            },
            (None, true) => {
                return Err(WithYouError::Config(format!(
                    "{} is not set. Calendar integration requires a service account file.",
                    self.service_account_env
                )));
            }
            (None, false) => None,
        };

        let calendar: Arc<dyn Calendar> = match self.backend {
            CalendarBackend::Memory => Arc::new(InMemoryCalendar::new()),
            CalendarBackend::Ledger => {
                Arc::new(LedgerCalendar::open(&self.ledger_path, account.as_ref())?)
            }
        };
        info!(
            backend = ?self.backend,
            service_account = account.is_some(),
            "Calendar ready"
        );
        Ok(calendar)
    }
}

impl WithYouConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Security
    ///
    /// On Unix systems, this function validates that:
    /// - The file is a regular file (not a symlink)
    /// - The file is not world-writable
    /// - The file is not world-readable if it contains an API key
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = Self::from_file_unchecked(path)?;
        let holds_api_key = config
            .llm
            .api_key
            .as_ref()
            .is_some_and(|k| !k.trim().is_empty());

        #[cfg(unix)]
        validate_config_file_permissions(path, holds_api_key)?;

        if holds_api_key {
            warn!(
                "API key found in config file '{}'. For better security, \
                 use the {} environment variable instead.",
                path.display(),
                config.llm.api_key_env
            );
        }

        Ok(config)
    }

    /// Load configuration from a TOML file without permission checks.
    ///
    /// Use this only for testing or when you've already validated the file.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the assistant cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_locale.trim().is_empty() {
            anyhow::bail!("default_locale must not be empty");
        }
        if self.llm.max_concurrent_requests == 0 {
            anyhow::bail!("llm.max_concurrent_requests must be at least 1");
        }
        if self.llm.timeout_ms == 0 {
            anyhow::bail!("llm.timeout_ms must be greater than zero");
        }
        if self.safety.extra_keywords.iter().any(|k| k.trim().is_empty()) {
            anyhow::bail!("safety.extra_keywords must not contain blank entries");
        }
        if self.session.max_history_turns == 0 {
            anyhow::bail!("session.max_history_turns must be at least 1");
        }
        if self.calendar.backend == CalendarBackend::Ledger
            && self.calendar.ledger_path.as_os_str().is_empty()
        {
            anyhow::bail!("calendar.ledger_path is required for the ledger backend");
        }
        Ok(())
    }
}

/// Validate config file permissions on Unix systems.
///
/// Requirements:
/// - File must be a regular file (not symlink, directory, etc.)
/// - File must not be world-writable (mode & 0o002 == 0)
/// - If the file holds an API key, it must not be world-readable
#[cfg(unix)]
fn validate_config_file_permissions(path: &Path, holds_api_key: bool) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.file_type().is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). \
             This is a security risk. Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if holds_api_key && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             This is a security risk. Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if holds_api_key && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o}). \
             Consider restricting access with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}
