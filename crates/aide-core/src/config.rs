use crate::error::{AideError, Result};
use crate::generator::GenerationMethod;
use crate::io;
use crate::layout::VaultLayout;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// WatcherConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_watch_interval")]
    pub interval_secs: u64,
    /// Folder scanned by the filesystem watcher. Relative paths resolve
    /// against the vault root.
    #[serde(default = "default_drop_dir")]
    pub drop_dir: PathBuf,
    /// The messaging watcher only emits messages containing one of these.
    #[serde(default = "default_keywords")]
    pub messaging_keywords: Vec<String>,
}

fn default_watch_interval() -> u64 {
    60
}

fn default_drop_dir() -> PathBuf {
    PathBuf::from(crate::layout::INBOX_DIR)
}

fn default_keywords() -> Vec<String> {
    ["urgent", "asap", "invoice", "payment", "help"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_watch_interval(),
            drop_dir: default_drop_dir(),
            messaging_keywords: default_keywords(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default = "default_process_interval")]
    pub interval_secs: u64,
    #[serde(default)]
    pub method: GenerationMethod,
    /// Consecutive failures before an item is quarantined in `Failed`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Age after which an orphaned `.processing` claim is taken back.
    #[serde(default = "default_claim_grace")]
    pub claim_grace_secs: u64,
    #[serde(default = "default_generate_timeout")]
    pub timeout_secs: u64,
    /// Source channels whose plans skip human review and land in `Approved`.
    #[serde(default)]
    pub auto_approve: Vec<String>,
}

fn default_process_interval() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_claim_grace() -> u64 {
    600
}

fn default_generate_timeout() -> u64 {
    120
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_process_interval(),
            method: GenerationMethod::default(),
            max_attempts: default_max_attempts(),
            claim_grace_secs: default_claim_grace(),
            timeout_secs: default_generate_timeout(),
            auto_approve: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// GeneratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_cli_executable")]
    pub cli_executable: String,
    #[serde(default = "default_cli_args")]
    pub cli_args: Vec<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_api_model")]
    pub api_model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_cli_executable() -> String {
    "claude".to_string()
}

fn default_cli_args() -> Vec<String> {
    vec!["--print".to_string()]
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_api_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            cli_executable: default_cli_executable(),
            cli_args: default_cli_args(),
            api_url: default_api_url(),
            api_model: default_api_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApprovalConfig
// ---------------------------------------------------------------------------

/// A command run for every approved plan of one domain. The plan's path is
/// appended as the last argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// One window for every plan in a run.
    #[serde(default = "default_expiration_hours")]
    pub expiration_hours: u32,
    /// Also expire plans that sat in `Plans` longer than the window.
    #[serde(default = "default_true")]
    pub expire_pending: bool,
    #[serde(default = "default_execute_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub executors: HashMap<String, ExecutorCommand>,
}

fn default_check_interval() -> u64 {
    60
}

fn default_expiration_hours() -> u32 {
    24
}

fn default_true() -> bool {
    true
}

fn default_execute_timeout() -> u64 {
    300
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            expiration_hours: default_expiration_hours(),
            expire_pending: default_true(),
            timeout_secs: default_execute_timeout(),
            executors: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub watchers: WatcherConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    /// Suppress external side effects while still driving the state machine.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(skip)]
    vault_root: PathBuf,
}

fn default_version() -> u32 {
    1
}

impl Config {
    /// Defaults for a vault at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            version: default_version(),
            watchers: WatcherConfig::default(),
            processor: ProcessorConfig::default(),
            generator: GeneratorConfig::default(),
            approval: ApprovalConfig::default(),
            dry_run: false,
            vault_root: root.into(),
        }
    }

    /// Load `aide.yaml` from the vault root, or defaults when it is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let layout = VaultLayout::new(root);
        let path = layout.config_path();
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                Config::new(root)
            } else {
                serde_yaml::from_str::<Config>(&data)
                    .map_err(|e| AideError::InvalidConfig(format!("{}: {e}", path.display())))?
            }
        } else {
            Config::new(root)
        };
        config.vault_root = root.to_path_buf();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&self.layout().config_path(), data.as_bytes())
    }

    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    pub fn layout(&self) -> VaultLayout {
        VaultLayout::new(&self.vault_root)
    }

    pub fn drop_dir(&self) -> PathBuf {
        if self.watchers.drop_dir.is_absolute() {
            self.watchers.drop_dir.clone()
        } else {
            self.vault_root.join(&self.watchers.drop_dir)
        }
    }

    pub fn expiration_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.approval.expiration_hours))
    }

    pub fn claim_grace(&self) -> Duration {
        Duration::from_secs(self.processor.claim_grace_secs)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        for (name, secs) in [
            ("watchers.interval_secs", self.watchers.interval_secs),
            ("processor.interval_secs", self.processor.interval_secs),
            ("approval.check_interval_secs", self.approval.check_interval_secs),
        ] {
            if secs == 0 {
                warn(
                    WarnLevel::Warning,
                    format!("{name} is 0: the loop will poll without pausing"),
                );
            }
        }
        if self.approval.expiration_hours == 0 {
            warn(
                WarnLevel::Error,
                "approval.expiration_hours is 0: every approved plan expires immediately".into(),
            );
        }
        if self.processor.max_attempts == 0 {
            warn(
                WarnLevel::Error,
                "processor.max_attempts is 0: items are quarantined without being tried".into(),
            );
        }
        if self.processor.method == GenerationMethod::Api
            && std::env::var_os(&self.generator.api_key_env).is_none()
        {
            warn(
                WarnLevel::Warning,
                format!(
                    "processor.method is api but {} is not set",
                    self.generator.api_key_env
                ),
            );
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.approval.expiration_hours, 24);
        assert_eq!(config.processor.method, GenerationMethod::Auto);
        assert_eq!(config.processor.max_attempts, 3);
        assert!(!config.dry_run);
        assert_eq!(config.vault_root(), dir.path());
        assert_eq!(config.drop_dir(), dir.path().join("Inbox"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("aide.yaml"),
            "approval:\n  expiration_hours: 48\nprocessor:\n  method: simulate\ndry_run: true\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.approval.expiration_hours, 48);
        assert_eq!(config.approval.check_interval_secs, 60);
        assert_eq!(config.processor.method, GenerationMethod::Simulate);
        assert!(config.dry_run);
    }

    #[test]
    fn save_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::new(dir.path());
        config.approval.executors.insert(
            "email".into(),
            ExecutorCommand {
                command: "send-mail".into(),
                args: vec!["--from".into(), "me".into()],
            },
        );
        config.save().unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(
            loaded.approval.executors.get("email").unwrap().command,
            "send-mail"
        );
    }

    #[test]
    fn validate_flags_zero_expiration() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::new(dir.path());
        assert!(config.validate().iter().all(|w| w.level != WarnLevel::Error));
        config.approval.expiration_hours = 0;
        config.processor.interval_secs = 0;
        let warnings = config.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("expiration_hours")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("processor.interval_secs")));
    }

    #[test]
    fn unparseable_file_is_invalid_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("aide.yaml"), "approval: [not, a, map]\n").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, AideError::InvalidConfig(ref m) if m.contains("aide.yaml")));
    }

    #[test]
    fn out_of_range_expiration_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("aide.yaml"),
            "approval:\n  expiration_hours: 18446744073709551615\n",
        )
        .unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, AideError::InvalidConfig(_)));

        let mut config = Config::new(dir.path());
        config.approval.expiration_hours = u32::MAX;
        assert!(config.expiration_window() > chrono::Duration::hours(24));
    }
}
