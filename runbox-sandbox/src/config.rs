//! Configuration management for runbox sessions

use crate::error::{SandboxError, SandboxResult};
use crate::limits::{LimitsProfile, ResourceLimits};
use runbox_common::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Largest ring accepted from configuration, in slots.
pub const MAX_CAPACITY: u32 = 1 << 20;

/// Languages with a built-in interpreter preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Shell,
    JavaScript,
}

impl Language {
    /// Interpreter binary used when the config names none.
    pub fn default_program(&self) -> &'static str {
        match self {
            Language::Python => "python3",
            Language::Shell => "sh",
            Language::JavaScript => "node",
        }
    }

    /// Arguments placed before the source text.
    pub fn default_args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            Language::Python => &["-u", "-c"],
            Language::Shell => &["-c"],
            Language::JavaScript => &["-e"],
        };
        args.iter().map(|s| s.to_string()).collect()
    }

    /// Arguments for the cold-start probe. `sh` has no `--version`.
    pub fn probe_args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            Language::Python | Language::JavaScript => &["--version"],
            Language::Shell => &["-c", "exit 0"],
        };
        args.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::Shell => write!(f, "shell"),
            Language::JavaScript => write!(f, "javascript"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "shell" | "sh" => Ok(Language::Shell),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            other => Err(format!("unknown language: {}", other)),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub limits: ResourceLimits,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

/// Stdin ring configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Ring capacity in character slots; one slot always stays free
    pub capacity: u32,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Interpreter selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub language: Language,
    /// Interpreter binary override
    pub program: Option<String>,
    /// Argument override; the source text is appended after these
    pub args: Option<Vec<String>>,
    /// Extra environment for the interpreter process
    pub env: BTreeMap<String, String>,
}

impl RuntimeConfig {
    pub fn for_language(language: Language) -> Self {
        Self {
            language,
            ..Self::default()
        }
    }

    pub fn program(&self) -> &str {
        self.program
            .as_deref()
            .unwrap_or_else(|| self.language.default_program())
    }

    pub fn args(&self) -> Vec<String> {
        self.args
            .clone()
            .unwrap_or_else(|| self.language.default_args())
    }
}

/// Protocol transcript recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub enabled: bool,
    /// Oldest entries are dropped past this count
    pub max_entries: usize,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 10_000,
        }
    }
}

impl SandboxConfig {
    /// Load configuration from the default path, falling back to defaults
    /// when no file exists. Environment overrides are applied last.
    pub fn load() -> SandboxResult<Self> {
        let config_path = Self::config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, without environment overrides
    pub fn load_from(path: &Path) -> SandboxResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SandboxError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SandboxResult<Self> {
        let config: SandboxConfig = toml::from_str(content)
            .map_err(|e| SandboxError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> SandboxResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SandboxError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SandboxError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SandboxError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> SandboxResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| SandboxError::Config("Cannot determine home directory".to_string()))?;

        Ok(home.join(".config").join("runbox").join("config.toml"))
    }

    /// Apply `RUNBOX_*` environment variables over file values
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are skipped
    /// with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(language) = lookup("RUNBOX_LANGUAGE") {
            match language.parse() {
                Ok(language) => self.runtime.language = language,
                Err(e) => tracing::warn!("ignoring RUNBOX_LANGUAGE: {}", e),
            }
        }
        if let Some(program) = lookup("RUNBOX_PROGRAM") {
            self.runtime.program = Some(program);
        }
        if let Some(capacity) = lookup("RUNBOX_BUFFER_CAPACITY") {
            match capacity.parse() {
                Ok(capacity) => self.buffer.capacity = capacity,
                Err(_) => tracing::warn!("ignoring RUNBOX_BUFFER_CAPACITY={}", capacity),
            }
        }
        if let Some(profile) = lookup("RUNBOX_LIMITS") {
            match profile.parse::<LimitsProfile>() {
                Ok(profile) => self.limits = profile.limits(),
                Err(e) => tracing::warn!("ignoring RUNBOX_LIMITS: {}", e),
            }
        }
        if let Some(secs) = lookup("RUNBOX_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(0) => self.limits.max_duration = None,
                Ok(secs) => self.limits.max_duration = Some(Duration::from_secs(secs)),
                Err(_) => tracing::warn!("ignoring RUNBOX_TIMEOUT_SECS={}", secs),
            }
        }
        if let Some(flag) = lookup("RUNBOX_TRANSCRIPT") {
            self.transcript.enabled = matches!(flag.as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> SandboxResult<()> {
        if self.buffer.capacity < 2 || self.buffer.capacity > MAX_CAPACITY {
            return Err(SandboxError::Config(format!(
                "buffer.capacity must be between 2 and {}, got {}",
                MAX_CAPACITY, self.buffer.capacity
            )));
        }
        if self.runtime.program().trim().is_empty() {
            return Err(SandboxError::Config(
                "runtime.program must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
