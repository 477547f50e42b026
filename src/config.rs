use crate::error::{CodeMarksError, Result};
use crate::types::DEFAULT_BASE_GROUP;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// File name looked up at the workspace root.
pub const WORKSPACE_CONFIG_FILE: &str = "codemarks.toml";

const DEFAULT_PATTERNS: &[&str] = &[
    "*.{java,kt,kts,scala,groovy,gradle}",
    "*.{rs,go,c,h,cc,cpp,hpp,cs,swift,m,mm}",
    "*.{py,rb,php,pl,lua,r}",
    "*.{js,jsx,ts,tsx,mjs,cjs,vue,svelte}",
    "*.{sh,bash,zsh,ps1,sql}",
    "*.{xml,html,css,scss,json,yaml,yml,toml,ini,properties}",
    "*.{md,txt}",
    "*",
];

const DEFAULT_EXCLUDE_DIRS: &[&str] = &[".git", "target", "node_modules", ".idea", ".codemarks"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CodeMarksConfig {
    pub file_scanning: FileScanningConfig,
    pub scheduler: SchedulerConfig,
    pub markers: MarkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileScanningConfig {
    /// Glob patterns matched against file names (FileTypePatterns).
    pub patterns: Vec<String>,
    /// Directory names never descended into by the local enumerator.
    pub exclude_dirs: Vec<String>,
    pub follow_symlinks: bool,
    pub max_depth: Option<usize>,
    /// Extract marks from files on a worker pool during full scans.
    pub parallel: bool,
}

impl Default for FileScanningConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|d| d.to_string()).collect(),
            follow_symlinks: false,
            max_depth: None,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub debounce_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

impl SchedulerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarkerConfig {
    pub base_group: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            base_group: DEFAULT_BASE_GROUP.to_string(),
        }
    }
}

impl CodeMarksConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CodeMarksError::file_read(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Resolution order: explicit path, `codemarks.toml` in the workspace,
    /// the user config directory, built-in defaults.
    pub fn load(explicit: Option<&Path>, workspace: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "Loading explicit config");
            return Self::from_file(path);
        }

        let workspace_config = workspace.join(WORKSPACE_CONFIG_FILE);
        if workspace_config.is_file() {
            debug!(path = %workspace_config.display(), "Loading workspace config");
            return Self::from_file(&workspace_config);
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.is_file() {
                debug!(path = %user_config.display(), "Loading user config");
                return Self::from_file(&user_config);
            }
        }

        Ok(Self::default())
    }

    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "codemarks")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CodeMarksError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.markers.base_group.trim().is_empty() {
            return Err(CodeMarksError::Config("markers.base_group must not be empty".into()));
        }
        if self.markers.base_group != self.markers.base_group.trim() {
            return Err(CodeMarksError::Config(
                "markers.base_group must not have surrounding whitespace".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CodeMarksConfig::default();
        assert!(config.file_scanning.patterns.contains(&"*".to_string()));
        assert!(config.file_scanning.exclude_dirs.contains(&".git".to_string()));
        assert_eq!(config.scheduler.debounce(), Duration::from_millis(100));
        assert_eq!(config.markers.base_group, "CodeMarks");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CodeMarksConfig::from_toml_str(
            r#"
[file_scanning]
patterns = ["*.rs"]

[scheduler]
debounce_ms = 250
"#,
        )
        .unwrap();

        assert_eq!(config.file_scanning.patterns, vec!["*.rs".to_string()]);
        assert!(config.file_scanning.parallel);
        assert_eq!(config.scheduler.debounce_ms, 250);
        assert_eq!(config.markers.base_group, "CodeMarks");
    }

    #[test]
    fn test_empty_base_group_rejected() {
        let result = CodeMarksConfig::from_toml_str("[markers]\nbase_group = \"  \"\n");
        assert!(matches!(result, Err(CodeMarksError::Config(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = CodeMarksConfig::from_toml_str("file_scanning = 3");
        assert!(matches!(result, Err(CodeMarksError::Toml(_))));
    }

    #[test]
    fn test_load_prefers_workspace_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(WORKSPACE_CONFIG_FILE),
            "[markers]\nbase_group = \"Notes\"\n",
        )
        .unwrap();

        let config = CodeMarksConfig::load(None, dir.path()).unwrap();
        assert_eq!(config.markers.base_group, "Notes");
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let result = CodeMarksConfig::load(Some(&missing), dir.path());
        assert!(matches!(result, Err(CodeMarksError::FileRead { .. })));
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let config = CodeMarksConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(CodeMarksConfig::from_toml_str(&text).unwrap(), config);
    }
}
