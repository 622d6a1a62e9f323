//! Configuration file management
//!
//! Finds and loads settings files. YAML or JSON, chosen by extension.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::SuiteSettingsSpec;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./settle.yaml",
    "./settle.yml",
    "./.settle.yaml",
    "~/.config/settle/config.yaml",
    "~/.settle.yaml",
];

/// Find a configuration file in the standard locations
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_LOCATIONS
        .iter()
        .map(|location| expand_path(location))
        .find(|path| path.exists())
}

impl SuiteSettingsSpec {
    /// Load settings from the first standard location, or nothing
    pub fn load_default() -> Result<Self> {
        match find_config_file() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load settings from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let spec: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        Ok(spec)
    }
}

fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestOrder;

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settle.yaml");
        std::fs::write(
            &path,
            "execution:\n  timeout: 2500\n  order: random\n  order_seed: 99\nreporting:\n  slow_threshold: 200\n",
        )
        .unwrap();

        let spec = SuiteSettingsSpec::load(&path).unwrap();
        assert_eq!(spec.execution.timeout, Some(2500));
        assert_eq!(spec.execution.order, Some(TestOrder::Random));
        assert_eq!(spec.execution.order_seed, Some(99));
        assert_eq!(spec.reporting.slow_threshold, Some(200));
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settle.json");
        std::fs::write(&path, r#"{"execution": {"timeout": 900, "verbose": true}}"#).unwrap();

        let loaded = SuiteSettingsSpec::load(&path).unwrap();
        assert_eq!(loaded.execution.timeout, Some(900));
        assert_eq!(loaded.execution.verbose, Some(true));
    }

    #[test]
    fn test_unsupported_order_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settle.yml");
        std::fs::write(&path, "execution:\n  order: shuffled\n").unwrap();

        let error = SuiteSettingsSpec::load(&path).unwrap_err();
        assert!(error.to_string().contains("Failed to parse YAML config"));
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("./settle.yaml"), PathBuf::from("./settle.yaml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/.settle.yaml"), home.join(".settle.yaml"));
        }
    }
}
