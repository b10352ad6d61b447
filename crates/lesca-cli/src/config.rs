//! Layered CLI configuration: defaults → `~/.lesca/config.toml` → CLI
//! flags (SPEC_FULL.md ambient-stack "Configuration", grounded on
//! `riptide-cli::config`'s directory-resolution style, generalised from
//! that module's single-purpose `get_output_directory()` functions into
//! one struct since the CLI here has several cooperating directories
//! rather than one flat output tree).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub sessions_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub pool_max_size: usize,
    pub pool_min_size: usize,
    pub batch_concurrency: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            sessions_dir: base.join("lesca").join("sessions"),
            cache_dir: base.join("lesca").join("cache"),
            output_dir: base.join("lesca").join("output"),
            pool_max_size: 5,
            pool_min_size: 1,
            batch_concurrency: 3,
        }
    }
}

impl CliConfig {
    pub fn config_file_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lesca")
            .join("config.toml")
    }

    /// Loads defaults, overlays `~/.lesca/config.toml` if present (a
    /// missing file is not an error — the defaults stand), then applies
    /// `LESCA_SESSIONS_DIR` if set (spec.md's only named env override
    /// besides `LESCA_ENCRYPTION_KEY`, which the session cipher reads
    /// directly).
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::default();
        let path = Self::config_file_path();
        if let Ok(text) = std::fs::read_to_string(&path) {
            config = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))?;
        }
        if let Ok(dir) = std::env::var("LESCA_SESSIONS_DIR") {
            config.sessions_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_nests_under_lesca() {
        let config = CliConfig::default();
        assert!(config.sessions_dir.ends_with("lesca/sessions"));
        assert!(config.cache_dir.ends_with("lesca/cache"));
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = CliConfig {
            pool_max_size: 9,
            ..CliConfig::default()
        };
        config.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let loaded: CliConfig = toml::from_str(&text).unwrap();
        assert_eq!(loaded.pool_max_size, 9);
    }
}
