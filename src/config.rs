//! Run configuration
//!
//! A TOML file names the reporting year, the reference-rate file and every
//! broker export to read:
//!
//! ```toml
//! year = 2024
//! rates = "data/eurofxref-hist.csv"
//!
//! [[sources]]
//! name = "Trade Republic"
//! format = "trade_republic"
//! path = "exports/tr"
//! glob = "*.csv"
//! delimiter = ";"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::importers::{FileImporter, SourceFormat};

pub const DEFAULT_CONFIG_FILE: &str = "fincli.toml";

fn default_glob() -> String {
    "*.csv".to_string()
}

fn default_delimiter() -> char {
    ';'
}

/// One broker export location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub format: SourceFormat,
    pub path: PathBuf,
    #[serde(default = "default_glob")]
    pub glob: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub year: Option<i32>,
    pub rates: Option<PathBuf>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Config {
    /// Read and parse a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading config: {:?}", path);

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self::from_toml_str(&text, base_dir)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: Config = toml::from_str(text).context("Failed to parse TOML")?;
        config.base_dir = base_dir.into();

        for source in &config.sources {
            if !source.delimiter.is_ascii() {
                return Err(anyhow!(
                    "Source '{}': delimiter must be a single ASCII character",
                    source.name
                ));
            }
        }
        debug!("Config has {} sources", config.sources.len());
        Ok(config)
    }

    /// Find the config file: the explicit path, `./fincli.toml`, then the
    /// user config directory.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Ok(local);
        }

        let user = dir_spec::config_home()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("fincli")
            .join("config.toml");
        if user.is_file() {
            return Ok(user);
        }

        Err(anyhow!(
            "No config file found (looked for ./{} and {})",
            DEFAULT_CONFIG_FILE,
            user.display()
        ))
    }

    /// Resolve a path from the file against the config directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn rates_path(&self) -> Option<PathBuf> {
        self.rates.as_deref().map(|p| self.resolve(p))
    }

    /// One importer per configured source
    pub fn importers(&self) -> Vec<FileImporter> {
        self.sources
            .iter()
            .map(|source| {
                FileImporter::new(&source.name, source.format, self.resolve(&source.path))
                    .with_glob(&source.glob)
                    .with_delimiter(source.delimiter as u8)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
year = 2024
rates = "rates/eurofxref-hist.csv"

[[sources]]
name = "Trade Republic"
format = "trade_republic"
path = "exports/tr"

[[sources]]
name = "Broker"
format = "canonical_csv"
path = "/abs/broker.csv"
delimiter = ","
"#;

    #[test]
    fn test_parse_config_with_defaults() {
        let config = Config::from_toml_str(SAMPLE, "/home/me/finance").unwrap();
        assert_eq!(config.year, Some(2024));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].format, SourceFormat::TradeRepublic);
        assert_eq!(config.sources[0].glob, "*.csv");
        assert_eq!(config.sources[0].delimiter, ';');
        assert_eq!(config.sources[1].delimiter, ',');
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let config = Config::from_toml_str(SAMPLE, "/home/me/finance").unwrap();
        assert_eq!(
            config.rates_path(),
            Some(PathBuf::from("/home/me/finance/rates/eurofxref-hist.csv"))
        );

        let importers = config.importers();
        assert_eq!(importers[0].path, PathBuf::from("/home/me/finance/exports/tr"));
        assert_eq!(importers[1].path, PathBuf::from("/abs/broker.csv"));
        assert_eq!(importers[1].delimiter, b',');
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let text = "[[sources]]\nname = \"x\"\nformat = \"binance\"\npath = \"a\"\n";
        assert!(Config::from_toml_str(text, ".").is_err());
    }

    #[test]
    fn test_broker_formats_are_accepted() {
        let text = "\
[[sources]]
name = \"XTB\"
format = \"xtb\"
path = \"exports/xtb\"

[[sources]]
name = \"Revolut\"
format = \"revolut\"
path = \"exports/revolut.csv\"
";
        let config = Config::from_toml_str(text, "/data").unwrap();
        assert_eq!(config.sources[0].format, SourceFormat::Xtb);
        assert_eq!(config.sources[1].format, SourceFormat::Revolut);
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = Config::locate(Some(Path::new("custom.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("custom.toml"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fincli.toml");
        std::fs::write(&file, SAMPLE).unwrap();

        let config = Config::load(&file).unwrap();
        assert_eq!(config.rates_path(), Some(dir.path().join("rates/eurofxref-hist.csv")));
    }
}
