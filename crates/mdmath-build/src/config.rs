use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DESTINATION: &str = "assets";
pub const DEFAULT_DPI: u32 = 250;

/// Where rendered images go and which toolchain produces them.
///
/// Fixed once a pipeline is built; every render through that pipeline uses
/// the same resolution and programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Root of the generated site or document.
    pub output_directory: PathBuf,
    /// Subdirectory of `output_directory` holding the images.
    #[serde(default = "default_destination")]
    pub destination: String,
    #[serde(default = "default_latex")]
    pub latex: String,
    #[serde(default = "default_dvipng")]
    pub dvipng: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_destination() -> String {
    DEFAULT_DESTINATION.to_string()
}

fn default_latex() -> String {
    "latex".to_string()
}

fn default_dvipng() -> String {
    "dvipng".to_string()
}

fn default_dpi() -> u32 {
    DEFAULT_DPI
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderConfig {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            destination: default_destination(),
            latex: default_latex(),
            dvipng: default_dvipng(),
            dpi: default_dpi(),
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        let content = serde_json::to_string_pretty(self)
            .map_err(std::io::Error::other)
            .map_err(write_err)?;
        std::fs::write(path, content).map_err(write_err)
    }

    /// `<output_directory>/<destination>`
    pub fn asset_directory(&self) -> PathBuf {
        self.output_directory.join(&self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: RenderConfig = serde_json::from_str(r#"{"output_directory": "site"}"#).unwrap();
        assert_eq!(config, RenderConfig::new("site"));
        assert_eq!(config.destination, "assets");
        assert_eq!(config.dpi, 250);
        assert_eq!(config.asset_directory(), PathBuf::from("site/assets"));
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("mdmath.json");

        let mut config = RenderConfig::new("out").with_destination("math");
        config.dpi = 300;
        config.save(&path).unwrap();

        assert_eq!(RenderConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_output_directory_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bad.json");
        std::fs::write(&path, r#"{"destination": "img"}"#).unwrap();

        let err = RenderConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = RenderConfig::load(Path::new("/no/such/mdmath.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
