//! Setup configuration.
//!
//! Defaults reproduce the stock notebook setup; a JSON file at
//! `<config_dir>/rbridge/config.json` can override any field.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{SetupError, SetupResult};

/// Configuration threaded through every setup step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Package manager executable.
    pub conda_program: String,
    /// R executable probed for presence and used for sessions.
    pub r_program: String,
    /// Conda packages that make up the R runtime.
    pub runtime_packages: Vec<String>,
    /// Package that bridges the notebook kernel and R.
    pub bridge_package: String,
    /// Channel the bridge package is installed from.
    pub bridge_channel: String,
    /// CRAN mirror for `install.packages`.
    pub cran_repo: String,
    /// Persistent R library on the mounted drive (Colab only).
    pub colab_lib_dir: PathBuf,
    /// R packages that need native libraries installed with apt first.
    pub native_dependencies: BTreeMap<String, Vec<String>>,
}

impl Default for SetupConfig {
    fn default() -> Self {
        let mut native_dependencies = BTreeMap::new();
        native_dependencies.insert(
            "rmgarch".to_string(),
            vec!["libgmp-dev".to_string(), "libmpfr-dev".to_string()],
        );
        Self {
            conda_program: "conda".to_string(),
            r_program: "R".to_string(),
            runtime_packages: vec!["r-essentials".to_string()],
            bridge_package: "rpy2".to_string(),
            bridge_channel: "conda-forge".to_string(),
            cran_repo: "http://cran.rstudio.com/".to_string(),
            colab_lib_dir: PathBuf::from("/content/drive/MyDrive/Rlibs"),
            native_dependencies,
        }
    }
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("rbridge")
        .join("config.json")
}

impl SetupConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> SetupResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        info!("[r-env] Loading config from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| SetupError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Native libraries `package` needs, empty for most packages.
    pub fn native_dependencies_for(&self, package: &str) -> &[String] {
        self.native_dependencies
            .get(package)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SetupConfig::default();
        assert_eq!(config.runtime_packages, vec!["r-essentials"]);
        assert_eq!(
            config.native_dependencies_for("rmgarch"),
            ["libgmp-dev", "libmpfr-dev"]
        );
        assert!(config.native_dependencies_for("forecast").is_empty());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SetupConfig::load_or_default(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, SetupConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"cran_repo": "https://cloud.r-project.org", "colab_lib_dir": "/mnt/Rlibs"}"#,
        )
        .unwrap();

        let config = SetupConfig::load_or_default(&path).unwrap();
        assert_eq!(config.cran_repo, "https://cloud.r-project.org");
        assert_eq!(config.colab_lib_dir, PathBuf::from("/mnt/Rlibs"));
        assert_eq!(config.bridge_package, "rpy2");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = SetupConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, SetupError::Config { .. }));
    }
}
