//! Host classification and R runtime path derivation.
//!
//! Everything here works on an explicit [`HostEnv`] snapshot instead of the
//! ambient process environment, so callers (and tests) decide what the
//! "environment" is. The derived values are handed to child processes as
//! [`EnvOverrides`]; the current process is never mutated.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use log::debug;
use rattler_conda_types::Platform;
use serde::Serialize;

use crate::error::{SetupError, SetupResult};

/// Set by Colab on every runtime.
pub const COLAB_MARKER_VAR: &str = "COLAB_GPU";
/// Set by `conda activate`.
pub const CONDA_MARKER_VAR: &str = "CONDA_DEFAULT_ENV";
/// Root of the active conda environment.
pub const CONDA_PREFIX_VAR: &str = "CONDA_PREFIX";

/// Snapshot of the variables and platform the setup steps look at.
#[derive(Debug, Clone)]
pub struct HostEnv {
    vars: BTreeMap<String, String>,
    platform: Platform,
}

impl HostEnv {
    /// An empty environment for the given platform.
    pub fn new(platform: Platform) -> Self {
        Self {
            vars: BTreeMap::new(),
            platform,
        }
    }

    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self::from_vars_os(std::env::vars_os(), Platform::current())
    }

    /// Build a snapshot from raw variables. Entries whose key or value is
    /// not valid UTF-8 are skipped.
    pub fn from_vars_os(
        vars: impl IntoIterator<Item = (OsString, OsString)>,
        platform: Platform,
    ) -> Self {
        let vars = vars
            .into_iter()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    debug!("[r-env] Skipping non UTF-8 environment variable {key:?}");
                    None
                }
            })
            .collect();
        Self { vars, platform }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn os_family(&self) -> OsFamily {
        OsFamily::from_platform(self.platform)
    }

    fn conda_prefix(&self) -> SetupResult<PathBuf> {
        self.var(CONDA_PREFIX_VAR)
            .map(PathBuf::from)
            .ok_or(SetupError::MissingVariable(CONDA_PREFIX_VAR))
    }
}

/// Which development tool the process runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DevTool {
    /// Hosted notebook with non-persistent local disk.
    Colab,
    /// Local environment managed by conda.
    Conda,
    Unsupported,
}

impl fmt::Display for DevTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevTool::Colab => write!(f, "Colab"),
            DevTool::Conda => write!(f, "Anaconda"),
            DevTool::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Classify the host. Colab wins when both markers are present.
pub fn detect_dev_tool(env: &HostEnv) -> DevTool {
    if env.var(COLAB_MARKER_VAR).is_some() {
        DevTool::Colab
    } else if env.var(CONDA_MARKER_VAR).is_some() {
        DevTool::Conda
    } else {
        DevTool::Unsupported
    }
}

/// OS family as far as R's conda layout is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    MacOs,
    Unsupported(String),
}

impl OsFamily {
    pub fn from_platform(platform: Platform) -> Self {
        if platform.is_windows() {
            OsFamily::Windows
        } else if platform.is_osx() {
            OsFamily::MacOs
        } else {
            OsFamily::Unsupported(platform.to_string())
        }
    }

    /// Separator for `PATH`-style lists on this family.
    pub fn path_list_separator(&self) -> char {
        match self {
            OsFamily::Windows => ';',
            _ => ':',
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsFamily::Windows => write!(f, "Windows"),
            OsFamily::MacOs => write!(f, "macOS"),
            OsFamily::Unsupported(name) => write!(f, "{name}"),
        }
    }
}

/// Location of R inside the active conda environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimePaths {
    /// Value for `R_HOME`.
    pub r_home: PathBuf,
    /// Directory appended to the executable search path.
    pub bin_dir: PathBuf,
}

impl RuntimePaths {
    /// Default package library under `R_HOME`.
    pub fn library_dir(&self) -> PathBuf {
        self.r_home.join("library")
    }
}

/// Compute `R_HOME` and the search path addition for a conda host.
pub fn runtime_paths(env: &HostEnv) -> SetupResult<RuntimePaths> {
    let r_home = match env.os_family() {
        OsFamily::Windows => env.conda_prefix()?.join("Lib").join("R"),
        OsFamily::MacOs => env.conda_prefix()?.join("lib").join("R"),
        OsFamily::Unsupported(name) => return Err(SetupError::UnsupportedOs(name)),
    };
    let bin_dir = match env.os_family() {
        OsFamily::Windows => r_home.join("bin").join("x64"),
        _ => r_home.join("bin"),
    };
    Ok(RuntimePaths { r_home, bin_dir })
}

/// Variables a child process needs to find R's shared libraries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvOverrides {
    pub r_home: String,
    pub path: String,
}

impl EnvOverrides {
    /// `(name, value)` pairs ready for `Command::envs`.
    pub fn pairs(&self) -> Vec<(String, String)> {
        vec![
            ("R_HOME".to_string(), self.r_home.clone()),
            ("PATH".to_string(), self.path.clone()),
        ]
    }
}

/// Derive `R_HOME` and an extended `PATH` for a conda host.
///
/// The existing `PATH` comes from the snapshot; the R bin directory is
/// appended with the target family's list separator.
pub fn env_overrides(env: &HostEnv) -> SetupResult<EnvOverrides> {
    let paths = runtime_paths(env)?;
    let separator = env.os_family().path_list_separator();
    let bin_dir = paths.bin_dir.display().to_string();
    let path = match env.var("PATH") {
        Some(existing) if !existing.is_empty() => format!("{existing}{separator}{bin_dir}"),
        _ => bin_dir,
    };
    Ok(EnvOverrides {
        r_home: paths.r_home.display().to_string(),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn conda_env(platform: Platform, prefix: &str) -> HostEnv {
        HostEnv::new(platform)
            .with_var(CONDA_MARKER_VAR, "base")
            .with_var(CONDA_PREFIX_VAR, prefix)
            .with_var("PATH", "/usr/bin")
    }

    #[test]
    fn test_detect_dev_tool() {
        let base = HostEnv::new(Platform::Linux64);
        assert_eq!(detect_dev_tool(&base), DevTool::Unsupported);
        assert_eq!(
            detect_dev_tool(&base.clone().with_var(CONDA_MARKER_VAR, "base")),
            DevTool::Conda
        );
        assert_eq!(
            detect_dev_tool(&base.clone().with_var(COLAB_MARKER_VAR, "0")),
            DevTool::Colab
        );
    }

    #[test]
    fn test_colab_takes_precedence_over_conda() {
        let env = HostEnv::new(Platform::Linux64)
            .with_var(CONDA_MARKER_VAR, "base")
            .with_var(COLAB_MARKER_VAR, "1");
        assert_eq!(detect_dev_tool(&env), DevTool::Colab);
    }

    #[test]
    fn test_os_family_from_platform() {
        assert_eq!(OsFamily::from_platform(Platform::Win64), OsFamily::Windows);
        assert_eq!(OsFamily::from_platform(Platform::Osx64), OsFamily::MacOs);
        assert_eq!(OsFamily::from_platform(Platform::OsxArm64), OsFamily::MacOs);
        assert_eq!(
            OsFamily::from_platform(Platform::Linux64),
            OsFamily::Unsupported("linux-64".to_string())
        );
    }

    #[test]
    fn test_runtime_paths_windows() {
        let prefix = "C:\\Users\\me\\miniconda3";
        let paths = runtime_paths(&conda_env(Platform::Win64, prefix)).unwrap();
        assert_eq!(paths.r_home, Path::new(prefix).join("Lib").join("R"));
        assert_eq!(
            paths.bin_dir,
            Path::new(prefix).join("Lib").join("R").join("bin").join("x64")
        );
    }

    #[test]
    fn test_runtime_paths_macos() {
        for platform in [Platform::Osx64, Platform::OsxArm64] {
            let paths = runtime_paths(&conda_env(platform, "/opt/miniconda3")).unwrap();
            assert_eq!(paths.r_home, Path::new("/opt/miniconda3/lib/R"));
            assert_eq!(paths.bin_dir, Path::new("/opt/miniconda3/lib/R/bin"));
            assert_eq!(
                paths.library_dir(),
                Path::new("/opt/miniconda3/lib/R/library")
            );
        }
    }

    #[test]
    fn test_env_overrides_appends_with_target_separator() {
        let mac = env_overrides(&conda_env(Platform::OsxArm64, "/opt/conda")).unwrap();
        assert_eq!(mac.r_home, "/opt/conda/lib/R");
        assert_eq!(mac.path, "/usr/bin:/opt/conda/lib/R/bin");

        let win = env_overrides(&conda_env(Platform::Win64, "C:\\conda")).unwrap();
        let bin = Path::new("C:\\conda")
            .join("Lib")
            .join("R")
            .join("bin")
            .join("x64");
        assert_eq!(win.path, format!("/usr/bin;{}", bin.display()));
    }

    #[test]
    fn test_env_overrides_without_existing_path() {
        let env = HostEnv::new(Platform::Osx64)
            .with_var(CONDA_MARKER_VAR, "base")
            .with_var(CONDA_PREFIX_VAR, "/opt/conda");
        let overrides = env_overrides(&env).unwrap();
        assert_eq!(overrides.path, "/opt/conda/lib/R/bin");
    }

    #[test]
    fn test_unsupported_os_is_an_error() {
        let env = conda_env(Platform::Linux64, "/opt/conda");
        let err = env_overrides(&env).unwrap_err();
        assert!(matches!(err, SetupError::UnsupportedOs(ref os) if os == "linux-64"));
        assert!(err.is_unsupported());
    }

    #[test]
    #[cfg(unix)]
    fn test_non_utf8_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let env = HostEnv::from_vars_os(
            [
                (OsString::from("JUNK"), OsString::from_vec(vec![0x66, 0xff, 0x6f])),
                (OsString::from_vec(vec![0xfe, 0x41]), OsString::from("x")),
                (OsString::from(CONDA_MARKER_VAR), OsString::from("base")),
            ],
            Platform::Osx64,
        );
        assert_eq!(env.var("JUNK"), None);
        assert_eq!(env.var(CONDA_MARKER_VAR), Some("base"));
        assert_eq!(detect_dev_tool(&env), DevTool::Conda);
    }

    #[test]
    fn test_from_process_does_not_panic() {
        let env = HostEnv::from_process();
        assert_eq!(env.platform(), Platform::current());
    }

    #[test]
    fn test_missing_prefix_is_an_error() {
        let env = HostEnv::new(Platform::Win64).with_var(CONDA_MARKER_VAR, "base");
        assert!(matches!(
            runtime_paths(&env),
            Err(SetupError::MissingVariable(CONDA_PREFIX_VAR))
        ));
    }
}
