//! Installing and loading the R packages a notebook asks for.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;

use crate::command::{run_checked, CommandRunner, CommandSpec};
use crate::config::SetupConfig;
use crate::error::{SetupError, SetupResult};
use crate::platform::{detect_dev_tool, runtime_paths, DevTool, HostEnv};
use crate::progress::{ProgressHandler, SetupPhase};
use crate::session::RSession;

/// `options(warn)` value that drops warnings entirely.
const WARN_SUPPRESSED: i32 = -1;

/// Outcome of [`load_packages`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Required packages that were installed before the call.
    pub already_installed: Vec<String>,
    /// Required packages that were missing.
    pub missing: Vec<String>,
    /// Packages installed by this call.
    pub installed: Vec<String>,
    /// Required packages loaded in the session afterwards.
    pub loaded: Vec<String>,
}

/// Split `required` into (present, missing) against `installed`.
///
/// `present` keeps duplicates and order; `missing` is a set difference
/// in first-occurrence order.
pub fn partition_required(required: &[String], installed: &[String]) -> (Vec<String>, Vec<String>) {
    let installed: HashSet<&str> = installed.iter().map(String::as_str).collect();
    let present = required
        .iter()
        .filter(|p| installed.contains(p.as_str()))
        .cloned()
        .collect();
    let mut seen = HashSet::new();
    let missing = required
        .iter()
        .filter(|p| !installed.contains(p.as_str()) && seen.insert(p.as_str()))
        .cloned()
        .collect();
    (present, missing)
}

/// Install whatever is missing from `required`, then load all of it.
///
/// Warnings are suppressed (`options(warn = -1)`) while installing and the
/// previous value is restored once loading has been verified. An error
/// part-way through returns early and leaves warnings suppressed.
pub fn load_packages<S: RSession>(
    session: &mut S,
    env: &HostEnv,
    config: &SetupConfig,
    runner: &impl CommandRunner,
    handler: &dyn ProgressHandler,
    required: &[String],
) -> SetupResult<LoadReport> {
    let (already_installed, missing) = partition_required(required, &session.installed_packages()?);
    info!(
        "[r-env] {} of {} required R packages missing: {:?}",
        missing.len(),
        required.len(),
        missing
    );

    // Unsupported hosts fail here, before the session is touched.
    let target = install_target(env, &missing)?;

    let previous_warn = session.warn_level()?;
    session.set_warn_level(WARN_SUPPRESSED)?;

    let installed = match target {
        InstallTarget::Colab => install_on_colab(session, config, runner, handler, &missing)?,
        InstallTarget::Library(lib) => {
            session.set_lib_paths(std::slice::from_ref(&lib))?;
            install_into(session, config, handler, &missing, &lib)?
        }
        InstallTarget::Nothing => Vec::new(),
    };

    session.load_packages(required)?;

    let loaded_namespaces: HashSet<String> = session.loaded_namespaces()?.into_iter().collect();
    let loaded: Vec<String> = required
        .iter()
        .filter(|p| loaded_namespaces.contains(p.as_str()))
        .cloned()
        .collect();
    handler.on_progress(SetupPhase::PackagesLoaded {
        packages: loaded.clone(),
    });

    session.set_warn_level(previous_warn)?;

    Ok(LoadReport {
        already_installed,
        missing,
        installed,
        loaded,
    })
}

/// Where missing packages go on this host.
#[derive(Debug)]
enum InstallTarget {
    Colab,
    Library(PathBuf),
    Nothing,
}

fn install_target(env: &HostEnv, missing: &[String]) -> SetupResult<InstallTarget> {
    match detect_dev_tool(env) {
        DevTool::Colab => Ok(InstallTarget::Colab),
        DevTool::Conda => Ok(InstallTarget::Library(runtime_paths(env)?.library_dir())),
        DevTool::Unsupported if missing.is_empty() => {
            warn!("[r-env] Unsupported development tool, nothing to install");
            Ok(InstallTarget::Nothing)
        }
        DevTool::Unsupported => Err(SetupError::UnsupportedDevTool),
    }
}

fn install_on_colab<S: RSession>(
    session: &mut S,
    config: &SetupConfig,
    runner: &impl CommandRunner,
    handler: &dyn ProgressHandler,
    missing: &[String],
) -> SetupResult<Vec<String>> {
    let lib = config.colab_lib_dir.clone();
    if !lib.exists() {
        info!("[r-env] Creating R library at {:?}", lib);
        std::fs::create_dir_all(&lib)?;
    }
    session.set_lib_paths(std::slice::from_ref(&lib))?;

    let mut installed = Vec::with_capacity(missing.len());
    for package in missing {
        install_native_dependencies(config, runner, handler, package)?;
        install_one(session, config, handler, package, &lib)?;
        installed.push(package.clone());
    }
    Ok(installed)
}

fn install_into<S: RSession>(
    session: &mut S,
    config: &SetupConfig,
    handler: &dyn ProgressHandler,
    missing: &[String],
    lib: &Path,
) -> SetupResult<Vec<String>> {
    let mut installed = Vec::with_capacity(missing.len());
    for package in missing {
        install_one(session, config, handler, package, lib)?;
        installed.push(package.clone());
    }
    Ok(installed)
}

fn install_one<S: RSession>(
    session: &mut S,
    config: &SetupConfig,
    handler: &dyn ProgressHandler,
    package: &str,
    lib: &Path,
) -> SetupResult<()> {
    handler.on_progress(SetupPhase::InstallingPackage {
        package: package.to_string(),
    });
    session.install_package(package, lib, &config.cran_repo)
}

/// apt-install the native libraries `package` builds against, if any.
fn install_native_dependencies(
    config: &SetupConfig,
    runner: &impl CommandRunner,
    handler: &dyn ProgressHandler,
    package: &str,
) -> SetupResult<()> {
    let libraries = config.native_dependencies_for(package);
    if libraries.is_empty() {
        return Ok(());
    }

    handler.on_progress(SetupPhase::InstallingNativeLibraries {
        for_package: package.to_string(),
        libraries: libraries.to_vec(),
    });
    run_checked(runner, &CommandSpec::new("sudo", ["apt-get", "update"]))?;
    for library in libraries {
        run_checked(
            runner,
            &CommandSpec::new("sudo", ["apt-get", "install", "-y", library.as_str()]),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_partition_required() {
        let (present, missing) = partition_required(
            &names(&["forecast", "vars", "rmgarch", "vars"]),
            &names(&["base", "stats", "forecast"]),
        );
        assert_eq!(present, names(&["forecast"]));
        assert_eq!(missing, names(&["vars", "rmgarch"]));
    }

    #[test]
    fn test_partition_all_installed() {
        let (present, missing) =
            partition_required(&names(&["stats", "utils"]), &names(&["utils", "stats"]));
        assert_eq!(present, names(&["stats", "utils"]));
        assert!(missing.is_empty());
    }
}
