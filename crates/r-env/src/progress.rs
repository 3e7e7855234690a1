//! Progress reporting for setup operations.
//!
//! Provides [`SetupPhase`] events covering runtime detection, installation
//! and package loading, and a [`ProgressHandler`] trait that consumers
//! implement to route events to their UI layer.

use serde::{Deserialize, Serialize};

/// Progress phases during R runtime setup.
///
/// Serializable so a front end can forward them as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SetupPhase {
    /// Host OS as reported at session start.
    OperatingSystem { name: String },
    /// Development tool the session runs under.
    DevTool { name: String },
    /// `R --version` succeeded.
    RuntimePresent,
    /// R was not found and will be installed.
    InstallingRuntime,
    /// A conda package is being installed.
    InstallingSystemPackage { package: String },
    /// A conda package was already present.
    SystemPackagePresent { package: String },
    /// Native libraries installed ahead of an R package.
    InstallingNativeLibraries {
        for_package: String,
        libraries: Vec<String>,
    },
    /// An R package is being installed.
    InstallingPackage { package: String },
    /// R packages that ended up loaded.
    PackagesLoaded { packages: Vec<String> },
}

/// Trait for receiving setup progress events.
pub trait ProgressHandler {
    fn on_progress(&self, phase: SetupPhase);
}

/// Log-only progress handler.
///
/// Writes progress phases to the `log` crate at info level.
pub struct LogHandler;

impl ProgressHandler for LogHandler {
    fn on_progress(&self, phase: SetupPhase) {
        log::info!("[r-env] {}", status_line(&phase));
    }
}

/// Prints one status line per phase to stdout.
pub struct ConsoleHandler;

impl ProgressHandler for ConsoleHandler {
    fn on_progress(&self, phase: SetupPhase) {
        println!("{}", status_line(&phase));
    }
}

/// Human-readable line for a phase.
pub fn status_line(phase: &SetupPhase) -> String {
    match phase {
        SetupPhase::OperatingSystem { name } => format!("Operating system: {name}"),
        SetupPhase::DevTool { name } => format!("Development tool: {name}"),
        SetupPhase::RuntimePresent => "R installed".to_string(),
        SetupPhase::InstallingRuntime => {
            "Installing R and essential packages (this can take a few minutes)".to_string()
        }
        SetupPhase::InstallingSystemPackage { package } => format!("Installing {package}..."),
        SetupPhase::SystemPackagePresent { package } => {
            format!("{package} is already installed.")
        }
        SetupPhase::InstallingNativeLibraries {
            for_package,
            libraries,
        } => format!(
            "Installing dependency libraries {} for '{for_package}'",
            libraries.join(", ")
        ),
        SetupPhase::InstallingPackage { package } => {
            format!("Installing R package '{package}'...")
        }
        SetupPhase::PackagesLoaded { packages } => {
            format!("R packages loaded: {}", packages.join(", "))
        }
    }
}
