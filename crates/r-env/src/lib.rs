//! R runtime setup for notebook kernels.
//!
//! This crate prepares a host so it can drive an R session and makes sure
//! the R packages a notebook needs are installed and loaded. It includes:
//!
//! - Host classification (Colab, conda, unsupported) and `R_HOME`/`PATH`
//!   derivation for conda on Windows and macOS
//! - Installing R (`r-essentials`) and the bridge package through conda
//! - Starting an R session with the right environment and library paths
//! - Installing missing R packages (with native apt dependencies where
//!   needed) and loading them
//!
//! The four entry points are [`platform::env_overrides`],
//! [`install::install_runtime`], [`bridge::initialize`] and
//! [`packages::load_packages`]. All of them take an explicit [`HostEnv`]
//! rather than reading or mutating the process environment.
//!
//! ```ignore
//! use r_env::{bridge, packages, HostEnv, LogHandler, RProcessLauncher, SetupConfig, SystemRunner};
//!
//! let env = HostEnv::from_process();
//! let config = SetupConfig::default();
//! let mut handles = bridge::initialize(&env, &config, &RProcessLauncher::new("R"), &LogHandler)?;
//! let report = packages::load_packages(
//!     &mut handles.session, &env, &config, &SystemRunner, &LogHandler,
//!     &["forecast".to_string()],
//! )?;
//! ```

pub mod bridge;
pub mod command;
pub mod config;
pub mod convert;
pub mod error;
pub mod install;
pub mod packages;
pub mod platform;
pub mod progress;
pub mod rcode;
pub mod session;

// Re-export key types
pub use bridge::BridgeHandles;
pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use config::SetupConfig;
pub use convert::{Column, ColumnData, Conversion, Frame};
pub use error::{SetupError, SetupResult};
pub use packages::LoadReport;
pub use platform::{DevTool, EnvOverrides, HostEnv, OsFamily, RuntimePaths};
pub use progress::{ConsoleHandler, LogHandler, ProgressHandler, SetupPhase};
pub use rcode::StrVector;
pub use session::{RLauncher, RProcess, RProcessLauncher, RSession};
