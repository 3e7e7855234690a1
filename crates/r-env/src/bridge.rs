//! Starting an R session ready to be driven from the host.

use log::info;

use crate::config::SetupConfig;
use crate::convert::Conversion;
use crate::error::SetupResult;
use crate::platform::{detect_dev_tool, env_overrides, runtime_paths, DevTool, HostEnv, OsFamily};
use crate::progress::{ProgressHandler, SetupPhase};
use crate::rcode::StrVector;
use crate::session::{RLauncher, RSession};

/// Constructor for R character vectors, handed out with the session.
pub type StrVectorCtor = fn(&[String]) -> StrVector;

/// What [`initialize`] hands back to the caller.
pub struct BridgeHandles<S: RSession> {
    /// The R session binding.
    pub session: S,
    /// Active host/R tabular conversion.
    pub conversion: Conversion,
    /// Builds R character vectors from host strings.
    pub str_vector: StrVectorCtor,
}

/// Start an R session configured for this host.
///
/// Conda hosts get `R_HOME` and `PATH` overrides on the R process, plus
/// R-side `PATH` entries so R's loader finds `R.dll`, `Rblas.dll` and
/// friends on Windows. Colab sessions have `.libPaths()` pointed at the
/// persistent drive library.
pub fn initialize<L: RLauncher>(
    env: &HostEnv,
    config: &SetupConfig,
    launcher: &L,
    handler: &dyn ProgressHandler,
) -> SetupResult<BridgeHandles<L::Session>> {
    let dev_tool = detect_dev_tool(env);
    let os = env.os_family();
    handler.on_progress(SetupPhase::OperatingSystem {
        name: os.to_string(),
    });

    let envs = match dev_tool {
        DevTool::Conda => env_overrides(env)?.pairs(),
        _ => Vec::new(),
    };
    let mut session = launcher.launch(&envs)?;
    let conversion = Conversion::activate(&mut session)?;

    match dev_tool {
        DevTool::Colab => {
            handler.on_progress(SetupPhase::DevTool {
                name: dev_tool.to_string(),
            });
            session.set_lib_paths(std::slice::from_ref(&config.colab_lib_dir))?;
        }
        DevTool::Conda => {
            handler.on_progress(SetupPhase::DevTool {
                name: dev_tool.to_string(),
            });
            let paths = runtime_paths(env)?;
            let separator = os.path_list_separator();
            let mut entries = vec![forward_slashes(&paths.bin_dir)];
            if os == OsFamily::Windows {
                entries.push(forward_slashes(&paths.r_home));
            }
            for entry in entries {
                info!("[r-env] Adding {entry} to R's PATH");
                session.append_path_entry(&entry, separator)?;
            }
        }
        DevTool::Unsupported => {
            info!("[r-env] No development tool detected, using R defaults");
        }
    }

    Ok(BridgeHandles {
        session,
        conversion,
        str_vector: StrVector::from_slice::<String>,
    })
}

fn forward_slashes(path: &std::path::Path) -> String {
    path.display().to_string().replace('\\', "/")
}
