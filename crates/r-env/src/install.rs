//! Installing R and the bridge package through conda.

use log::info;

use crate::command::{run_checked, CommandRunner, CommandSpec};
use crate::config::SetupConfig;
use crate::error::{SetupError, SetupResult};
use crate::platform::{detect_dev_tool, env_overrides, DevTool, HostEnv, CONDA_PREFIX_VAR};
use crate::progress::{ProgressHandler, SetupPhase};

/// Make sure R and the bridge package are available.
///
/// Probes `R --version`; when R is missing on a conda host the runtime
/// packages are installed. On conda hosts the bridge package is then
/// installed into the active prefix if `conda list` does not show it.
///
/// Not safe to run concurrently against the same prefix.
pub fn install_runtime(
    env: &HostEnv,
    config: &SetupConfig,
    runner: &impl CommandRunner,
    handler: &dyn ProgressHandler,
) -> SetupResult<()> {
    let dev_tool = detect_dev_tool(env);

    if runtime_present(config, runner)? {
        handler.on_progress(SetupPhase::RuntimePresent);
    } else {
        handler.on_progress(SetupPhase::InstallingRuntime);
        install_runtime_packages(env, dev_tool, config, runner, handler)?;
    }

    if dev_tool == DevTool::Conda {
        let envs = env_overrides(env)?.pairs();
        let bridge = &config.bridge_package;
        if conda_has_package(config, runner, bridge, &envs)? {
            info!("[r-env] {bridge} already present");
        } else {
            let prefix = env
                .var(CONDA_PREFIX_VAR)
                .ok_or(SetupError::MissingVariable(CONDA_PREFIX_VAR))?;
            handler.on_progress(SetupPhase::InstallingSystemPackage {
                package: bridge.clone(),
            });
            let spec = CommandSpec::new(
                &config.conda_program,
                [
                    "install",
                    "--yes",
                    "--prefix",
                    prefix,
                    "-c",
                    config.bridge_channel.as_str(),
                    bridge.as_str(),
                ],
            )
            .with_envs(envs);
            run_checked(runner, &spec)?;
        }
    }

    Ok(())
}

/// Whether `R --version` runs successfully.
fn runtime_present(config: &SetupConfig, runner: &impl CommandRunner) -> SetupResult<bool> {
    let probe = CommandSpec::new(&config.r_program, ["--version"]);
    match runner.run(&probe) {
        Ok(output) => Ok(output.success()),
        Err(SetupError::ProgramNotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

fn install_runtime_packages(
    env: &HostEnv,
    dev_tool: DevTool,
    config: &SetupConfig,
    runner: &impl CommandRunner,
    handler: &dyn ProgressHandler,
) -> SetupResult<()> {
    if dev_tool != DevTool::Conda {
        return Err(SetupError::UnsupportedDevTool);
    }
    let envs = env_overrides(env)?.pairs();

    for package in &config.runtime_packages {
        if conda_has_package(config, runner, package, &envs)? {
            handler.on_progress(SetupPhase::SystemPackagePresent {
                package: package.clone(),
            });
            continue;
        }
        handler.on_progress(SetupPhase::InstallingSystemPackage {
            package: package.clone(),
        });
        let spec = CommandSpec::new(&config.conda_program, ["install", "--yes", package.as_str()])
            .with_envs(envs.clone());
        run_checked(runner, &spec)?;
    }
    Ok(())
}

/// `conda list <package>` has a row for exactly `package`.
fn conda_has_package(
    config: &SetupConfig,
    runner: &impl CommandRunner,
    package: &str,
    envs: &[(String, String)],
) -> SetupResult<bool> {
    let spec = CommandSpec::new(&config.conda_program, ["list", package]).with_envs(envs.to_vec());
    let output = runner.run(&spec)?;
    Ok(listing_contains(&output.stdout, package))
}

/// Whether a `conda list` listing has a row named `package`. Comment lines
/// (the `# packages in environment at <prefix>:` header) are skipped.
fn listing_contains(listing: &str, package: &str) -> bool {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == package)
}
