//! rbridge CLI entry point.
//!
//! Prepares an R runtime for the current notebook host: derives the conda
//! paths, installs R and the bridge package, starts a session and
//! installs/loads R packages.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use r_env::config::default_config_path;
use r_env::{
    bridge, install, packages, platform, ConsoleHandler, HostEnv, LoadReport, RProcessLauncher,
    RSession, SetupConfig, SetupError, SystemRunner,
};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Parser, Debug)]
#[command(name = "rbridge")]
#[command(about = "Prepare R and R packages for notebook kernels")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Config file (default: <config dir>/rbridge/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// CRAN mirror used for package installs
    #[arg(long, global = true)]
    cran: Option<String>,

    /// Persistent R library directory on Colab
    #[arg(long, global = true)]
    colab_lib: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the R_HOME and PATH a conda host needs
    Paths {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Install R and the bridge package if they are missing
    Install,
    /// Start an R session for this host and report its version
    Init,
    /// Install missing R packages and load them
    Load {
        /// R packages to install and load
        #[arg(required = true)]
        packages: Vec<String>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "PACKAGE")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "LOADED")]
    loaded: String,
}

#[derive(Serialize)]
struct PathsOutput {
    dev_tool: platform::DevTool,
    os: String,
    #[serde(flatten)]
    overrides: r_env::EnvOverrides,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let config = load_config(&cli)?;
    let env = HostEnv::from_process();

    match run(cli.command, &env, &config) {
        Err(e) if is_unsupported(&e) => {
            eprintln!("rbridge: {e}");
            std::process::exit(1);
        }
        other => other,
    }
}

fn load_config(cli: &Cli) -> Result<SetupConfig> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = SetupConfig::load_or_default(&path)?;
    if let Some(cran) = &cli.cran {
        config.cran_repo = cran.clone();
    }
    if let Some(dir) = &cli.colab_lib {
        config.colab_lib_dir = dir.clone();
    }
    Ok(config)
}

fn is_unsupported(e: &anyhow::Error) -> bool {
    e.downcast_ref::<SetupError>()
        .is_some_and(SetupError::is_unsupported)
}

fn run(command: Commands, env: &HostEnv, config: &SetupConfig) -> Result<()> {
    match command {
        Commands::Paths { json } => show_paths(env, json),
        Commands::Install => {
            install::install_runtime(env, config, &SystemRunner, &ConsoleHandler)?;
            Ok(())
        }
        Commands::Init => {
            let launcher = RProcessLauncher::new(&config.r_program);
            let mut handles = bridge::initialize(env, config, &launcher, &ConsoleHandler)?;
            let version = handles
                .session
                .eval("cat(R.version.string, \"\\n\", sep = \"\")")?;
            println!("{}", version.join("\n"));
            Ok(())
        }
        Commands::Load { packages, json } => load(env, config, &packages, json),
    }
}

fn show_paths(env: &HostEnv, json: bool) -> Result<()> {
    let overrides = platform::env_overrides(env)?;
    if json {
        let output = PathsOutput {
            dev_tool: platform::detect_dev_tool(env),
            os: env.os_family().to_string(),
            overrides,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("R_HOME={}", overrides.r_home);
        println!("PATH={}", overrides.path);
    }
    Ok(())
}

fn load(env: &HostEnv, config: &SetupConfig, required: &[String], json: bool) -> Result<()> {
    let launcher = RProcessLauncher::new(&config.r_program);
    let mut handles = bridge::initialize(env, config, &launcher, &ConsoleHandler)?;
    let report = packages::load_packages(
        &mut handles.session,
        env,
        config,
        &SystemRunner,
        &ConsoleHandler,
        required,
    )?;
    info!("Loaded {}/{} packages", report.loaded.len(), required.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_table(required, &report);
    }
    Ok(())
}

fn print_report_table(required: &[String], report: &LoadReport) {
    let rows: Vec<PackageRow> = required
        .iter()
        .map(|name| PackageRow {
            name: name.clone(),
            status: if report.installed.contains(name) {
                "installed".to_string()
            } else if report.already_installed.contains(name) {
                "present".to_string()
            } else {
                "missing".to_string()
            },
            loaded: if report.loaded.contains(name) {
                "yes".to_string()
            } else {
                "no".to_string()
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_load_requires_packages() {
        assert!(Cli::try_parse_from(["rbridge", "load"]).is_err());
        let cli = Cli::try_parse_from(["rbridge", "load", "forecast", "vars", "--json"]).unwrap();
        match cli.command {
            Commands::Load { packages, json } => {
                assert_eq!(packages, vec!["forecast", "vars"]);
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "rbridge",
            "--config",
            "/nonexistent/rbridge.json",
            "--cran",
            "https://cloud.r-project.org",
            "--colab-lib",
            "/mnt/Rlibs",
            "install",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.cran_repo, "https://cloud.r-project.org");
        assert_eq!(config.colab_lib_dir, PathBuf::from("/mnt/Rlibs"));
    }

    #[test]
    fn test_unsupported_errors_are_detected() {
        assert!(is_unsupported(&anyhow::Error::new(
            SetupError::UnsupportedDevTool
        )));
        assert!(!is_unsupported(&anyhow::anyhow!("network down")));
    }
}
