//! `bbtrace [-o <path>] [-log <0|1>] [-threshold <addr>] [-agent <path>] -- <program> [args...]`
//!
//! Validates the knobs, then replaces itself with `program`, preloading the
//! agent library that does the actual tracing.

mod args;

use std::{env, ffi::OsString, path::PathBuf, process};

use anyhow::{anyhow, Context, Result};
use bbtrace::{
    options::{OPTIONS_ENV, USAGE_EXIT_CODE},
    preload::{self, AGENT_ENV, PRELOAD_ENV},
    SimpleStderrLogger,
};
use clap::error::ErrorKind;
use log::{debug, info};

use crate::args::Args;

#[cfg(target_vendor = "apple")]
const AGENT_FILE: &str = "libbbtrace_frida.dylib";
#[cfg(not(target_vendor = "apple"))]
const AGENT_FILE: &str = "libbbtrace_frida.so";

fn main() {
    let args = match Args::try_parse_knobs(env::args_os()) {
        Ok(args) => args,
        Err(err) => {
            if err.kind() != ErrorKind::DisplayHelp {
                eprintln!("{}", err.render());
            }
            eprint!("{}", Args::usage());
            process::exit(USAGE_EXIT_CODE);
        }
    };

    if let Err(err) = run(&args) {
        eprintln!("bbtrace: {err:#}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    SimpleStderrLogger::init_from_env();

    let (program, program_args) = args
        .target()
        .ok_or_else(|| anyhow!("No program to trace"))?;
    let agent = resolve_agent(args.agent())?;
    let options = args.knobs().to_json()?;
    info!("tracing {program:?} with agent {}", agent.display());
    debug!("{OPTIONS_ENV}={options}");

    let preload = preload::prepend(&agent, env::var_os(PRELOAD_ENV));
    exec(program, program_args, &[
        (OPTIONS_ENV, OsString::from(options)),
        (AGENT_ENV, agent.into_os_string()),
        (PRELOAD_ENV, preload),
    ])
}

/// The agent given on the command line, or the one installed next to the launcher.
fn resolve_agent(agent: Option<&PathBuf>) -> Result<PathBuf> {
    let agent = match agent {
        Some(agent) => agent.clone(),
        None => env::current_exe()
            .context("Failed to locate the launcher binary")?
            .parent()
            .ok_or_else(|| anyhow!("Launcher binary has no parent directory"))?
            .join(AGENT_FILE),
    };
    if !agent.is_file() {
        return Err(anyhow!(
            "Agent library {} not found (build bbtrace_frida or pass -agent)",
            agent.display()
        ));
    }
    // The loader resolves relative preload paths against the target's cwd.
    agent
        .canonicalize()
        .with_context(|| format!("Failed to resolve agent path {}", agent.display()))
}

#[cfg(unix)]
fn exec(program: &OsString, program_args: &[OsString], vars: &[(&str, OsString)]) -> Result<()> {
    use std::os::unix::process::CommandExt;

    let err = process::Command::new(program)
        .args(program_args)
        .envs(vars.iter().map(|(key, value)| (key, value)))
        .exec();
    Err(anyhow!("Failed to exec {program:?}: {err}"))
}

#[cfg(not(unix))]
fn exec(
    _program: &OsString,
    _program_args: &[OsString],
    _vars: &[(&str, OsString)],
) -> Result<()> {
    Err(anyhow!("Preloading an agent is only supported on unix"))
}
