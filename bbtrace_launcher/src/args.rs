use std::{ffi::OsString, path::PathBuf};

use bbtrace::{
    options::{normalize_knobs, usage, TRACE_KNOBS},
    TraceOptions,
};
use clap::{CommandFactory, Parser};

/// Launcher-only knobs, on top of [`TRACE_KNOBS`]
const LAUNCHER_KNOBS: &[&str] = &["agent"];

#[derive(Parser, Debug)]
#[command(
    name = "bbtrace",
    about = "bbtrace",
    long_about = "Runs a program and prints the address of every basic block it executes",
    disable_version_flag = true
)]
pub struct Args {
    #[command(flatten)]
    knobs: TraceOptions,

    #[arg(
        long = "agent",
        value_name = "PATH",
        help = "Agent library to preload (defaults to the one next to this binary)"
    )]
    agent: Option<PathBuf>,

    #[arg(
        last = true,
        required = true,
        num_args = 1..,
        value_name = "PROGRAM",
        help = "The program to trace and its arguments, after `--`"
    )]
    target: Vec<OsString>,
}

impl Args {
    pub fn try_parse_knobs<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let known: Vec<&str> = TRACE_KNOBS.iter().chain(LAUNCHER_KNOBS).copied().collect();
        Self::try_parse_from(normalize_knobs(args, &known))
    }

    pub fn usage() -> String {
        usage(&mut Self::command())
    }

    pub fn knobs(&self) -> &TraceOptions {
        &self.knobs
    }

    pub fn agent(&self) -> Option<&PathBuf> {
        self.agent.as_ref()
    }

    /// The program to run and its arguments
    pub fn target(&self) -> Option<(&OsString, &[OsString])> {
        self.target.split_first()
    }
}
