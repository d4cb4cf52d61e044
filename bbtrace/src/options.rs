//! Tool knobs: parsing from the command line and the handoff to the agent.
//!
//! Knobs are spelled Pin style, with a single dash (`-o`, `-log 0`,
//! `-threshold 0x7f0000000000`). clap only understands single-dash short
//! flags, so [`normalize_knobs`] rewrites the long single-dash spellings
//! before parsing.

use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

use clap::{builder::BoolishValueParser, ArgAction, Args, CommandFactory, Parser};
use serde::{Deserialize, Serialize};

use crate::{reporter::DEFAULT_ADDRESS_THRESHOLD, Error};

/// Environment variable the launcher uses to hand validated knobs to the agent
pub const OPTIONS_ENV: &str = "BBTRACE_OPTIONS";

/// Exit status of the usage path
pub const USAGE_EXIT_CODE: i32 = -1;

/// The long knobs understood by [`TraceOptions`]
pub const TRACE_KNOBS: &[&str] = &["log", "threshold", "help"];

const USAGE_HEADER: &str = "This tool prints out the address of each basic block that\n\
                            gets executed for use with code coverage analysis\n";

/// The options of a tracing session
#[derive(Args, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOptions {
    /// specify file name for the diagnostic output (defaults to stderr)
    #[arg(short = 'o', value_name = "PATH")]
    output_file: Option<PathBuf>,

    /// log basic blocks executed in the application
    #[arg(
        long = "log",
        value_name = "0|1",
        default_value = "1",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set
    )]
    log: bool,

    /// blocks starting at or above this address are not reported
    #[arg(
        long = "threshold",
        value_name = "ADDR",
        default_value = "0x7f0000000000",
        value_parser = parse_address
    )]
    threshold: u64,
}

#[derive(Parser, Debug)]
#[command(name = "bbtrace", disable_version_flag = true)]
struct KnobParser {
    #[command(flatten)]
    options: TraceOptions,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            output_file: None,
            log: true,
            threshold: DEFAULT_ADDRESS_THRESHOLD,
        }
    }
}

impl TraceOptions {
    /// Parse the knobs from `args`; the first item is the program name.
    pub fn try_parse_knobs<I, T>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args = normalize_knobs(args, TRACE_KNOBS);
        Ok(KnobParser::try_parse_from(args)?.options)
    }

    /// The usage text for the knobs alone.
    #[must_use]
    pub fn usage() -> String {
        usage(&mut KnobParser::command())
    }

    /// Read the options handed over by the launcher.
    ///
    /// An agent loaded without the launcher runs with default knobs.
    pub fn from_env() -> Result<Self, Error> {
        match env::var(OPTIONS_ENV) {
            Ok(value) => Self::from_json(&value),
            Err(env::VarError::NotPresent) => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Deserialize from the launcher's handoff format
    pub fn from_json(value: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(value)?)
    }

    /// Serialize into the launcher's handoff format
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Set the diagnostic output file
    #[must_use]
    pub fn with_output_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output_file = Some(path.as_ref().into());
        self
    }

    /// Enable or disable instrumentation
    #[must_use]
    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    /// Set the reporting threshold
    #[must_use]
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// The diagnostic output file, if any. An empty `-o` means none.
    #[must_use]
    #[inline]
    pub fn output_file(&self) -> Option<&Path> {
        self.output_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Is basic block instrumentation enabled?
    #[must_use]
    #[inline]
    pub fn log_enabled(&self) -> bool {
        self.log
    }

    /// The address at and above which blocks are dropped
    #[must_use]
    #[inline]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

/// Render the usage text of `cmd`, prefixed with a description of the tool.
pub fn usage(cmd: &mut clap::Command) -> String {
    format!("{USAGE_HEADER}\n{}", cmd.render_help())
}

/// Rewrite single-dash long knobs (`-log`, `-log=0`) to clap's `--log`.
///
/// Only names in `knobs` are touched, and nothing after a bare `--`.
pub fn normalize_knobs<I, T>(args: I, knobs: &[&str]) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut trailing = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if trailing {
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if text == "--" {
                trailing = true;
                return arg;
            }
            match text.strip_prefix('-') {
                Some(rest) if !rest.starts_with('-') => {
                    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
                    if knobs.contains(&name) {
                        OsString::from(format!("-{text}"))
                    } else {
                        arg
                    }
                }
                _ => arg,
            }
        })
        .collect()
}

/// Parse an address given in hex (`0x` prefix optional for hex digits) or decimal.
pub fn parse_address(value: &str) -> Result<u64, String> {
    let value = value.trim().replace('_', "");
    let parsed = if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else if value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse()
    } else {
        u64::from_str_radix(&value, 16)
    };
    parsed.map_err(|err| format!("invalid address `{value}`: {err}"))
}
