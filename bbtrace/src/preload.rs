//! The preload environment shared by the launcher and the agent.
//!
//! The launcher puts the agent in front of the loader's preload list and
//! names it in [`AGENT_ENV`]. Once the agent has read its knobs it calls
//! [`scrub_env`], so processes started by the target run untraced.

use std::{
    env,
    ffi::{OsStr, OsString},
    path::Path,
};

use log::debug;

use crate::options::OPTIONS_ENV;

/// The loader's preload variable
#[cfg(target_vendor = "apple")]
pub const PRELOAD_ENV: &str = "DYLD_INSERT_LIBRARIES";
/// The loader's preload variable
#[cfg(not(target_vendor = "apple"))]
pub const PRELOAD_ENV: &str = "LD_PRELOAD";

/// Environment variable naming the agent the launcher preloaded
pub const AGENT_ENV: &str = "BBTRACE_AGENT";

/// Put `agent` in front of whatever the environment already preloads.
pub fn prepend(agent: &Path, existing: Option<OsString>) -> OsString {
    let mut value = OsString::from(agent);
    if let Some(existing) = existing.filter(|existing| !existing.is_empty()) {
        value.push(":");
        value.push(existing);
    }
    value
}

/// Take every `agent` entry out of a preload list, returning what is left.
///
/// The loader splits the list on colons and spaces. A list that is not
/// UTF-8 is returned untouched.
pub fn remove(list: &OsStr, agent: &Path) -> Option<OsString> {
    let Some(text) = list.to_str() else {
        return Some(list.to_owned());
    };
    let agent = agent.to_str();
    let kept: Vec<&str> = text
        .split(|c| c == ':' || c == ' ')
        .filter(|entry| !entry.is_empty() && Some(*entry) != agent)
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join(":").into())
    }
}

/// Drop the launcher's handoff from this process' environment.
///
/// Must run before the target starts other threads. An agent preloaded by
/// hand (no [`AGENT_ENV`]) leaves the preload list alone.
pub fn scrub_env() {
    env::remove_var(OPTIONS_ENV);
    let Some(agent) = env::var_os(AGENT_ENV) else {
        return;
    };
    env::remove_var(AGENT_ENV);
    if let Some(list) = env::var_os(PRELOAD_ENV) {
        match remove(&list, Path::new(&agent)) {
            Some(rest) => env::set_var(PRELOAD_ENV, rest),
            None => env::remove_var(PRELOAD_ENV),
        }
    }
    debug!("handoff removed from the environment");
}
