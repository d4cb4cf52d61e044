/*!
Frida backend for `bbtrace`.

Built as a `cdylib`, this crate is the agent: preload it into a target
(the `bbtrace` launcher does this) and every basic block the target's
threads execute is reported on stdout. New threads are picked up through
`pthread_create` on Linux.
*/

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
#![cfg_attr(not(test), warn(
    missing_debug_implementations,
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
))]

pub mod host;
#[cfg(target_os = "linux")]
pub mod threads;

/// The preload entry point. Left out of test builds, where it would stalk the test harness.
#[cfg(not(test))]
pub mod agent;

pub use host::{Follower, FridaHost};
