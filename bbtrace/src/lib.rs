/*!
`bbtrace` prints the start address of every basic block a program executes,
one `BB: 0x<addr>` line per block, for code coverage tooling to consume.

This crate is the host-agnostic core. The instrumentation engine that runs the
target is behind [`host::InstrumentationHost`]; `bbtrace_frida` implements it
on top of Frida Stalker, and [`host::SimulatedHost`] drives synthetic code
units in tests.
*/

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(
    clippy::unreadable_literal,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]
#![cfg_attr(not(test), warn(
    missing_debug_implementations,
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
))]
#![cfg_attr(test, deny(
    missing_debug_implementations,
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_must_use,
))]

pub mod error;
pub mod host;
pub mod logger;
pub mod options;
pub mod output;
pub mod preload;
pub mod reporter;
pub mod session;
pub mod walker;

pub use error::Error;
pub use host::{InstrumentationHost, SimulatedHost, TraceCallback, TraceInstrumentation};
pub use logger::SimpleStderrLogger;
pub use options::TraceOptions;
pub use reporter::{AddressFilter, AddressReporter, DEFAULT_ADDRESS_THRESHOLD};
pub use session::Session;
pub use walker::{BasicBlock, BlockWalker, CodeUnit, HookInsertion, InsertPoint};
