//! The seam between the tool and the instrumentation engine that runs the target.
//!
//! The engine owns the process: it compiles code units, asks the tool to
//! instrument them, and runs the inserted hooks. The tool only sees the two
//! callbacks of [`TraceCallback`].

use std::{
    collections::HashMap,
    fmt,
    io::Write,
    sync::Arc,
};

use crate::{
    reporter::{AddressFilter, AddressReporter},
    walker::{BlockWalker, CodeUnit, HookInsertion},
    Error,
};

/// The callbacks a host invokes
pub trait TraceCallback: Send + Sync {
    /// Called once when the host compiles `unit`, before it first runs
    fn on_unit_compiled(&self, unit: &CodeUnit) -> Vec<HookInsertion>;

    /// Called by an inserted hook, right before the block at `address` runs
    fn on_block_entered(&self, address: u64);
}

/// An instrumentation engine able to run the tool
pub trait InstrumentationHost {
    /// Ask the host to call `callback` for every newly compiled unit
    fn add_trace_instrumentation(&mut self, callback: Arc<dyn TraceCallback>)
        -> Result<(), Error>;

    /// Hand the process over to the host.
    ///
    /// Hosts that run the target in place of the caller may never return.
    fn start_program(&mut self) -> Result<(), Error>;
}

/// The block walker and the address reporter, bundled as one [`TraceCallback`]
pub struct TraceInstrumentation<W> {
    walker: BlockWalker,
    reporter: AddressReporter<W>,
}

impl<W> fmt::Debug for TraceInstrumentation<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceInstrumentation")
            .field("walker", &self.walker)
            .field("reporter", &self.reporter)
            .finish()
    }
}

impl<W> TraceInstrumentation<W>
where
    W: Write,
{
    /// Report blocks passing `filter` into `sink`
    #[must_use]
    pub fn new(filter: AddressFilter, sink: W) -> Self {
        Self {
            walker: BlockWalker::new(),
            reporter: AddressReporter::new(filter, sink),
        }
    }
}

impl<W> TraceCallback for TraceInstrumentation<W>
where
    W: Write + Send,
{
    fn on_unit_compiled(&self, unit: &CodeUnit) -> Vec<HookInsertion> {
        self.walker.on_unit_compiled(unit)
    }

    #[inline]
    fn on_block_entered(&self, address: u64) {
        self.reporter.on_block_entered(address);
    }
}

/// An in-memory host driving synthetic units.
///
/// Compiled units are cached by entry address, like a real engine's code
/// cache: a unit is instrumented once and its hooks fire on every run.
#[derive(Default)]
pub struct SimulatedHost {
    callbacks: Vec<Arc<dyn TraceCallback>>,
    cache: HashMap<u64, Vec<(usize, HookInsertion)>>,
    started: bool,
}

impl fmt::Debug for SimulatedHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedHost")
            .field("callbacks", &self.callbacks.len())
            .field("cached_units", &self.cache.len())
            .field("started", &self.started)
            .finish()
    }
}

impl SimulatedHost {
    /// Create a new [`SimulatedHost`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered trace callbacks
    #[must_use]
    pub fn registered(&self) -> usize {
        self.callbacks.len()
    }

    /// Has [`InstrumentationHost::start_program`] been called?
    #[must_use]
    pub fn started(&self) -> bool {
        self.started
    }

    /// Number of units in the code cache
    #[must_use]
    pub fn cached_units(&self) -> usize {
        self.cache.len()
    }

    /// Compile `unit` unless it is cached, returning the number of hooks it carries.
    pub fn compile(&mut self, unit: &CodeUnit) -> usize {
        let Some(entry) = unit.entry() else {
            return 0;
        };
        let callbacks = &self.callbacks;
        self.cache
            .entry(entry)
            .or_insert_with(|| {
                callbacks
                    .iter()
                    .enumerate()
                    .flat_map(|(id, callback)| {
                        callback
                            .on_unit_compiled(unit)
                            .into_iter()
                            .map(move |hook| (id, hook))
                    })
                    .collect()
            })
            .len()
    }

    /// Run `unit` once: every block executes in order, each preceded by its hooks.
    pub fn execute(&mut self, unit: &CodeUnit) {
        self.compile(unit);
        let Some(hooks) = unit.entry().and_then(|entry| self.cache.get(&entry)) else {
            return;
        };
        for block in 0..unit.blocks().len() {
            for (id, hook) in hooks.iter().filter(|(_, hook)| hook.block() == block) {
                self.callbacks[*id].on_block_entered(hook.address());
            }
        }
    }
}

impl InstrumentationHost for SimulatedHost {
    fn add_trace_instrumentation(
        &mut self,
        callback: Arc<dyn TraceCallback>,
    ) -> Result<(), Error> {
        if self.started {
            return Err(Error::illegal_state(
                "instrumentation must be added before the program starts",
            ));
        }
        self.callbacks.push(callback);
        Ok(())
    }

    fn start_program(&mut self) -> Result<(), Error> {
        self.started = true;
        Ok(())
    }
}
