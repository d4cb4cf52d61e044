//! [`InstrumentationHost`] on top of Frida Stalker.
//!
//! Stalker compiles the target one basic block at a time, so every code unit
//! handed to the callbacks holds exactly one block. Hooks become callouts put
//! in front of the block's first instruction.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use bbtrace::{CodeUnit, Error, InsertPoint, InstrumentationHost, TraceCallback};
use frida_gum::{
    stalker::{Stalker, Transformer},
    Gum,
};
use log::{debug, trace};

/// The Stalker and the transformer shared by every followed thread
pub struct Follower {
    stalker: Mutex<Stalker<'static>>,
    transformer: Transformer<'static>,
}

// Both wrap Gum objects. Gum locks them itself, and follow_me/unfollow_me only
// act on the calling thread.
unsafe impl Send for Follower {}
unsafe impl Sync for Follower {}

impl fmt::Debug for Follower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Follower").finish_non_exhaustive()
    }
}

impl Follower {
    fn new(stalker: Stalker<'static>, transformer: Transformer<'static>) -> Self {
        Self {
            stalker: Mutex::new(stalker),
            transformer,
        }
    }

    /// Run the rest of the calling thread under Stalker
    pub fn follow_current_thread(&self) {
        let mut stalker = self.stalker.lock().unwrap_or_else(PoisonError::into_inner);
        stalker.follow_me(&self.transformer);
    }

    /// Stop following the calling thread
    pub fn unfollow_current_thread(&self) {
        let mut stalker = self.stalker.lock().unwrap_or_else(PoisonError::into_inner);
        stalker.unfollow_me();
    }
}

/// Runs the trace callbacks under Frida Stalker
pub struct FridaHost {
    gum: &'static Gum,
    callbacks: Vec<Arc<dyn TraceCallback>>,
    stalker: Option<Stalker<'static>>,
    follower: Option<Arc<Follower>>,
    following: bool,
}

impl fmt::Debug for FridaHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FridaHost")
            .field("callbacks", &self.callbacks.len())
            .field("following", &self.following)
            .finish_non_exhaustive()
    }
}

impl FridaHost {
    /// Create a new host on `gum`
    pub fn new(gum: &'static Gum) -> Result<Self, Error> {
        if !Stalker::is_supported(gum) {
            return Err(Error::unsupported("Frida Stalker is not supported here"));
        }
        Ok(Self {
            gum,
            callbacks: Vec::new(),
            stalker: Some(Stalker::new(gum)),
            follower: None,
            following: false,
        })
    }

    /// Is Stalker following the thread that started the program?
    #[must_use]
    pub fn following(&self) -> bool {
        self.following
    }

    /// The follower, once the program runs instrumented.
    ///
    /// Threads the target starts later can join it with
    /// [`Follower::follow_current_thread`].
    #[must_use]
    pub fn follower(&self) -> Option<Arc<Follower>> {
        self.follower.clone()
    }

    /// Stop following the thread that started the program
    pub fn stop(&mut self) {
        if !self.following {
            return;
        }
        if let Some(follower) = &self.follower {
            follower.unfollow_current_thread();
        }
        self.following = false;
        debug!("stalker detached");
    }

    fn build_transformer(&self) -> Transformer<'static> {
        let callbacks = self.callbacks.clone();
        Transformer::from_callback(self.gum, move |basic_block, _output| {
            let mut first = true;
            for instruction in basic_block {
                if first {
                    first = false;
                    let address = instruction.instr().address();
                    let unit = CodeUnit::from_addresses([address]);
                    for callback in &callbacks {
                        for hook in callback.on_unit_compiled(&unit) {
                            match hook.point() {
                                InsertPoint::Before => {
                                    let callback = Arc::clone(callback);
                                    let address = hook.address();
                                    instruction.put_callout(move |_context| {
                                        callback.on_block_entered(address);
                                    });
                                }
                            }
                        }
                    }
                    trace!("block @ {address:#x} compiled");
                }
                instruction.keep();
            }
        })
    }
}

impl InstrumentationHost for FridaHost {
    fn add_trace_instrumentation(
        &mut self,
        callback: Arc<dyn TraceCallback>,
    ) -> Result<(), Error> {
        if self.follower.is_some() {
            return Err(Error::illegal_state(
                "instrumentation must be added before stalker follows the thread",
            ));
        }
        self.callbacks.push(callback);
        Ok(())
    }

    /// Follow the current thread from here on.
    ///
    /// Returns right away; the rest of the thread's execution is recompiled
    /// by Stalker. Without callbacks nothing is followed.
    fn start_program(&mut self) -> Result<(), Error> {
        if self.callbacks.is_empty() {
            debug!("no trace instrumentation, running uninstrumented");
            return Ok(());
        }
        let transformer = self.build_transformer();
        let stalker = self
            .stalker
            .take()
            .ok_or_else(|| Error::illegal_state("stalker already follows this program"))?;
        let follower = Arc::new(Follower::new(stalker, transformer));
        follower.follow_current_thread();
        self.follower = Some(follower);
        self.following = true;
        debug!("stalker following the current thread");
        Ok(())
    }
}

impl Drop for FridaHost {
    fn drop(&mut self) {
        self.stop();
    }
}
