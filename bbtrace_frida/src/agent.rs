//! Boots the tool when the library is preloaded into a target.
//!
//! The constructor reads the knobs the launcher handed over, removes the
//! handoff from the environment, starts a [`Session`] and lets Stalker follow
//! the loading thread. On Linux, threads the target starts later are followed
//! from the `pthread_create` exported here. The host has to live as long as the
//! process, so it is leaked; the session is torn down by the destructor,
//! which flushes the diagnostic stream.

#[cfg(target_os = "linux")]
use std::ffi::{c_int, c_void};
use std::{
    process,
    sync::{Mutex, OnceLock, PoisonError},
};

use bbtrace::{preload, Error, Session, SimpleStderrLogger, TraceOptions};
use ctor::{ctor, dtor};
use frida_gum::Gum;
#[cfg(target_os = "linux")]
use libc::{pthread_attr_t, pthread_t};
use log::info;

use crate::host::FridaHost;
#[cfg(target_os = "linux")]
use crate::threads::{self, StartRoutine};

/// Exit status when the agent cannot start
pub const AGENT_FAILURE_EXIT_CODE: i32 = 1;

static GUM: OnceLock<Gum> = OnceLock::new();

static SESSION: Mutex<Option<Session>> = Mutex::new(None);

#[allow(unused_unsafe)]
fn gum() -> &'static Gum {
    GUM.get_or_init(|| unsafe { Gum::obtain() })
}

fn boot() -> Result<(), Error> {
    SimpleStderrLogger::init_from_env();
    let options = TraceOptions::from_env()?;
    // Processes the target starts are not ours to trace.
    preload::scrub_env();

    let host: &'static mut FridaHost = Box::leak(Box::new(FridaHost::new(gum())?));
    let mut session = Session::start(options, &mut *host)?;
    session.run(&mut *host)?;
    #[cfg(target_os = "linux")]
    if let Some(follower) = host.follower() {
        threads::observe(follower)?;
    }
    info!("bbtrace agent loaded: {:?}", session.options());
    *SESSION.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
    Ok(())
}

/// `pthread_create(3)`, with the new thread followed when tracing is on.
///
/// # Safety
/// The contract of `pthread_create(3)`.
#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn pthread_create(
    thread: *mut pthread_t,
    attr: *const pthread_attr_t,
    routine: StartRoutine,
    arg: *mut c_void,
) -> c_int {
    unsafe { threads::create(thread, attr, routine, arg) }
}

#[ctor]
fn bbtrace_init() {
    if let Err(err) = boot() {
        eprintln!("bbtrace: failed to start: {err}");
        process::exit(AGENT_FAILURE_EXIT_CODE);
    }
}

#[dtor]
fn bbtrace_fini() {
    let session = SESSION
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(session) = session {
        let _ = session.finish();
    }
}
