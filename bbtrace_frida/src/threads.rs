//! Threads started through `pthread_create` after the agent loaded.
//!
//! The agent exports its own `pthread_create`, which hands every new thread
//! a trampoline. The trampoline tells the installed [`ThreadObserver`] before
//! the thread's start routine runs and after it returns.

use std::{
    ffi::{c_int, c_void},
    mem,
    sync::{Arc, OnceLock},
};

use bbtrace::Error;
use libc::{pthread_attr_t, pthread_t};
use log::debug;

use crate::host::Follower;

/// The start routine of a pthread
pub type StartRoutine = extern "C" fn(*mut c_void) -> *mut c_void;

type PthreadCreate = unsafe extern "C" fn(
    *mut pthread_t,
    *const pthread_attr_t,
    StartRoutine,
    *mut c_void,
) -> c_int;

/// Hears about threads started through [`create`]
pub trait ThreadObserver: Send + Sync {
    /// Called on the new thread, before its start routine
    fn thread_started(&self);

    /// Called on the thread once its start routine returned
    fn thread_exiting(&self);
}

impl ThreadObserver for Follower {
    fn thread_started(&self) {
        self.follow_current_thread();
    }

    fn thread_exiting(&self) {
        self.unfollow_current_thread();
    }
}

static OBSERVER: OnceLock<Arc<dyn ThreadObserver>> = OnceLock::new();

/// Install the observer of new threads. There is only ever one.
pub fn observe(observer: Arc<dyn ThreadObserver>) -> Result<(), Error> {
    OBSERVER
        .set(observer)
        .map_err(|_| Error::illegal_state("A thread observer is already installed"))?;
    debug!("following new threads");
    Ok(())
}

struct Start {
    routine: StartRoutine,
    arg: *mut c_void,
}

extern "C" fn trampoline(start: *mut c_void) -> *mut c_void {
    // SAFETY: `create` leaked this box for exactly this thread.
    let Start { routine, arg } = *unsafe { Box::from_raw(start.cast::<Start>()) };
    let observer = OBSERVER.get();
    if let Some(observer) = observer {
        observer.thread_started();
    }
    let ret = routine(arg);
    if let Some(observer) = observer {
        observer.thread_exiting();
    }
    ret
}

/// The `pthread_create` the agent's own export shadows
fn next_pthread_create() -> Option<PthreadCreate> {
    static NEXT: OnceLock<Option<PthreadCreate>> = OnceLock::new();
    *NEXT.get_or_init(|| {
        // SAFETY: the name is NUL-terminated; RTLD_NEXT skips the calling object.
        let symbol = unsafe { libc::dlsym(libc::RTLD_NEXT, c"pthread_create".as_ptr()) };
        if symbol.is_null() {
            None
        } else {
            // SAFETY: `pthread_create` has this signature.
            Some(unsafe { mem::transmute::<*mut c_void, PthreadCreate>(symbol) })
        }
    })
}

/// Start a thread with the next `pthread_create` in link order, running
/// `routine` between the observer's callbacks.
///
/// Returns `EAGAIN` if there is no next `pthread_create`.
///
/// # Safety
/// The contract of `pthread_create(3)`.
pub unsafe fn create(
    thread: *mut pthread_t,
    attr: *const pthread_attr_t,
    routine: StartRoutine,
    arg: *mut c_void,
) -> c_int {
    let Some(next) = next_pthread_create() else {
        return libc::EAGAIN;
    };
    if OBSERVER.get().is_none() {
        return unsafe { next(thread, attr, routine, arg) };
    }
    let start = Box::into_raw(Box::new(Start { routine, arg }));
    let ret = unsafe { next(thread, attr, trampoline, start.cast()) };
    if ret != 0 {
        // The thread never started, the box is still ours.
        drop(unsafe { Box::from_raw(start) });
    }
    ret
}
