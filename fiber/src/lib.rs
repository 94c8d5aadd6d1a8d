// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Machine-level stack switching.
//!
//! This crate knows nothing about tasks, workers, or scheduling policy. It
//! provides exactly three operations on top of a heap-allocated [`Stack`]:
//! [`Context::new_entry`] primes a fresh stack to start running a given
//! entry function, [`swap`] switches from the currently running context to
//! another one and records where to resume the caller, and [`set`] switches
//! away without ever returning.
//!
//! Unlike generator-style stackful coroutine libraries, contexts here are
//! symmetric: there is no distinguished "resume" vs "yield" direction, just
//! two stacks trading places. This mirrors what `ucontext_t` +
//! `swapcontext`/`setcontext` give you in C, reimplemented by hand because
//! those functions aren't available as plain Rust library calls.

mod arch;
mod stack;

pub use stack::Stack;

use core::marker::PhantomData;

#[derive(Debug, onlyerror::Error)]
pub enum Error {
    /// Failed to allocate a stack of the requested size.
    Alloc,
}

/// A saved machine context: a stack pointer into a previously primed or
/// suspended [`Stack`], plus everything needed to resume execution there.
///
/// `Context` does not own the `Stack` it points into; callers are
/// responsible for keeping the stack alive for as long as the context may
/// still be switched to.
pub struct Context {
    sp: usize,
    // Contexts are inherently tied to one thread of execution at a time;
    // forbid sending them across threads by accident.
    _not_send: PhantomData<*mut ()>,
}

impl Context {
    /// Primes `stack` so that switching into the returned context for the
    /// first time calls `entry` with an empty call stack above it.
    ///
    /// `entry` must never return; returning from the fiber's entry function
    /// is undefined behavior, same as returning from a signal handler's
    /// trampoline. Callers arrange this by having `entry` call [`set`] to
    /// switch to some other context once it's done.
    #[must_use]
    pub fn new_entry(stack: &Stack, entry: unsafe extern "C" fn() -> !) -> Self {
        let sp = arch::init_stack(stack.top(), entry);
        Self {
            sp,
            _not_send: PhantomData,
        }
    }

    /// An empty context, suitable only as the `from` half of the very first
    /// [`swap`] call on a scheduler's own OS thread (it has nowhere
    /// meaningful to resume, but `swap` needs a place to record one).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            sp: 0,
            _not_send: PhantomData,
        }
    }
}

/// Switches from the currently executing context to `to`, recording enough
/// of the caller's state into `from` that a later `swap(from, _)` resumes
/// right after this call returns.
///
/// # Safety
///
/// `to` must have been created by [`Context::new_entry`] (and not yet
/// finished, i.e. not already passed to [`set`] until it finishes) or must
/// be a context previously suspended by a `swap` that has not been resumed
/// since. The backing `Stack` for `to` must still be alive.
pub unsafe fn swap(from: &mut Context, to: &Context) {
    // Safety: forwarded to the caller.
    unsafe {
        arch::swap(&mut from.sp, to.sp);
    }
}

/// Switches to `to` without ever returning to the caller. Used to exit a
/// finished task's context for good, since there is no caller state left
/// worth preserving.
///
/// # Safety
///
/// Same preconditions as [`swap`], applied to `to`.
pub unsafe fn set(to: &Context) -> ! {
    // Safety: forwarded to the caller.
    unsafe { arch::set(to.sp) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TOUCHED: AtomicUsize = AtomicUsize::new(0);

    static mut BACK: Context = Context {
        sp: 0,
        _not_send: PhantomData,
    };

    unsafe extern "C" fn entry() -> ! {
        TOUCHED.fetch_add(1, Ordering::SeqCst);
        // Safety: `BACK` was populated by `swap` before this fiber ever ran.
        unsafe {
            #[allow(static_mut_refs, reason = "single-threaded test, no aliasing")]
            set(&*core::ptr::addr_of!(BACK))
        }
    }

    #[test]
    fn swap_runs_entry_and_returns() {
        TOUCHED.store(0, Ordering::SeqCst);
        let stack = Stack::new(64 * 1024).unwrap();
        let fiber_ctx = Context::new_entry(&stack, entry);

        // Safety: `fiber_ctx` is freshly primed, `stack` outlives the call.
        // `BACK` stands in for the "current worker context" a real caller
        // would track itself; `entry` switches back to it once done.
        unsafe {
            #[allow(static_mut_refs, reason = "single-threaded test, no aliasing")]
            let back = &mut *core::ptr::addr_of_mut!(BACK);
            swap(back, &fiber_ctx);
        }

        assert_eq!(TOUCHED.load(Ordering::SeqCst), 1);
    }
}
