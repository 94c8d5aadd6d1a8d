// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::task::Task;
use fiber::Context;
use parking_lot::Mutex;
use std::cell::{Cell, UnsafeCell};
use std::collections::VecDeque;

/// One worker: one OS thread, one run queue, one "home" context to swap
/// back into between tasks.
///
/// `run_queue` is the only field touched by threads other than the one
/// this worker runs on (other workers push stolen... no, other workers
/// *pop* from the back of this queue when stealing; this worker itself
/// pushes and pops from the front). `current` and `scheduler_ctx` are
/// touched only by the owning thread, which is what makes `Worker` sound
/// to share as `Sync` despite the `UnsafeCell`s.
pub(crate) struct Worker {
    pub(crate) id: usize,
    run_queue: Mutex<VecDeque<Box<Task>>>,
    current: UnsafeCell<Option<Box<Task>>>,
    scheduler_ctx: UnsafeCell<Context>,
}

// Safety: `current` and `scheduler_ctx` are only ever read or written by the
// single OS thread that owns this `Worker` (enforced by every accessor
// going through `Worker::current()`, which is backed by a thread-local).
// `run_queue`'s own `Mutex` is what makes cross-thread stealing sound.
unsafe impl Sync for Worker {}

impl Worker {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            run_queue: Mutex::new(VecDeque::new()),
            current: UnsafeCell::new(None),
            scheduler_ctx: UnsafeCell::new(Context::empty()),
        }
    }

    pub(crate) fn push_back(&self, task: Box<Task>) {
        self.run_queue.lock().push_back(task);
    }

    /// Pops the next locally-runnable task, FIFO order.
    pub(crate) fn pop_front(&self) -> Option<Box<Task>> {
        self.run_queue.lock().pop_front()
    }

    /// Tries to steal a task from the *back* of this worker's queue,
    /// without ever blocking. Returns `None` both when the queue is
    /// momentarily locked by its owner and when it's genuinely empty --
    /// callers can't tell the difference and don't need to.
    pub(crate) fn try_steal(&self) -> Option<Box<Task>> {
        self.run_queue.try_lock()?.pop_back()
    }

    /// # Safety
    /// Must only be called from the thread that owns this worker.
    pub(crate) unsafe fn set_current(&self, task: Box<Task>) {
        // Safety: forwarded to the caller.
        unsafe {
            *self.current.get() = Some(task);
        }
    }

    /// # Safety
    /// Must only be called from the thread that owns this worker.
    pub(crate) unsafe fn take_current(&self) -> Option<Box<Task>> {
        // Safety: forwarded to the caller.
        unsafe { (*self.current.get()).take() }
    }

    /// # Safety
    /// Must only be called from the thread that owns this worker, and the
    /// returned reference must not outlive the in-progress dispatch.
    pub(crate) unsafe fn current_mut(&self) -> &mut Option<Box<Task>> {
        // Safety: forwarded to the caller.
        unsafe { &mut *self.current.get() }
    }

    /// # Safety
    /// Must only be called from the thread that owns this worker.
    #[allow(clippy::mut_from_ref, reason = "guarded by the owning-thread invariant documented above")]
    pub(crate) unsafe fn scheduler_ctx_mut(&self) -> &mut Context {
        // Safety: forwarded to the caller.
        unsafe { &mut *self.scheduler_ctx.get() }
    }

    /// # Safety
    /// Must only be called from the thread that owns this worker.
    pub(crate) unsafe fn scheduler_ctx(&self) -> &Context {
        // Safety: forwarded to the caller.
        unsafe { &*self.scheduler_ctx.get() }
    }
}

thread_local! {
    static CURRENT: Cell<Option<&'static Worker>> = const { Cell::new(None) };
}

/// Binds `worker` as the one this OS thread serves for the remainder of
/// its lifetime. Called once at the top of `run_scheduler_loop`.
pub(crate) fn bind_current(worker: &'static Worker) {
    CURRENT.with(|c| c.set(Some(worker)));
}

/// Returns the worker bound to the calling thread.
///
/// # Panics
/// Panics if called from a thread that never called [`bind_current`], i.e.
/// any thread that isn't running `run_scheduler_loop`.
pub(crate) fn current() -> &'static Worker {
    CURRENT.with(|c| c.get()).expect(
        "uthread operation used outside of a worker thread (run_scheduler_loop was never called here)",
    )
}

/// The id of the worker the calling thread serves, for diagnostics and
/// tests that want to assert a task moved across workers.
#[must_use]
pub fn worker_id() -> usize {
    current().id
}
