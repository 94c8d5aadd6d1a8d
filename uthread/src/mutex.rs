// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A blocking mutex for tasks, not OS threads.
//!
//! Contending on a locked [`Mutex`] blocks the *task*, not the worker
//! thread underneath it: the worker keeps dispatching other ready tasks
//! while this one waits. Unlocking hands ownership directly to the next
//! waiter in FIFO order, so a woken task never has to re-check whether the
//! lock is actually free -- it always is, for it.

use crate::task::{Task, TaskState};
use crate::worker;
use fiber::Context;
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

struct State {
    locked: bool,
    waiters: VecDeque<Box<Task>>,
}

/// A mutual-exclusion lock for data shared between tasks.
pub struct Mutex<T> {
    state: parking_lot::Mutex<State>,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is only ever granted through a `MutexGuard`,
// exactly one of which can exist at a time by construction of `lock`.
unsafe impl<T: Send> Sync for Mutex<T> {}
unsafe impl<T: Send> Send for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: parking_lot::Mutex::new(State {
                locked: false,
                waiters: VecDeque::new(),
            }),
            data: UnsafeCell::new(value),
        }
    }

    /// Blocks the calling task until the lock is acquired.
    ///
    /// # Panics
    /// Panics if called from outside a task (i.e. not on a worker thread
    /// currently dispatching one).
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let mut state = self.state.lock();
        if !state.locked {
            state.locked = true;
            return MutexGuard { mutex: self };
        }

        let worker = worker::current();
        // Safety: called on the worker's own thread, which is dispatching
        // the task that is about to block.
        let mut task = unsafe { worker.take_current() }
            .expect("Mutex::lock called outside a task");
        task.state = TaskState::Blocked;
        let ctx_ptr: *mut Context = &mut task.ctx;
        tracing::trace!(id = %task.id, "blocking on mutex");
        state.waiters.push_back(task);
        drop(state);

        // Safety: `ctx_ptr` points into the `Task` now owned by
        // `state.waiters`; the box's heap allocation does not move, and the
        // task is not touched again until `unlock` hands it back to a
        // worker's run queue.
        unsafe {
            fiber::swap(&mut *ctx_ptr, worker.scheduler_ctx());
        }

        // We only ever resume here via the direct handoff in `unlock`,
        // which already marks us the owner -- no need to re-check `locked`.
        MutexGuard { mutex: self }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.locked {
            return None;
        }
        state.locked = true;
        Some(MutexGuard { mutex: self })
    }
}

/// An RAII guard for a locked [`Mutex`]. Dropping it unlocks, handing
/// ownership directly to the next waiter if there is one.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: holding a `MutexGuard` is proof of exclusive access.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: holding a `MutexGuard` is proof of exclusive access.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.mutex.state.lock();
        if let Some(mut waiter) = state.waiters.pop_front() {
            waiter.state = TaskState::Ready;
            tracing::trace!(id = %waiter.id, "handing mutex to waiter");
            drop(state);
            // The lock stays held (`locked` never goes back to `false`)
            // across the handoff, so no concurrent `lock()` caller can
            // slip in between the release and the next owner taking over.
            worker::current().push_back(waiter);
        } else {
            state.locked = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncontended_lock_unlock() {
        let m = Mutex::new(0_i32);
        {
            let mut guard = m.lock();
            *guard += 1;
        }
        assert_eq!(*m.lock(), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let m = Mutex::new(());
        let _guard = m.lock();
        assert!(m.try_lock().is_none());
    }
}
