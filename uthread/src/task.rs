// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::id::TaskId;
use fiber::{Context, Stack};

/// Where a task sits in its lifecycle. See the crate-level docs for the
/// allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    Ready,
    Running,
    Blocked,
    Finished,
}

/// A task control block: a task's saved machine context, its stack, its
/// entry closure (consumed on first dispatch), and its lifecycle state.
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) state: TaskState,
    pub(crate) ctx: Context,
    // Kept alive for as long as `ctx` might still be switched to; never
    // read directly, just needs to outlive the task.
    _stack: Stack,
    body: Option<Box<dyn FnOnce() + Send>>,
}

// Safety: a `Task` is only ever dispatched (i.e. its `ctx` switched into) by
// whichever single worker currently owns it, serialized through the
// mutex-guarded run queues and wait lists it moves between. It never runs
// concurrently on two threads, so moving one to another thread while
// suspended is sound even though `fiber::Context` itself is not `Send`.
unsafe impl Send for Task {}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        stack: Stack,
        entry: unsafe extern "C" fn() -> !,
        body: Box<dyn FnOnce() + Send>,
    ) -> Self {
        let ctx = Context::new_entry(&stack, entry);
        Self {
            id,
            state: TaskState::Ready,
            ctx,
            _stack: stack,
            body: Some(body),
        }
    }

    /// Takes the entry closure, to be called exactly once, from the
    /// trampoline that runs at the very start of this task's first
    /// dispatch.
    pub(crate) fn take_body(&mut self) -> Box<dyn FnOnce() + Send> {
        self.body
            .take()
            .expect("task body taken more than once")
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
