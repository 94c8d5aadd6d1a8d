// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The shared I/O readiness poller.
//!
//! One `mio::Poll` instance per process, registered with one token per file
//! descriptor. Registration is one-shot: a task parks for a single
//! direction (read or write), the entry is deregistered the moment that
//! direction becomes ready, and a later `socket_read`/`socket_write` that
//! blocks again re-registers from scratch. This keeps a readable-but-
//! unconsumed fd from waking its (already rescheduled) task a second time.

mod ops;

pub use ops::{socket_accept, socket_read, socket_write};

use crate::error::Error;
use crate::task::{Task, TaskState};
use crate::worker;
use fiber::Context;
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Default)]
struct Entry {
    reader: Option<Box<Task>>,
    writer: Option<Box<Task>>,
}

impl Entry {
    fn interest(&self) -> Option<Interest> {
        match (self.reader.is_some(), self.writer.is_some()) {
            (true, true) => Some(Interest::READABLE.add(Interest::WRITABLE)),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

struct Poller {
    poll: parking_lot::Mutex<Poll>,
    entries: parking_lot::Mutex<HashMap<Token, Entry>>,
}

static POLLER: OnceLock<Poller> = OnceLock::new();

pub(crate) fn init() -> Result<(), Error> {
    let poll = Poll::new().map_err(Error::PollerInit)?;
    let _ = POLLER.set(Poller {
        poll: parking_lot::Mutex::new(poll),
        entries: parking_lot::Mutex::new(HashMap::new()),
    });
    Ok(())
}

#[allow(clippy::cast_possible_truncation, reason = "token was built from this same fd in park_for")]
fn token_fd(token: Token) -> RawFd {
    token.0 as RawFd
}

fn poller() -> &'static Poller {
    POLLER
        .get()
        .expect("uthread::init must be called before performing I/O")
}

/// One non-blocking drain of the poller, run from each worker's dispatch
/// loop. Uses `try_lock` so at most one worker ever drains at a time --
/// the rest skip this step rather than queue up behind it.
pub(crate) fn poll_once() {
    let poller = poller();
    let Some(mut poll) = poller.poll.try_lock() else {
        return;
    };

    let mut events = Events::with_capacity(64);
    // Zero-timeout: this is one step of the dispatch loop, not a place to
    // block the whole worker waiting for I/O.
    if poll.poll(&mut events, Some(Duration::ZERO)).is_err() {
        return;
    }

    for event in &events {
        let token = event.token();
        let mut entries = poller.entries.lock();
        let Some(entry) = entries.get_mut(&token) else {
            continue;
        };

        let mut woke = Vec::new();
        if event.is_readable()
            && let Some(mut task) = entry.reader.take()
        {
            task.state = TaskState::Ready;
            woke.push(task);
        }
        if event.is_writable()
            && let Some(mut task) = entry.writer.take()
        {
            task.state = TaskState::Ready;
            woke.push(task);
        }

        match entry.interest() {
            // Still waiting on the other direction: re-register narrowed
            // to just that, so we don't get spuriously woken for the
            // direction we already delivered.
            Some(interest) => {
                let fd = token_fd(token);
                let _ = poll
                    .registry()
                    .reregister(&mut mio::unix::SourceFd(&fd), token, interest);
            }
            None => {
                let fd = token_fd(token);
                let _ = poll.registry().deregister(&mut mio::unix::SourceFd(&fd));
                entries.remove(&token);
            }
        }
        drop(entries);

        let worker = worker::current();
        for task in woke {
            tracing::trace!(id = %task.id, "io ready, rescheduling");
            worker.push_back(task);
        }
    }
}

/// Parks the calling task until `fd` is ready for `interest`, registering
/// or widening the existing registration as needed.
///
/// # Safety
/// Must be called on a worker thread, from within a running task.
fn park_for(fd: RawFd, interest: Interest) -> Result<(), Error> {
    let poller = poller();
    #[allow(clippy::cast_sign_loss, reason = "fd is a valid, already-open descriptor")]
    let token = Token(fd as usize);
    let worker = worker::current();

    // The conflict check, the `take_current`, and the insertion all happen
    // under one lock acquisition so two tasks racing to park on the same
    // `(fd, direction)` can't both see "not parked yet" and clobber each
    // other's waiter.
    let ctx_ptr: *mut Context;
    let had_registration;
    let combined;
    {
        let mut entries = poller.entries.lock();
        let entry = entries.entry(token).or_default();
        let already_parked = if interest.is_readable() {
            entry.reader.is_some()
        } else {
            entry.writer.is_some()
        };
        if already_parked {
            return Err(Error::AlreadyParked);
        }
        had_registration = entry.interest().is_some();

        // Safety: called from within a running task, on its own worker
        // thread; `current` is only ever touched by that thread.
        let mut task = unsafe { worker.take_current() }
            .expect("socket_read/socket_write called outside a task");
        task.state = TaskState::Blocked;
        ctx_ptr = &mut task.ctx;
        if interest.is_readable() {
            entry.reader = Some(task);
        } else {
            entry.writer = Some(task);
        }
        combined = entry.interest().expect("just inserted a waiter");
    }

    let mut source = mio::unix::SourceFd(&fd);
    let result = if had_registration {
        poller
            .poll
            .lock()
            .registry()
            .reregister(&mut source, token, combined)
    } else {
        poller
            .poll
            .lock()
            .registry()
            .register(&mut source, token, combined)
    };
    if let Err(err) = result {
        // Registration failed: undo the park so we don't strand this task
        // in the entry map with nothing that will ever wake it, and give
        // `current` back to the worker since we never actually suspended.
        let mut entries = poller.entries.lock();
        if let Some(entry) = entries.get_mut(&token) {
            let task = if interest.is_readable() {
                entry.reader.take()
            } else {
                entry.writer.take()
            };
            if entry.interest().is_none() {
                entries.remove(&token);
            }
            drop(entries);
            if let Some(mut task) = task {
                task.state = TaskState::Running;
                // Safety: called on the worker's own thread; `current` was
                // emptied by the `take_current` above and is still unset.
                unsafe { worker.set_current(task) };
            }
        }
        return Err(Error::Register(err));
    }

    // Safety: `ctx_ptr` points into the `Task` now owned by the poller's
    // entry map; the box's heap allocation does not move, and nothing
    // touches this task's context again until `poll_once` reschedules it.
    unsafe {
        fiber::swap(&mut *ctx_ptr, worker.scheduler_ctx());
    }

    Ok(())
}
