// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// Errors surfaced by the public API.
///
/// Invariant violations that indicate a logic bug rather than an
/// expected runtime condition (calling a task-only operation off a
/// worker thread, corrupting the current-task slot) are `panic!`s or
/// `debug_assert!`s, not variants here, matching how the rest of this
/// workspace separates "the caller misused the API" from "a fallible
/// operation failed".
#[derive(Debug, onlyerror::Error)]
pub enum Error {
    /// `init` was called more than once in this process.
    AlreadyInitialized,
    /// Failed to allocate a stack for a new task.
    StackAlloc(#[from] fiber::Error),
    /// Spawning a worker's OS thread failed.
    Spawn(std::io::Error),
    /// The shared I/O poller could not be created.
    PollerInit(std::io::Error),
    /// Registering a file descriptor with the poller failed.
    Register(std::io::Error),
    /// A task attempted to park on a file descriptor direction
    /// (read or write) that already has another task parked on it.
    AlreadyParked,
    /// The underlying I/O operation failed for a reason other than
    /// "would block".
    Io(std::io::Error),
}
