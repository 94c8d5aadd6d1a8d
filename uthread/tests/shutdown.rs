// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cooperative termination: once every spawned task has finished and
//! `shutdown` has been requested, `run_scheduler_loop` returns on every
//! worker rather than spinning forever. Calling `shutdown` more than once
//! has no further effect.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn shutdown_drains_then_returns_and_is_idempotent() {
    let _ = tracing_subscriber::fmt::try_init();

    uthread::init(uthread::Config {
        worker_count: 3,
        ..uthread::Config::default()
    })
    .unwrap();

    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..30 {
        let completed = completed.clone();
        uthread::create(move || {
            completed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    uthread::create(move || {
        // A handful of yields to give the other 30 tasks (and the work
        // stealing between workers) a chance to run to completion first.
        for _ in 0..64 {
            uthread::yield_now();
        }
        uthread::shutdown();
        uthread::shutdown(); // idempotent: no effect the second time
    })
    .unwrap();

    uthread::run_scheduler_loop();

    assert_eq!(completed.load(Ordering::SeqCst), 30);
}
