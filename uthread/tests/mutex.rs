// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Mutual exclusion across many tasks spread over several workers: every
//! increment of a shared counter happens under the lock, so the final
//! value must equal the total number of increments attempted, with none
//! lost to a missed wakeup.

use std::sync::Arc;
use uthread::Mutex;

const TASKS: usize = 16;
const INCREMENTS_PER_TASK: usize = 200;

#[test]
fn mutex_protected_counter_has_no_lost_updates() {
    let _ = tracing_subscriber::fmt::try_init();

    uthread::init(uthread::Config {
        worker_count: 4,
        ..uthread::Config::default()
    })
    .unwrap();

    let counter = Arc::new(Mutex::new(0_u64));
    let remaining = Arc::new(std::sync::atomic::AtomicUsize::new(TASKS));

    for _ in 0..TASKS {
        let counter = counter.clone();
        let remaining = remaining.clone();
        uthread::create(move || {
            for _ in 0..INCREMENTS_PER_TASK {
                let mut guard = counter.lock();
                *guard += 1;
                drop(guard);
                uthread::yield_now();
            }
            if remaining.fetch_sub(1, std::sync::atomic::Ordering::AcqRel) == 1 {
                uthread::shutdown();
            }
        })
        .unwrap();
    }

    uthread::run_scheduler_loop();

    assert_eq!(*counter.lock(), (TASKS * INCREMENTS_PER_TASK) as u64);
}
