// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Work stealing: a pile of tasks created all at once from worker 0 should
//! end up running across more than one worker, and every one of them
//! should still run to completion (stealing must never drop a task).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const TASK_COUNT: usize = 64;

#[test]
fn stolen_tasks_run_on_more_than_one_worker_and_all_complete() {
    let _ = tracing_subscriber::fmt::try_init();

    uthread::init(uthread::Config {
        worker_count: 4,
        ..uthread::Config::default()
    })
    .unwrap();

    let completed = std::sync::Arc::new(AtomicUsize::new(0));
    let workers_seen = std::sync::Arc::new(Mutex::new(std::collections::HashSet::new()));

    for _ in 0..TASK_COUNT {
        let completed = completed.clone();
        let workers_seen = workers_seen.clone();
        uthread::create(move || {
            // Yield a few times so the task is a plausible steal target
            // for a while before it finishes.
            for _ in 0..4 {
                uthread::yield_now();
            }
            workers_seen.lock().unwrap().insert(uthread::worker_id());
            completed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    uthread::create(move || {
        for _ in 0..256 {
            uthread::yield_now();
        }
        uthread::shutdown();
    })
    .unwrap();

    uthread::run_scheduler_loop();

    assert_eq!(completed.load(Ordering::SeqCst), TASK_COUNT);
    assert!(
        workers_seen.lock().unwrap().len() > 1,
        "expected tasks to be spread across more than one worker via stealing"
    );
}
