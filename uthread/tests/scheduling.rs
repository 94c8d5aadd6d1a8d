// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Ping-pong yield fairness: two tasks that each yield `ROUNDS` times
//! should observe the other having made exactly as much progress, since a
//! single-worker FIFO run queue dispatches yielded tasks in the order they
//! yielded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ROUNDS: usize = 1000;

#[test]
fn ping_pong_yield_count_matches() {
    let _ = tracing_subscriber::fmt::try_init();

    uthread::init(uthread::Config {
        worker_count: 1,
        ..uthread::Config::default()
    })
    .unwrap();

    let ping = Arc::new(AtomicUsize::new(0));
    let pong = Arc::new(AtomicUsize::new(0));

    {
        let ping = ping.clone();
        let pong = pong.clone();
        uthread::create(move || {
            for _ in 0..ROUNDS {
                ping.fetch_add(1, Ordering::SeqCst);
                uthread::yield_now();
            }
        })
        .unwrap();
    }
    {
        let ping = ping.clone();
        let pong = pong.clone();
        uthread::create(move || {
            for _ in 0..ROUNDS {
                pong.fetch_add(1, Ordering::SeqCst);
                uthread::yield_now();
            }
            // Last task to finish asks the scheduler to wind down.
            assert_eq!(ping.load(Ordering::SeqCst), ROUNDS);
            uthread::shutdown();
        })
        .unwrap();
    }

    uthread::run_scheduler_loop();

    assert_eq!(ping.load(Ordering::SeqCst), ROUNDS);
    assert_eq!(pong.load(Ordering::SeqCst), ROUNDS);
}
