// Copyright 2026 the uthread authors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::Error;
use crate::id::TaskId;
use crate::io;
use crate::task::{Task, TaskState};
use crate::worker::{self, Worker};
use fiber::Context;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

/// Tunables for [`init`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of OS worker threads, including the one that calls
    /// [`init`]/[`run_scheduler_loop`] itself.
    pub worker_count: usize,
    /// Stack size allocated for every task, in bytes.
    pub stack_size: usize,
    /// How long an otherwise idle worker sleeps before checking again, once
    /// its local queue, stealing, and the I/O poller have all come up
    /// empty in a single pass.
    pub poll_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
            stack_size: 64 * 1024,
            poll_timeout: Duration::from_millis(1),
        }
    }
}

struct Runtime {
    workers: Vec<Worker>,
    config: Config,
    join_handles: StdMutex<Vec<JoinHandle<()>>>,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static RUNNING: AtomicBool = AtomicBool::new(false);

fn runtime() -> &'static Runtime {
    RUNTIME
        .get()
        .expect("uthread::init must be called before using the scheduler")
}

/// Brings the scheduler up: allocates `config.worker_count` workers, binds
/// the calling thread as worker 0, and spawns an OS thread running the
/// scheduler loop for each remaining worker. The caller must still call
/// [`run_scheduler_loop`] itself to have worker 0 actually start
/// dispatching tasks.
///
/// # Errors
/// Returns [`Error::AlreadyInitialized`] if called more than once in this
/// process, or [`Error::Spawn`]/[`Error::PollerInit`] if setting up worker
/// threads or the I/O poller fails.
pub fn init(config: Config) -> Result<(), Error> {
    if RUNTIME.get().is_some() {
        return Err(Error::AlreadyInitialized);
    }

    io::init()?;

    let workers: Vec<Worker> = (0..config.worker_count.max(1)).map(Worker::new).collect();
    let runtime = Runtime {
        workers,
        config,
        join_handles: StdMutex::new(Vec::new()),
    };
    RUNTIME.set(runtime).map_err(|_| Error::AlreadyInitialized)?;
    RUNNING.store(true, Ordering::Release);

    // Worker 0 is the calling thread: bind it now so `create` can be used
    // before the caller ever calls `run_scheduler_loop`.
    worker::bind_current(&runtime().workers[0]);

    let mut handles = Vec::new();
    for id in 1..runtime().workers.len() {
        let handle = std::thread::Builder::new()
            .name(format!("uthread-worker-{id}"))
            .spawn(move || run_loop(id))
            .map_err(Error::Spawn)?;
        handles.push(handle);
    }
    *runtime().join_handles.lock().unwrap() = handles;

    Ok(())
}

/// Shorthand for `init(Config::default())`.
///
/// # Errors
/// See [`init`].
pub fn init_default() -> Result<(), Error> {
    init(Config::default())
}

/// Spawns a new task onto the calling worker's run queue.
///
/// # Errors
/// Returns [`Error::StackAlloc`] if the task's stack could not be
/// allocated.
///
/// # Panics
/// Panics if called from a thread that isn't running as a worker (see
/// [`run_scheduler_loop`]).
pub fn create<F>(f: F) -> Result<TaskId, Error>
where
    F: FnOnce() + Send + 'static,
{
    let worker = worker::current();
    let stack = fiber::Stack::new(runtime().config.stack_size)?;
    let id = TaskId::next();
    let task = Box::new(Task::new(id, stack, trampoline, Box::new(f)));
    tracing::debug!(%id, worker = worker.id, "task created");
    worker.push_back(task);
    Ok(id)
}

/// Suspends the calling task, placing it at the back of its worker's run
/// queue, and switches back to the scheduler to let something else run.
///
/// # Panics
/// Panics if called from outside a task.
pub fn yield_now() {
    let worker = worker::current();
    // Safety: called on the worker's own thread, which owns `current`
    // while dispatching this task.
    let mut task =
        unsafe { worker.take_current() }.expect("yield_now called outside a task");
    task.state = TaskState::Ready;
    let ctx_ptr: *mut Context = &mut task.ctx;
    tracing::trace!(id = %task.id, "yield");
    worker.push_back(task);

    // Safety: `ctx_ptr` points into the `Task` box just pushed onto the run
    // queue; the box's heap allocation does not move, and the scheduler
    // will not touch this task's context again until it's popped and
    // redispatched.
    unsafe {
        fiber::swap(&mut *ctx_ptr, worker.scheduler_ctx());
    }
}

/// Ends the calling task. Never returns.
///
/// # Panics
/// Panics if called from outside a task.
pub fn exit() -> ! {
    let worker = worker::current();
    // Safety: called on the worker's own thread, during this task's
    // dispatch; `current_mut` is only valid while that holds.
    unsafe {
        let slot = worker.current_mut();
        let task = slot.as_mut().expect("exit called outside a task");
        task.state = TaskState::Finished;
        tracing::trace!(id = %task.id, "exit");
    }

    // Safety: the scheduler's context is valid and waiting for this switch;
    // it observes the `Finished` state left above and drops the task after
    // switching back, once it's safe to do so (i.e. no longer executing on
    // the task's own stack).
    unsafe { fiber::set(worker.scheduler_ctx()) }
}

/// Requests that the scheduler wind down: every worker finishes whatever
/// work is already runnable (including tasks stealing brings its way) and
/// then returns from `run_scheduler_loop`, instead of accepting new work.
///
/// Calling this more than once, or concurrently with other calls, is safe
/// and has no additional effect after the first call.
pub fn shutdown() {
    RUNNING.store(false, Ordering::Release);
}

/// Runs the scheduler loop on the calling thread, as worker 0.
///
/// This call blocks until [`shutdown`] is requested and every worker has
/// drained its runnable work. Exactly one thread -- the one that called
/// [`init`] -- should call this.
pub fn run_scheduler_loop() {
    run_loop(0);
    for handle in runtime().join_handles.lock().unwrap().drain(..) {
        let _ = handle.join();
    }
}

unsafe extern "C" fn trampoline() -> ! {
    let body = {
        let worker = worker::current();
        // Safety: the scheduler always calls `set_current` with a freshly
        // dispatched task before switching into its (freshly primed)
        // context, so `current` is populated here.
        unsafe {
            let slot = worker.current_mut();
            let task = slot
                .as_mut()
                .expect("trampoline entered with no current task");
            task.take_body()
        }
    };
    body();
    exit()
}

fn run_loop(id: usize) {
    let worker = &runtime().workers[id];
    worker::bind_current(worker);
    let span = tracing::info_span!("worker", id);
    let _guard = span.enter();
    tracing::debug!("worker started");

    // Shutdown stops new dispatches outright: the instant `RUNNING` goes
    // false this loop exits, even if the local queue still holds tasks that
    // never got a turn. A task already mid-dispatch when `shutdown` is
    // called is not interrupted -- it runs to its own next suspension point
    // and is handled by the `Some` arm below one last time -- but nothing
    // is picked up fresh afterward, so a task that keeps re-enqueuing
    // itself (e.g. one stuck in a bare `loop { yield_now() }`) cannot keep
    // this loop alive past the request to stop.
    while RUNNING.load(Ordering::Acquire) {
        if let Some(mut task) = dispatch_step(worker) {
            task.state = TaskState::Running;
            let ctx_ptr: *mut Context = &mut task.ctx;
            // Safety: this thread owns `worker`.
            unsafe { worker.set_current(task) };
            // Safety: `ctx_ptr` was just populated by `set_current` and
            // stays valid for as long as `current` holds this task.
            let to_ctx: &Context = unsafe { &*ctx_ptr };
            // Safety: `scheduler_ctx_mut` is only touched by this
            // thread; `to_ctx` points at a task this worker now owns.
            unsafe {
                fiber::swap(worker.scheduler_ctx_mut(), to_ctx);
            }

            // Safety: this thread owns `worker`.
            if let Some(finished) = unsafe { worker.take_current() } {
                debug_assert_eq!(finished.state, TaskState::Finished);
                tracing::debug!(id = %finished.id, "task finished");
                drop(finished);
            }
        }
    }

    tracing::debug!("worker stopped");
}

/// One pass of the dispatch algorithm: drain ready I/O, then local queue,
/// then steal, then a brief park if nothing was found -- in that order,
/// every iteration, regardless of how the previous one ended.
fn dispatch_step(worker: &Worker) -> Option<Box<Task>> {
    io::poll_once();

    if let Some(task) = worker.pop_front() {
        return Some(task);
    }

    if let Some(task) = steal_from_random_peer(worker) {
        tracing::trace!(id = %task.id, from_worker = worker.id, "stole task");
        return Some(task);
    }

    std::thread::sleep(runtime().config.poll_timeout);
    None
}

fn steal_from_random_peer(me: &Worker) -> Option<Box<Task>> {
    let workers = &runtime().workers;
    if workers.len() <= 1 {
        return None;
    }
    let victim = loop {
        let i = fastrand::usize(0..workers.len());
        if i != me.id {
            break i;
        }
    };
    workers[victim].try_steal()
}
