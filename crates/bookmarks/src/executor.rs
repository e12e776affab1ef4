//! Single-slot background computation with cancel-and-restart semantics.
//!
//! [`BackgroundExecutor`] owns one worker thread. `run()` bumps the
//! generation (cancelling the computation in flight through its token) and
//! leaves a request for the worker; requests that pile up while the worker is
//! busy collapse into the latest one. A result is delivered to the finish
//! callback only if its generation is still the active one when it arrives.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::cancel::{CancellationToken, GenerationTracker};
use crate::error::Result;

type ComputeFn<T> = Arc<dyn Fn(&CancellationToken) -> T + Send + Sync>;
type FinishFn<T> = Arc<dyn Fn(T) + Send + Sync>;

#[derive(Debug, Default)]
struct WorkerSignal {
    pending: Option<u64>,
    shutdown: bool,
}

struct ExecutorShared<T> {
    compute: RwLock<ComputeFn<T>>,
    finish: RwLock<FinishFn<T>>,
    generations: GenerationTracker,
    signal: Mutex<WorkerSignal>,
    wake: Condvar,
    /// Serializes the generation check with the finish callback.
    delivery: Mutex<()>,
    running: AtomicBool,
    last_runtime: Mutex<Option<Duration>>,
}

/// Runs a computation on a dedicated worker, at most one at a time.
pub struct BackgroundExecutor<T: Send + 'static> {
    shared: Arc<ExecutorShared<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> std::fmt::Debug for BackgroundExecutor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundExecutor")
            .field("generation", &self.shared.generations.current_generation())
            .field("running", &self.is_running())
            .finish()
    }
}

impl<T: Send + 'static> BackgroundExecutor<T> {
    /// Spawns the worker thread.
    pub fn new<C, F>(name: &str, compute: C, finish: F) -> Result<Self>
    where
        C: Fn(&CancellationToken) -> T + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let shared = Arc::new(ExecutorShared {
            compute: RwLock::new(Arc::new(compute)),
            finish: RwLock::new(Arc::new(finish)),
            generations: GenerationTracker::new(),
            signal: Mutex::new(WorkerSignal::default()),
            wake: Condvar::new(),
            delivery: Mutex::new(()),
            running: AtomicBool::new(false),
            last_runtime: Mutex::new(None),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(worker_shared))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Replaces the computation used by subsequent runs.
    pub fn set_compute<C>(&self, compute: C)
    where
        C: Fn(&CancellationToken) -> T + Send + Sync + 'static,
    {
        *self.shared.compute.write() = Arc::new(compute);
    }

    /// Replaces the callback receiving results.
    pub fn set_finish<F>(&self, finish: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        *self.shared.finish.write() = Arc::new(finish);
    }

    /// Cancels the computation in flight and schedules a fresh one.
    ///
    /// Never blocks on the computation. Returns the generation of the new run.
    pub fn run(&self) -> u64 {
        let generation = self.shared.generations.next_generation();
        self.shared.signal.lock().pending = Some(generation);
        self.shared.wake.notify_one();
        generation
    }

    /// Current generation (the one whose result would be delivered).
    pub fn generation(&self) -> u64 {
        self.shared.generations.current_generation()
    }

    /// True while a computation is executing on the worker.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Runtime of the last computation whose result was delivered.
    pub fn last_runtime(&self) -> Option<Duration> {
        *self.shared.last_runtime.lock()
    }
}

impl<T: Send + 'static> Drop for BackgroundExecutor<T> {
    fn drop(&mut self) {
        // Cancel whatever is in flight so the worker can exit promptly.
        self.shared.generations.next_generation();
        self.shared.signal.lock().shutdown = true;
        self.shared.wake.notify_all();

        if let Some(worker) = self.worker.take() {
            // Dropped from inside a finish callback: the worker exits on its own.
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                log::warn!("background executor worker panicked");
            }
        }
    }
}

fn worker_loop<T: Send + 'static>(shared: Arc<ExecutorShared<T>>) {
    loop {
        let generation = {
            let mut signal = shared.signal.lock();
            loop {
                if signal.shutdown {
                    return;
                }
                if let Some(generation) = signal.pending.take() {
                    break generation;
                }
                shared.wake.wait(&mut signal);
            }
        };

        let token = shared.generations.token_for(generation);
        if token.is_cancelled() {
            continue;
        }

        let compute = shared.compute.read().clone();
        shared.running.store(true, Ordering::Relaxed);
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| compute(&token)));
        let runtime = started.elapsed();
        shared.running.store(false, Ordering::Relaxed);

        let result = match result {
            Ok(result) => result,
            Err(panic_info) => {
                let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "computation panicked".to_string()
                };
                log::warn!("background computation generation={generation} panicked: {message}");
                continue;
            }
        };

        let _delivery = shared.delivery.lock();
        if !shared.generations.is_current(generation) {
            log::debug!(
                "dropping stale result generation={generation} active={}",
                shared.generations.current_generation()
            );
            continue;
        }
        *shared.last_runtime.lock() = Some(runtime);
        let finish = shared.finish.read().clone();
        finish(result);
    }
}
