//! Dispatch boundary between the query engine and application listeners.
//!
//! The engine never calls listener code while holding its lock. Instead it
//! hands each batch of callbacks to a [`Dispatcher`], which must run them one
//! at a time in the order received. Which dispatcher to use is the caller's
//! decision and is passed in when a query is built.

use crossbeam_channel::{Sender, bounded, unbounded};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle, ThreadId};

/// A unit of listener work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs listener jobs in order, never concurrently.
///
/// `dispatch` is called with the engine lock held, so implementations must
/// only enqueue and return.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

enum Message {
    Run(Job),
    Flush(Sender<()>),
}

/// Runs jobs FIFO on a single dedicated worker thread.
///
/// ```rust
/// use geoquery::dispatch::{Dispatcher, ThreadDispatcher};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let dispatcher = ThreadDispatcher::new();
/// let counter = Arc::new(AtomicUsize::new(0));
/// for _ in 0..3 {
///     let counter = Arc::clone(&counter);
///     dispatcher.dispatch(Box::new(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }));
/// }
/// dispatcher.flush();
/// assert_eq!(counter.load(Ordering::SeqCst), 3);
/// ```
pub struct ThreadDispatcher {
    tx: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl ThreadDispatcher {
    pub fn new() -> Self {
        Self::with_name("geoquery-dispatch")
    }

    /// Create a dispatcher whose worker thread carries `name`.
    pub fn with_name(name: &str) -> Self {
        let (tx, rx) = unbounded::<Message>();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for message in rx.iter() {
                    match message {
                        Message::Run(job) => run_job(job),
                        Message::Flush(reply) => {
                            let _ = reply.send(());
                        }
                    }
                }
            })
            .expect("failed to spawn dispatcher thread");
        let worker_id = worker.thread().id();

        Self {
            tx: Some(tx),
            worker: Some(worker),
            worker_id,
        }
    }

    /// Block until every job dispatched before this call has run.
    /// Calling it from a listener is a no-op.
    pub fn flush(&self) {
        if thread::current().id() == self.worker_id {
            return;
        }
        let Some(tx) = &self.tx else { return };
        let (reply_tx, reply_rx) = bounded(1);
        if tx.send(Message::Flush(reply_tx)).is_ok() {
            let _ = reply_rx.recv();
        }
    }
}

impl Default for ThreadDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for ThreadDispatcher {
    fn dispatch(&self, job: Job) {
        if let Some(tx) = &self.tx
            && tx.send(Message::Run(job)).is_err()
        {
            log::warn!("Dispatcher worker has stopped; dropping listener job");
        }
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take()
            && thread::current().id() != self.worker_id
        {
            let _ = worker.join();
        }
    }
}

/// Queues jobs until the owner calls [`ManualDispatcher::run_pending`].
///
/// Useful for event loops that want listener callbacks on their own thread,
/// and for deterministic tests.
#[derive(Default)]
pub struct ManualDispatcher {
    queue: Mutex<VecDeque<Job>>,
}

impl ManualDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued jobs, including ones queued by the jobs themselves.
    /// Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.queue.lock().pop_front();
            match job {
                Some(job) => {
                    run_job(job);
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Dispatcher for ManualDispatcher {
    fn dispatch(&self, job: Job) {
        self.queue.lock().push_back(job);
    }
}

fn run_job(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        log::error!("Listener callback panicked; continuing with the next event");
    }
}
