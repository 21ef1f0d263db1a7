//=============================================
// src/scheduler.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript callback scheduling
// Objective: One serialized render thread draining deferred callbacks,
//            plus named repeating timers that enqueue onto it
//=============================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

/// A deferred zero-argument function invocation, carrying the screen
/// context that was active when it was scheduled.
#[derive(Debug, Clone)]
pub struct ScheduledCall {
    pub screen: Option<String>,
    pub function: String,
}

/// Runs one scheduled call. The runtime installs an executor that
/// re-establishes the captured screen context, invokes the function, and
/// clears the context afterwards.
pub type CallbackExecutor = Box<dyn Fn(&ScheduledCall) + Send + Sync>;

struct TimerEntry {
    cancel: Arc<AtomicBool>,
    period_ms: u64,
}

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

/// The single serialization point for callback execution. Calls enqueued
/// from one thread run in FIFO order relative to each other; interleaving
/// across threads is whatever order the queue sees.
pub struct Scheduler {
    sender: Mutex<Option<mpsc::Sender<ScheduledCall>>>,
    render: Mutex<Option<JoinHandle<()>>>,
    timers: Mutex<HashMap<String, TimerEntry>>,
    pending: Arc<Pending>,
}

impl Scheduler {
    /// Spawn the render thread. It drains the queue serially until the
    /// scheduler shuts down, running already-enqueued calls before exiting.
    pub fn start(executor: CallbackExecutor) -> Arc<Scheduler> {
        let (sender, receiver) = mpsc::channel::<ScheduledCall>();
        let pending = Arc::new(Pending::default());
        let worker_pending = Arc::clone(&pending);
        let render = thread::Builder::new()
            .name("ember-render".into())
            .spawn(move || {
                for call in receiver {
                    executor(&call);
                    let mut count = worker_pending.count.lock();
                    *count -= 1;
                    if *count == 0 {
                        worker_pending.idle.notify_all();
                    }
                }
            })
            .expect("spawn render thread");
        Arc::new(Scheduler {
            sender: Mutex::new(Some(sender)),
            render: Mutex::new(Some(render)),
            timers: Mutex::new(HashMap::new()),
            pending,
        })
    }

    /// Enqueue a callback for the render thread and return immediately.
    pub fn run_later(&self, call: ScheduledCall) {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => {
                *self.pending.count.lock() += 1;
                if tx.send(call).is_err() {
                    *self.pending.count.lock() -= 1;
                    warn!("render queue closed; dropping scheduled callback");
                }
            }
            None => warn!("scheduler is shut down; dropping scheduled callback"),
        }
    }

    /// Start (or restart) a named repeating timer. Each period the worker
    /// enqueues `callback` onto the render thread with the captured screen
    /// context.
    pub fn timer_start(
        self: Arc<Self>,
        name: &str,
        period_ms: u64,
        callback: &str,
        screen: Option<String>,
    ) {
        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut timers = self.timers.lock();
            if let Some(existing) = timers.insert(
                name.to_string(),
                TimerEntry {
                    cancel: Arc::clone(&cancel),
                    period_ms,
                },
            ) {
                existing.cancel.store(true, Ordering::SeqCst);
            }
        }
        debug!("timer '{}' started ({} ms)", name, period_ms);

        let scheduler = self;
        let function = callback.to_string();
        let timer_name = name.to_string();
        thread::Builder::new()
            .name(format!("ember-timer-{}", timer_name))
            .spawn(move || {
                let period = Duration::from_millis(period_ms.max(1));
                loop {
                    thread::sleep(period);
                    // Checked before enqueueing so a stopped timer cannot
                    // schedule another firing.
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    scheduler.run_later(ScheduledCall {
                        screen: screen.clone(),
                        function: function.clone(),
                    });
                }
                debug!("timer '{}' worker exited", timer_name);
            })
            .expect("spawn timer thread");
    }

    /// Remove a timer registration. Returns false if no such timer exists.
    pub fn timer_stop(&self, name: &str) -> bool {
        match self.timers.lock().remove(name) {
            Some(entry) => {
                entry.cancel.store(true, Ordering::SeqCst);
                debug!("timer '{}' stopped", name);
                true
            }
            None => false,
        }
    }

    pub fn timer_is_running(&self, name: &str) -> bool {
        self.timers.lock().contains_key(name)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn timer_period(&self, name: &str) -> Option<u64> {
        self.timers.lock().get(name).map(|t| t.period_ms)
    }

    /// Block until every enqueued callback has executed or the timeout
    /// elapses. Returns true when the queue drained.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.count.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self
                .pending
                .idle
                .wait_until(&mut count, deadline)
                .timed_out()
            {
                return *count == 0;
            }
        }
        true
    }

    /// Cancel all timers, close the queue, and join the render thread after
    /// it drains what was already enqueued.
    pub fn shutdown(&self) {
        {
            let mut timers = self.timers.lock();
            for (_, entry) in timers.drain() {
                entry.cancel.store(true, Ordering::SeqCst);
            }
        }
        let sender = self.sender.lock().take();
        drop(sender);
        if let Some(handle) = self.render.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
