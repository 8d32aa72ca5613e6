// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Bounded async task queue backing deferred (async) lifecycle hooks.
//!
//! A fixed-size worker pool drains a bounded channel. `Stop` cancels
//! immediately; `Shutdown` closes intake and waits for in-flight work to
//! finish. A panicking task is caught and logged, never propagated to a
//! caller or to a sibling task.

use std::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicU8, Ordering}
};

use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinSet
};
use tracing::error;

/// Channel capacity for pending tasks, fixed by design.
const CHANNEL_CAPACITY: usize = 100;
/// Worker count used when the constructor is given zero or an
/// unreasonably large value.
const DEFAULT_WORKERS: usize = 4;
/// Upper bound past which a requested worker count is considered invalid
/// and clamped back to [`DEFAULT_WORKERS`].
const MAX_WORKERS: usize = 256;

/// A unit of deferred work: a boxed, type-erased future that resolves to
/// nothing — callers build one with `Box::pin(async move { .. })`.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

const STATE_CREATED: u8 = 0;
const STATE_STARTED: u8 = 1;
const STATE_DRAINING: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// A bounded, panic-isolated async task queue with a fixed worker pool.
pub struct AsyncQueue {
    state: AtomicU8,
    start_lock: Mutex<()>,
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    receiver: Mutex<Option<mpsc::Receiver<Task>>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    workers: Mutex<Option<JoinSet<()>>>,
    worker_count: usize
}

impl AsyncQueue {
    /// Construct a queue in the `created` state. `worker_count` of `0` or
    /// greater than [`MAX_WORKERS`] clamps to [`DEFAULT_WORKERS`].
    pub fn new(worker_count: usize) -> Self {
        let worker_count = if worker_count == 0 || worker_count > MAX_WORKERS {
            DEFAULT_WORKERS
        } else {
            worker_count
        };
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            state: AtomicU8::new(STATE_CREATED),
            start_lock: Mutex::new(()),
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            cancel_tx,
            cancel_rx,
            workers: Mutex::new(None),
            worker_count
        }
    }

    fn state(&self) -> u8 {
        self.state.load(Ordering::SeqCst)
    }

    /// Spawn the worker pool. Idempotent: calling this more than once has
    /// no further effect.
    pub async fn start(&self) {
        let _guard = self.start_lock.lock().await;
        if self.state() != STATE_CREATED {
            return;
        }

        let Some(receiver) = self.receiver.lock().await.take() else {
            return;
        };

        // mpsc::Receiver has a single owner; workers share it behind a
        // mutex and race `recv` calls, which only serializes the dequeue
        // itself — task execution below still runs with full concurrency
        // across workers.
        let receiver = std::sync::Arc::new(Mutex::new(receiver));
        let mut set = JoinSet::new();

        for worker_id in 0..self.worker_count {
            let receiver = receiver.clone();
            let mut cancel_rx = self.cancel_rx.clone();
            set.spawn(async move {
                loop {
                    let task = {
                        let mut guard = receiver.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel_rx.changed() => {
                                if *cancel_rx.borrow() {
                                    break;
                                }
                                continue;
                            }
                            task = guard.recv() => task,
                        }
                    };
                    match task {
                        Some(task) => {
                            if let Err(panic) = tokio::spawn(task).await {
                                error!(worker_id, %panic, "async queue task panicked");
                            }
                        }
                        None => break
                    }
                }
            });
        }

        *self.workers.lock().await = Some(set);
        self.state.store(STATE_STARTED, Ordering::SeqCst);
    }

    /// Enqueue a task. Rejects with a reason when the queue has not been
    /// started, is draining, or has been stopped; otherwise awaits space
    /// in the bounded buffer.
    pub async fn enqueue(&self, task: Task) -> Result<(), String> {
        match self.state() {
            STATE_CREATED => return Err("queue has not been started".to_string()),
            STATE_DRAINING => return Err("queue is shutting down".to_string()),
            STATE_STOPPED => return Err("queue has been stopped".to_string()),
            _ => {}
        }

        let sender = {
            let guard = self.sender.lock().await;
            guard.clone()
        };
        let Some(sender) = sender else {
            return Err("queue has been stopped".to_string());
        };

        sender.send(task).await.map_err(|_| "queue has been stopped".to_string())
    }

    /// Close intake and wait for every in-flight and already-queued task
    /// to finish.
    pub async fn shutdown(&self) -> Result<(), String> {
        if self.state() == STATE_CREATED {
            self.state.store(STATE_STOPPED, Ordering::SeqCst);
            return Ok(());
        }
        if self.state() == STATE_STOPPED {
            return Ok(());
        }

        self.state.store(STATE_DRAINING, Ordering::SeqCst);
        self.sender.lock().await.take();

        if let Some(mut set) = self.workers.lock().await.take() {
            while set.join_next().await.is_some() {}
        }

        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        Ok(())
    }

    /// Cancel immediately: signal every worker to exit without waiting
    /// for queued work to drain.
    pub async fn stop(&self) {
        if self.state() == STATE_STOPPED {
            return;
        }
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        self.sender.lock().await.take();
        let _ = self.cancel_tx.send(true);
        if let Some(mut set) = self.workers.lock().await.take() {
            while set.join_next().await.is_some() {}
        }
    }
}
