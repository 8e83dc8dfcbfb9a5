//! Bounded pool of decode threads fed from one unbounded queue.
//!
//! Workers are started on demand: a submit starts one only when no worker is
//! idle and fewer than `worker_threads` are alive. A worker that waits longer
//! than the idle timeout for a job exits.

use crate::config::ProcessorConfig;
use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};
use loam_protocol::ChunkDecoder;
use loam_world::ChunkColumn;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub type ChunkCallback = Box<dyn FnOnce(ChunkColumn) + Send + 'static>;

struct DecodeJob {
    data: Bytes,
    cx: i32,
    cz: i32,
    callback: ChunkCallback,
}

#[derive(Default)]
struct PoolState {
    live: AtomicUsize,
    idle: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    decoded: AtomicU64,
    dropped: AtomicU64,
    next_worker_id: AtomicUsize,
}

impl PoolState {
    /// Claims a worker slot if fewer than `max` are alive.
    fn try_reserve(&self, max: usize) -> bool {
        let mut live = self.live.load(Ordering::SeqCst);
        loop {
            if live >= max {
                return false;
            }
            match self
                .live
                .compare_exchange(live, live + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(actual) => live = actual,
            }
        }
    }
}

/// Point-in-time view of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub live_workers: usize,
    pub active_decodes: usize,
    pub peak_active_decodes: usize,
    pub decoded: u64,
    pub dropped: u64,
    pub queued: usize,
}

pub struct ChunkProcessor {
    sender: Sender<DecodeJob>,
    receiver: Receiver<DecodeJob>,
    decoder: Arc<ChunkDecoder>,
    state: Arc<PoolState>,
    max_workers: usize,
    idle_timeout: Duration,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ChunkProcessor {
    /// `cancel` stops the pool along with whatever else shares the token.
    pub fn new(
        config: &ProcessorConfig,
        decoder: Arc<ChunkDecoder>,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = unbounded();
        ChunkProcessor {
            sender,
            receiver,
            decoder,
            state: Arc::new(PoolState::default()),
            max_workers: config.worker_threads.max(1),
            idle_timeout: config.worker_idle_timeout(),
            cancel: cancel.child_token(),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn decoder(&self) -> &Arc<ChunkDecoder> {
        &self.decoder
    }

    /// Queues a chunk. Never blocks. `callback` runs on a worker thread once
    /// the column is decoded; it is dropped uncalled if the chunk is not.
    pub fn submit<F>(&self, data: Bytes, cx: i32, cz: i32, callback: F)
    where
        F: FnOnce(ChunkColumn) + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            self.state.dropped.fetch_add(1, Ordering::SeqCst);
            warn!("Chunk {},{} dropped, processor is shut down", cx, cz);
            return;
        }

        let job = DecodeJob {
            data,
            cx,
            cz,
            callback: Box::new(callback),
        };
        if let Err(err) = self.sender.send(job) {
            let job = err.into_inner();
            self.state.dropped.fetch_add(1, Ordering::SeqCst);
            warn!("Chunk {},{} dropped, queue closed", job.cx, job.cz);
            return;
        }

        if self.state.idle.load(Ordering::SeqCst) == 0
            && self.state.try_reserve(self.max_workers)
        {
            self.spawn_worker();
        }
    }

    /// Resolves to the decoded column, or `None` if the chunk was dropped.
    pub fn decode_async(
        &self,
        data: Bytes,
        cx: i32,
        cz: i32,
    ) -> impl Future<Output = Option<ChunkColumn>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.submit(data, cx, cz, move |column| {
            let _ = tx.send(column);
        });
        async move { rx.await.ok() }
    }

    fn spawn_worker(&self) {
        let id = self.state.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let worker = Worker {
            receiver: self.receiver.clone(),
            decoder: self.decoder.clone(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            idle_timeout: self.idle_timeout,
            max_workers: self.max_workers,
        };

        let spawned = thread::Builder::new()
            .name(format!("ChunkProcessing-{}", id))
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                debug!("Started chunk worker {}", id);
                if let Ok(mut handles) = self.handles.lock() {
                    handles.retain(|handle| !handle.is_finished());
                    handles.push(handle);
                }
            }
            Err(err) => {
                self.state.live.fetch_sub(1, Ordering::SeqCst);
                error!("Failed to start chunk worker {}: {}", id, err);
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            live_workers: self.state.live.load(Ordering::SeqCst),
            active_decodes: self.state.active.load(Ordering::SeqCst),
            peak_active_decodes: self.state.peak.load(Ordering::SeqCst),
            decoded: self.state.decoded.load(Ordering::SeqCst),
            dropped: self.state.dropped.load(Ordering::SeqCst),
            queued: self.receiver.len(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops workers after their current job, waits for them, and drops
    /// whatever is still queued.
    pub fn shutdown(&self) {
        self.cancel.cancel();

        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if handle.join().is_err() {
                error!("Chunk worker exited with a panic");
            }
        }

        self.drain_queue();
    }

    /// Counts and logs every job still queued; their callbacks are released
    /// uncalled.
    fn drain_queue(&self) {
        let mut drained = 0u64;
        while let Ok(job) = self.receiver.try_recv() {
            debug!("Chunk {},{} dropped at shutdown", job.cx, job.cz);
            drained += 1;
        }
        if drained > 0 {
            self.state.dropped.fetch_add(drained, Ordering::SeqCst);
            warn!("Dropped {} queued chunks at shutdown", drained);
        }
    }
}

/// Cancels without joining; workers finish their current job on their own.
impl Drop for ChunkProcessor {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.drain_queue();
    }
}

struct Worker {
    receiver: Receiver<DecodeJob>,
    decoder: Arc<ChunkDecoder>,
    state: Arc<PoolState>,
    cancel: CancellationToken,
    idle_timeout: Duration,
    max_workers: usize,
}

impl Worker {
    fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.state.idle.fetch_add(1, Ordering::SeqCst);
            let next = self.receiver.recv_timeout(self.idle_timeout);
            self.state.idle.fetch_sub(1, Ordering::SeqCst);

            match next {
                Ok(job) if self.cancel.is_cancelled() => {
                    self.state.dropped.fetch_add(1, Ordering::SeqCst);
                    debug!("Chunk {},{} dropped, processor is shut down", job.cx, job.cz);
                    break;
                }
                Ok(job) => self.process(job),
                Err(RecvTimeoutError::Timeout) => {
                    self.state.live.fetch_sub(1, Ordering::SeqCst);
                    // A submit may have counted on this worker while it was
                    // timing out
                    if self.receiver.is_empty()
                        || self.cancel.is_cancelled()
                        || !self.state.try_reserve(self.max_workers)
                    {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.state.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn process(&self, job: DecodeJob) {
        let DecodeJob {
            data,
            cx,
            cz,
            callback,
        } = job;

        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(active, Ordering::SeqCst);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.decoder.decode(data, cx, cz)));
        self.state.active.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(Ok(column)) => {
                self.state.decoded.fetch_add(1, Ordering::SeqCst);
                if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(move || callback(column)))
                {
                    error!(
                        "Chunk {},{}: completion callback panicked: {}",
                        cx,
                        cz,
                        panic_message(&*panic)
                    );
                }
            }
            Ok(Err(err)) => {
                self.state.dropped.fetch_add(1, Ordering::SeqCst);
                if err.is_warning() {
                    warn!("Chunk {},{}: {}", cx, cz, err);
                } else {
                    error!("Chunk {},{}: {}", cx, cz, err);
                }
            }
            Err(panic) => {
                self.state.dropped.fetch_add(1, Ordering::SeqCst);
                error!(
                    "Chunk {},{}: decoder panicked: {}",
                    cx,
                    cz,
                    panic_message(&*panic)
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
