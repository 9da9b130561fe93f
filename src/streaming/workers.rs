// src/streaming/workers.rs
//
// Worker side of the build protocol. Requests and replies are plain values
// moved through channels; a worker never sees the scheduler's state.

use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::streaming::build_pool::{build_tile_geometry_tls, BUILD_POOL};
use crate::streaming::pool::GeometryBuffers;
use crate::world::terrain::TileGeometry;
use crate::world::{AnchorState, SharedSampler};

use super::types::{TileBounds, TileKey};

#[derive(Debug)]
pub struct BuildRequest {
    /// Correlates the reply with the pending entry that sent it.
    pub ticket: u64,
    pub key: TileKey,
    pub resolution: u32,
    pub bounds: TileBounds,
    pub anchor: AnchorState,
    pub buffers: GeometryBuffers,
    pub enqueued_at: Instant,
}

#[derive(Debug)]
pub enum WorkerReply {
    BuildComplete {
        ticket: u64,
        key: TileKey,
        anchor_epoch: u64,
        geometry: TileGeometry,
        queue_ms: f64,
        build_ms: f64,
    },
    BuildError {
        ticket: u64,
        key: TileKey,
        reason: String,
    },
}

impl WorkerReply {
    #[inline]
    pub fn ticket(&self) -> u64 {
        match self {
            WorkerReply::BuildComplete { ticket, .. } | WorkerReply::BuildError { ticket, .. } => *ticket,
        }
    }

    #[inline]
    pub fn key(&self) -> TileKey {
        match self {
            WorkerReply::BuildComplete { key, .. } | WorkerReply::BuildError { key, .. } => *key,
        }
    }
}

/// Asynchronous request/reply channel to a set of build workers.
pub trait WorkerChannel {
    /// Non-blocking. Hands the request back when the channel is full or gone.
    fn submit(&mut self, req: BuildRequest) -> Result<(), BuildRequest>;

    /// Non-blocking.
    fn poll(&mut self) -> Option<WorkerReply>;
}

/// Fixed set of OS threads feeding builds into [`BUILD_POOL`].
pub struct ThreadWorkers {
    tx_job: Option<Sender<BuildRequest>>,
    rx_done: Receiver<WorkerReply>,
    handles: Vec<JoinHandle<()>>,
}

impl ThreadWorkers {
    pub fn spawn(sampler: SharedSampler, threads: usize, capacity: usize) -> Self {
        let (tx_job, rx_job) = bounded::<BuildRequest>(capacity.max(1));
        let (tx_done, rx_done) = bounded::<WorkerReply>(capacity.max(1) * 2);

        let handles = (0..threads.max(1))
            .map(|_| {
                let sampler = sampler.clone();
                let rx_job = rx_job.clone();
                let tx_done = tx_done.clone();
                std::thread::spawn(move || worker_loop(sampler, rx_job, tx_done))
            })
            .collect();

        Self { tx_job: Some(tx_job), rx_done, handles }
    }

    /// Blocking receive, for callers that want to wait on a reply.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerReply> {
        self.rx_done.recv_timeout(timeout).ok()
    }
}

impl WorkerChannel for ThreadWorkers {
    fn submit(&mut self, req: BuildRequest) -> Result<(), BuildRequest> {
        let Some(tx) = self.tx_job.as_ref() else { return Err(req) };
        tx.try_send(req).map_err(|e| match e {
            TrySendError::Full(r) | TrySendError::Disconnected(r) => r,
        })
    }

    fn poll(&mut self) -> Option<WorkerReply> {
        self.rx_done.try_recv().ok()
    }
}

impl Drop for ThreadWorkers {
    fn drop(&mut self) {
        // Closing both channels ends every worker loop once its current
        // build returns. A thread still inside the sampler is detached.
        self.tx_job = None;
        drop(std::mem::replace(&mut self.rx_done, crossbeam_channel::never()));
        for h in self.handles.drain(..) {
            if h.is_finished() {
                let _ = h.join();
            }
        }
    }
}

fn worker_loop(sampler: SharedSampler, rx_job: Receiver<BuildRequest>, tx_done: Sender<WorkerReply>) {
    while let Ok(job) = rx_job.recv() {
        let BuildRequest { ticket, key, resolution, bounds, anchor, buffers, enqueued_at } = job;

        let t_start = Instant::now();
        let queue_ms = t_start.saturating_duration_since(enqueued_at).as_secs_f64() * 1000.0;

        let built = panic::catch_unwind(AssertUnwindSafe(|| {
            BUILD_POOL.install(|| build_tile_geometry_tls(&*sampler, &anchor, bounds, resolution, buffers))
        }));

        let reply = match built {
            Ok(geometry) => WorkerReply::BuildComplete {
                ticket,
                key,
                anchor_epoch: anchor.epoch,
                geometry,
                queue_ms,
                build_ms: t_start.elapsed().as_secs_f64() * 1000.0,
            },
            Err(payload) => WorkerReply::BuildError { ticket, key, reason: panic_message(payload.as_ref()) },
        };

        // The scheduler may have shut down; nothing left to tell it.
        if tx_done.send(reply).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_owned()
    }
}
