//! Ingest boundary: hands verified bodies to a background worker so the webhook
//! can be acknowledged before any event is processed.
//!
//! Submissions go through an unbounded channel and never wait. The worker runs
//! each delivery (decode, then dispatch) as its own task, so a slow handler does
//! not hold up other deliveries. Failures here are only visible in the logs.

use crate::dispatch::Dispatcher;
use crate::events;
use axum::body::Bytes;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// A verified request body waiting to be processed.
#[derive(Debug)]
pub struct Delivery {
    pub id: String,
    pub body: Bytes,
}

/// Cloneable submit side of the ingest queue.
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl IngestHandle {
    /// Queue a body for processing. Returns false (after logging) if the worker is gone;
    /// the delivery is dropped in that case.
    pub fn submit(&self, body: Bytes) -> bool {
        let id = uuid::Uuid::new_v4().to_string();
        let len = body.len();
        match self.tx.send(Delivery { id: id.clone(), body }) {
            Ok(()) => {
                log::debug!("delivery {} queued ({} bytes)", id, len);
                true
            }
            Err(_) => {
                log::error!("delivery {} dropped: ingest worker is not running", id);
                false
            }
        }
    }
}

/// Owner of the background worker. Dropping it without `shutdown` leaves the worker
/// running until every `IngestHandle` is gone.
pub struct Ingestor {
    handle: IngestHandle,
    stop_tx: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl Ingestor {
    /// Spawn the worker on the current runtime.
    pub fn start(dispatcher: Dispatcher) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let worker = tokio::spawn(run_worker(dispatcher, rx, stop_rx));
        Self {
            handle: IngestHandle { tx },
            stop_tx,
            worker,
        }
    }

    pub fn handle(&self) -> IngestHandle {
        self.handle.clone()
    }

    /// Stop accepting deliveries, finish the queued and in-flight ones, and wait up to
    /// `timeout`. Returns false if the worker did not finish in time.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        let Self {
            handle,
            stop_tx,
            worker,
        } = self;
        drop(handle);
        let _ = stop_tx.send(());
        match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::error!("ingest worker failed: {}", e);
                false
            }
            Err(_) => {
                log::warn!(
                    "ingest drain did not finish within {}s; abandoning in-flight deliveries",
                    timeout.as_secs_f32()
                );
                false
            }
        }
    }
}

async fn run_worker(
    dispatcher: Dispatcher,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut in_flight = JoinSet::new();
    // Cleared when the Ingestor is dropped without a stop; the receiver must not be polled again.
    let mut stop_armed = true;
    loop {
        tokio::select! {
            delivery = rx.recv() => match delivery {
                Some(d) => {
                    in_flight.spawn(process_delivery(dispatcher.clone(), d));
                }
                None => break,
            },
            Some(res) = in_flight.join_next(), if !in_flight.is_empty() => reap(res),
            stop = &mut stop_rx, if stop_armed => match stop {
                Ok(()) => break,
                Err(_) => stop_armed = false,
            },
        }
    }

    rx.close();
    while let Some(d) = rx.recv().await {
        in_flight.spawn(process_delivery(dispatcher.clone(), d));
    }
    while let Some(res) = in_flight.join_next().await {
        reap(res);
    }
    log::info!("ingest worker stopped");
}

fn reap(res: Result<(), JoinError>) {
    if let Err(e) = res {
        log::error!("delivery task ended abnormally: {}", e);
    }
}

async fn process_delivery(dispatcher: Dispatcher, delivery: Delivery) {
    let events = match events::decode(&delivery.body) {
        Ok(events) => events,
        Err(e) => {
            log::error!("delivery {}: dropping undecodable body: {}", delivery.id, e);
            return;
        }
    };
    let total = events.len();
    let report = dispatcher.dispatch(&delivery.id, events).await;
    log::info!(
        "delivery {}: {} event(s), {} handled, {} skipped, {} failed",
        delivery.id,
        total,
        report.handled,
        report.skipped,
        report.failed
    );
}
