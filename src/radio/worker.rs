use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::core::{Error, Result};
use super::packet::RadioPacket;
use super::transmitter::Transmitter;

/// A packet waiting for the transmitter
#[derive(Debug, Clone)]
pub struct RadioJob {
    /// Link protocol transaction that produced this packet
    pub transaction_id: u64,
    pub packet: RadioPacket,
    pub repeat: u32,
}

/// Single task that owns the transmitter and sends queued packets in FIFO order
pub struct RadioWorker {
    queue: mpsc::Sender<RadioJob>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl RadioWorker {
    /// Spawns the worker task. Cancelling `shutdown` stops it taking new jobs.
    pub fn spawn<T>(transmitter: T, depth: usize, shutdown: CancellationToken) -> Self
    where
        T: Transmitter + 'static,
    {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let handle = tokio::spawn(run(transmitter, rx, shutdown));
        RadioWorker {
            queue: tx,
            handle: Some(handle),
        }
    }

    /// Queues a job without waiting for the transmitter.
    ///
    /// Returns `Ok(false)` when the queue is full and the job was dropped, and
    /// an error once the worker has stopped.
    pub fn enqueue(&self, job: RadioJob) -> Result<bool> {
        match self.queue.try_send(job) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => Err(Error::hardware("Radio worker has stopped")),
        }
    }

    /// Waits for the worker to stop on its own. Pending forever once observed.
    pub async fn wait(&mut self) -> Result<()> {
        match self.handle.as_mut() {
            Some(handle) => {
                let outcome = handle.await;
                self.handle = None;
                flatten(outcome)
            }
            None => std::future::pending().await,
        }
    }

    /// Closes the queue and waits for the transmitter to shut down
    pub async fn join(self) -> Result<()> {
        let RadioWorker { queue, handle } = self;
        drop(queue);
        match handle {
            Some(handle) => flatten(handle.await),
            None => Ok(()),
        }
    }
}

fn flatten(outcome: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    outcome.map_err(|e| Error::hardware(format!("Radio worker failed: {}", e)))?
}

async fn run<T>(
    mut transmitter: T,
    mut queue: mpsc::Receiver<RadioJob>,
    shutdown: CancellationToken,
) -> Result<()>
where
    T: Transmitter,
{
    let outcome = loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("radio worker cancelled");
                break Ok(());
            }
            job = queue.recv() => {
                let Some(job) = job else { break Ok(()) };
                if let Err(e) = transmitter.transmit(&job.packet, job.repeat).await {
                    error!(transaction_id = job.transaction_id, "transmit failed: {}", e);
                    break Err(e);
                }
                debug!(
                    transaction_id = job.transaction_id,
                    packet = %job.packet,
                    repeat = job.repeat,
                    "transmitted"
                );
            }
        }
    };

    transmitter.shutdown().await?;
    outcome
}
