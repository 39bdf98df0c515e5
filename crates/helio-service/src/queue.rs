//! Serialized DDC access
//!
//! The bus does not tolerate overlapping transactions, so every hardware
//! operation is funnelled through one worker thread that runs jobs in
//! submission order. Callers get the result back on a oneshot channel.

use helio_hal::{ControlId, DdcReadResult, Delivery, DisplayId, Transport};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;

use crate::error::{Result, ServiceError};

type Job = Box<dyn FnOnce(&Transport) + Send>;

/// Handle to the DDC worker; cloning shares the same worker
#[derive(Clone)]
pub struct DdcQueue {
    jobs: Sender<Job>,
    transport: Arc<Transport>,
}

impl DdcQueue {
    /// Spawn the worker that owns all I/O on `transport`
    ///
    /// The worker stops once every handle has been dropped.
    pub fn start(transport: Arc<Transport>) -> Self {
        let (jobs, rx) = mpsc::channel::<Job>();
        let worker_transport = Arc::clone(&transport);
        let spawned = thread::Builder::new()
            .name("helio-ddc".to_string())
            .spawn(move || {
                tracing::debug!("DDC worker started");
                for job in rx {
                    job(&worker_transport);
                }
                tracing::debug!("DDC worker stopped");
            });
        if let Err(e) = spawned {
            // Submissions will report QueueClosed
            tracing::error!("Failed to start DDC worker: {}", e);
        }
        Self { jobs, transport }
    }

    /// Shared transport, for state that needs no bus access
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    fn submit<T, F>(&self, f: F) -> Result<oneshot::Receiver<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Transport) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |transport| {
            // The caller may have stopped waiting
            let _ = tx.send(f(transport));
        });
        self.jobs.send(job).map_err(|_| ServiceError::QueueClosed)?;
        Ok(rx)
    }

    /// Run `f` on the worker and wait for it asynchronously
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transport) -> T + Send + 'static,
    {
        self.submit(f)?.await.map_err(|_| ServiceError::QueueClosed)
    }

    /// Run `f` on the worker, blocking the calling thread
    ///
    /// Must not be called from inside the async runtime.
    pub fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transport) -> T + Send + 'static,
    {
        self.submit(f)?
            .blocking_recv()
            .map_err(|_| ServiceError::QueueClosed)
    }

    pub async fn read(&self, display: DisplayId, control: ControlId) -> Result<DdcReadResult> {
        Ok(self.run(move |t| t.read(display, control)).await??)
    }

    /// Write a control; a held write reports why nothing was sent
    pub async fn write(
        &self,
        display: DisplayId,
        control: ControlId,
        value: u16,
    ) -> Result<Delivery> {
        Ok(self.run(move |t| t.deliver(display, control, value)).await??)
    }

    pub async fn read_edid(&self, display: DisplayId) -> Result<Vec<u8>> {
        Ok(self.run(move |t| t.read_edid(display)).await??)
    }
}
