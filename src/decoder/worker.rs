//! Worker coupling for the row pipeline.
//!
//! One long-lived worker owns the finish-stage state (deblocking, dithering,
//! output). The main context hands it one row job at a time and blocks in
//! [`Worker::sync`] until the previous job is done — the pipeline's only
//! suspension point. The serial variant runs the same handler inline so the
//! scheduling modes share one code path.

use super::error::DecodeError;

/// State machine driven by the worker: consumes one job, returns it (with
/// its buffers) together with a keep-going flag.
pub(crate) trait RowHandler: Send + 'static {
    /// One unit of work; carries the buffers that rotate between contexts.
    type Job: Send + 'static;

    /// Process one job. `Ok(false)` is a user abort, `Err` a hard failure.
    fn process(&mut self, job: &mut Self::Job) -> Result<bool, DecodeError>;
}

/// A completed job returned from [`Worker::sync`].
pub(crate) struct Finished<J> {
    /// The job, with its buffers ready for reuse.
    pub job: J,
    /// False when the handler requested an abort.
    pub keep_going: bool,
}

type Reply<J> = (J, Result<bool, DecodeError>);

/// Serial or channel-coupled executor for a [`RowHandler`].
pub(crate) enum Worker<H: RowHandler> {
    /// Single execution context: `launch` runs the handler inline.
    Serial {
        handler: H,
        pending: Option<Reply<H::Job>>,
    },
    /// Dedicated thread owning the handler.
    #[cfg(feature = "std")]
    Threaded {
        tx: std::sync::mpsc::Sender<H::Job>,
        rx: std::sync::mpsc::Receiver<Reply<H::Job>>,
        handle: std::thread::JoinHandle<H>,
        in_flight: bool,
    },
}

impl<H: RowHandler> Worker<H> {
    /// Claim an execution context for `handler`. Threading is best-effort:
    /// without `std` (or when `threaded` is false) the worker is serial.
    pub(crate) fn reset(handler: H, threaded: bool) -> Self {
        #[cfg(feature = "std")]
        if threaded {
            let (tx, job_rx) = std::sync::mpsc::channel::<H::Job>();
            let (reply_tx, rx) = std::sync::mpsc::channel::<Reply<H::Job>>();
            let handle = std::thread::spawn(move || {
                let mut handler = handler;
                while let Ok(mut job) = job_rx.recv() {
                    let res = handler.process(&mut job);
                    if reply_tx.send((job, res)).is_err() {
                        break;
                    }
                }
                handler
            });
            return Worker::Threaded {
                tx,
                rx,
                handle,
                in_flight: false,
            };
        }
        let _ = threaded;
        Worker::Serial {
            handler,
            pending: None,
        }
    }

    /// Hand over the next row. The previous row must have been reclaimed
    /// with [`Worker::sync`] first.
    pub(crate) fn launch(&mut self, job: H::Job) {
        match self {
            Worker::Serial { handler, pending } => {
                debug_assert!(pending.is_none());
                let mut job = job;
                let res = handler.process(&mut job);
                *pending = Some((job, res));
            }
            #[cfg(feature = "std")]
            Worker::Threaded { tx, in_flight, .. } => {
                debug_assert!(!*in_flight);
                // A failed send means the thread is gone; the next sync
                // reports it.
                *in_flight = true;
                let _ = tx.send(job);
            }
        }
    }

    /// Wait for the in-flight job, if any, and reclaim its buffers.
    pub(crate) fn sync(&mut self) -> Result<Option<Finished<H::Job>>, DecodeError> {
        match self {
            Worker::Serial { pending, .. } => match pending.take() {
                None => Ok(None),
                Some((job, res)) => {
                    let keep_going = res?;
                    Ok(Some(Finished { job, keep_going }))
                }
            },
            #[cfg(feature = "std")]
            Worker::Threaded { rx, in_flight, .. } => {
                if !*in_flight {
                    return Ok(None);
                }
                *in_flight = false;
                let (job, res) = rx
                    .recv()
                    .map_err(|_| DecodeError::InvalidParameter("worker thread terminated"))?;
                let keep_going = res?;
                Ok(Some(Finished { job, keep_going }))
            }
        }
    }

    /// Shut the context down and take the handler (and its state) back.
    /// Any in-flight job must have been synced already.
    pub(crate) fn into_handler(self) -> Result<H, DecodeError> {
        match self {
            Worker::Serial { handler, .. } => Ok(handler),
            #[cfg(feature = "std")]
            Worker::Threaded { tx, handle, .. } => {
                drop(tx);
                handle
                    .join()
                    .map_err(|_| DecodeError::InvalidParameter("worker thread panicked"))
            }
        }
    }
}
