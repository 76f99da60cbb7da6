//! Ordered execution streams
//!
//! A stream is a FIFO of device jobs drained by one worker thread. Jobs of a stream run in
//! submission order, jobs of distinct streams run concurrently. The first failing job poisons the
//! stream: later jobs are dropped without running and every synchronization reports that failure.

use crate::device::Device;
use crate::{DeviceError, Result};
use crossbeam::channel::{bounded, unbounded, RecvTimeoutError, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Duration;

type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

enum Request {
    Run(Job),
    Fence(Sender<Result<()>>),
}

pub struct Stream {
    device: Device,
    sender: Option<Sender<Request>>,
    worker: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("device", &self.device.id())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Stream {
    pub(crate) fn new(device: Device, timeout: Option<Duration>) -> Self {
        let (sender, receiver) = unbounded::<Request>();
        let device_id = device.id();

        let worker = std::thread::Builder::new()
            .name(format!("device{device_id}-stream"))
            .spawn(move || {
                let mut failure: Option<DeviceError> = None;
                for req in receiver {
                    match req {
                        Request::Run(job) => {
                            if failure.is_some() {
                                continue;
                            }
                            let res = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                                Err(DeviceError::Kernel {
                                    kernel: "stream job",
                                    reason: "job panicked".into(),
                                })
                            });
                            if let Err(err) = res {
                                tracing::trace!(device = device_id, %err, "stream poisoned");
                                failure = Some(err);
                            }
                        }
                        Request::Fence(ack) => {
                            let status = failure.clone().map_or(Ok(()), Err);
                            // The waiter may have timed out already
                            let _ = ack.send(status);
                        }
                    }
                }
            })
            .ok();

        Self {
            device,
            sender: worker.as_ref().map(|_| sender),
            worker,
            timeout,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_id(&self) -> usize {
        self.device.id()
    }

    /// Enqueue a job. It runs after every job previously submitted on this stream.
    pub(crate) fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.send(Request::Run(Box::new(job)))
    }

    fn send(&self, req: Request) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or(DeviceError::StreamClosed)?
            .send(req)
            .map_err(|_| DeviceError::StreamClosed)
    }

    /// Block until every job submitted so far has completed
    ///
    /// Uses the timeout of the device configuration, if any.
    pub fn synchronize(&self) -> Result<()> {
        match self.timeout {
            Some(timeout) => self.synchronize_timeout(timeout),
            None => {
                let (ack, done) = bounded(1);
                self.send(Request::Fence(ack))?;
                done.recv().map_err(|_| DeviceError::StreamClosed)?
            }
        }
    }

    /// Same as [`Stream::synchronize`] but gives up after `timeout`
    ///
    /// A timed out stream keeps running, a later synchronization may still succeed.
    pub fn synchronize_timeout(&self, timeout: Duration) -> Result<()> {
        let (ack, done) = bounded(1);
        self.send(Request::Fence(ack))?;
        match done.recv_timeout(timeout) {
            Ok(status) => status,
            Err(RecvTimeoutError::Timeout) => Err(DeviceError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(DeviceError::StreamClosed),
        }
    }
}

impl Drop for Stream {
    /// Drain pending jobs before destroying the stream
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!(device = self.device.id(), "stream worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeviceConfig, DeviceContext};
    use std::sync::{Arc, Mutex};

    fn device() -> Device {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        ctx.device(0).unwrap().clone()
    }

    #[test]
    fn jobs_run_in_submission_order() {
        let stream = device().create_stream();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..64 {
            let log = log.clone();
            stream
                .submit(move || {
                    if i % 7 == 0 {
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    log.lock().unwrap().push(i);
                    Ok(())
                })
                .unwrap();
        }
        stream.synchronize().unwrap();

        assert_eq!(*log.lock().unwrap(), (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn first_failure_is_sticky() {
        let stream = device().create_stream();
        let ran_after = Arc::new(Mutex::new(false));

        stream
            .submit(|| {
                Err(DeviceError::Kernel {
                    kernel: "test",
                    reason: "boom".into(),
                })
            })
            .unwrap();
        let flag = ran_after.clone();
        stream
            .submit(move || {
                *flag.lock().unwrap() = true;
                Ok(())
            })
            .unwrap();

        for _ in 0..2 {
            assert!(matches!(
                stream.synchronize(),
                Err(DeviceError::Kernel { kernel: "test", .. })
            ));
        }
        assert!(!*ran_after.lock().unwrap());
    }

    #[test]
    fn panicking_job_is_reported() {
        let stream = device().create_stream();
        stream.submit(|| panic!("kernel bug")).unwrap();
        assert!(matches!(
            stream.synchronize(),
            Err(DeviceError::Kernel {
                kernel: "stream job",
                ..
            })
        ));
    }

    #[test]
    fn synchronize_times_out_on_hung_stream() {
        let stream = device().create_stream();
        stream
            .submit(|| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .unwrap();

        let timeout = Duration::from_millis(10);
        assert_eq!(
            stream.synchronize_timeout(timeout),
            Err(DeviceError::Timeout(timeout))
        );
        assert_eq!(stream.synchronize(), Ok(()));
    }
}
