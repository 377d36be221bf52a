//! Runs the event loop next to a shutdown watcher and joins both.
//!
//! Cancellation is cooperative: a stop request only keeps the loop from
//! picking up the next event. Whatever the loop is doing when the request
//! lands is allowed to finish, even past the shutdown budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use crate::error::BotError;

#[async_trait]
pub trait ManagedRoutine: Send + 'static {
    async fn run(&mut self) -> Result<(), BotError>;
    fn shutdown_handle(&self) -> ShutdownHandle;
}

/// Held by whoever wants the routine to stop.
#[derive(Clone)]
pub struct ShutdownHandle {
    stop_tx: Arc<watch::Sender<bool>>,
    stopped_rx: watch::Receiver<bool>,
}

/// Held by the routine itself.
pub struct ShutdownSignal {
    stop_rx: watch::Receiver<bool>,
    stopped_tx: watch::Sender<bool>,
}

pub fn shutdown_pair() -> (ShutdownHandle, ShutdownSignal) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let (stopped_tx, stopped_rx) = watch::channel(false);
    (
        ShutdownHandle {
            stop_tx: Arc::new(stop_tx),
            stopped_rx,
        },
        ShutdownSignal {
            stop_rx,
            stopped_tx,
        },
    )
}

impl ShutdownHandle {
    /// Requests a stop and waits until the routine has let go of its signal.
    pub async fn shutdown(&self) {
        self.stop_tx.send_replace(true);
        let mut stopped = self.stopped_rx.clone();
        // A dropped sender means the signal is gone, which is also "stopped".
        let _ = stopped.wait_for(|done| *done).await;
    }
}

impl ShutdownSignal {
    /// Resolves once a stop was requested. Pends forever if no handle is left.
    pub async fn requested(&mut self) {
        let requested = self.stop_rx.wait_for(|stop| *stop).await.is_ok();
        if !requested {
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for ShutdownSignal {
    fn drop(&mut self) {
        self.stopped_tx.send_replace(true);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReport {
    /// The routine ended on its own.
    NotRequested,
    Completed,
    /// The routine outlived the budget. It was still joined afterwards.
    TimedOut,
}

pub struct Supervisor {
    shutdown_timeout: Duration,
}

impl Supervisor {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self { shutdown_timeout }
    }

    /// Drives `routine` until it returns, stopping it when `stop` flips to
    /// true. Both the routine task and the watcher task are always joined.
    pub async fn run<R>(
        &self,
        mut routine: R,
        mut stop: watch::Receiver<bool>,
    ) -> Result<ShutdownReport, BotError>
    where
        R: ManagedRoutine,
    {
        let handle = routine.shutdown_handle();
        let budget = self.shutdown_timeout;
        let (done_tx, mut done_rx) = oneshot::channel::<()>();

        let worker = tokio::spawn(async move {
            let result = routine.run().await;
            let _ = done_tx.send(());
            result
        });

        let watcher = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = &mut done_rx => ShutdownReport::NotRequested,
                _ = wait_for_stop(&mut stop) => {
                    info!(timeout_secs = budget.as_secs_f64(), "shutdown requested");
                    match tokio::time::timeout(budget, handle.shutdown()).await {
                        Ok(()) => {
                            info!("event loop stopped");
                            ShutdownReport::Completed
                        }
                        Err(_) => {
                            warn!(
                                timeout_secs = budget.as_secs_f64(),
                                "event loop did not stop within budget, waiting for in-flight work"
                            );
                            ShutdownReport::TimedOut
                        }
                    }
                }
            }
        });

        let (worker, watcher) = tokio::join!(worker, watcher);
        let report = watcher.map_err(|e| BotError::Task(format!("shutdown watcher: {e}")))?;
        worker.map_err(|e| BotError::Task(format!("event loop: {e}")))??;
        Ok(report)
    }
}

async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|value| *value).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::watch;

    use super::{
        ManagedRoutine, ShutdownHandle, ShutdownReport, ShutdownSignal, Supervisor, shutdown_pair,
    };
    use crate::error::BotError;

    enum Behaviour {
        UntilStopped { linger: Duration },
        Fatal,
        Finish,
    }

    struct FakeRoutine {
        handle: ShutdownHandle,
        signal: ShutdownSignal,
        behaviour: Behaviour,
        finished: Arc<AtomicBool>,
    }

    impl FakeRoutine {
        fn new(behaviour: Behaviour) -> (Self, Arc<AtomicBool>) {
            let (handle, signal) = shutdown_pair();
            let finished = Arc::new(AtomicBool::new(false));
            (
                Self {
                    handle,
                    signal,
                    behaviour,
                    finished: finished.clone(),
                },
                finished,
            )
        }
    }

    #[async_trait]
    impl ManagedRoutine for FakeRoutine {
        async fn run(&mut self) -> Result<(), BotError> {
            let result = match self.behaviour {
                Behaviour::UntilStopped { linger } => {
                    self.signal.requested().await;
                    tokio::time::sleep(linger).await;
                    Ok(())
                }
                Behaviour::Fatal => Err(BotError::TransportFatal("invalid_auth".to_string())),
                Behaviour::Finish => Ok(()),
            };
            self.finished.store(true, Ordering::SeqCst);
            result
        }

        fn shutdown_handle(&self) -> ShutdownHandle {
            self.handle.clone()
        }
    }

    fn request_stop_soon(stop_tx: watch::Sender<bool>) {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop_tx.send_replace(true);
        });
    }

    #[tokio::test]
    async fn stop_request_completes_within_budget() {
        let (routine, finished) = FakeRoutine::new(Behaviour::UntilStopped {
            linger: Duration::ZERO,
        });
        let (stop_tx, stop_rx) = watch::channel(false);
        request_stop_soon(stop_tx);

        let report = Supervisor::new(Duration::from_secs(5))
            .run(routine, stop_rx)
            .await
            .expect("clean shutdown");

        assert_eq!(report, ShutdownReport::Completed);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn slow_loop_times_out_but_is_still_joined() {
        let (routine, finished) = FakeRoutine::new(Behaviour::UntilStopped {
            linger: Duration::from_millis(300),
        });
        let (stop_tx, stop_rx) = watch::channel(false);
        request_stop_soon(stop_tx);

        let report = Supervisor::new(Duration::from_millis(50))
            .run(routine, stop_rx)
            .await
            .expect("joined");

        assert_eq!(report, ShutdownReport::TimedOut);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fatal_error_is_propagated() {
        let (routine, _) = FakeRoutine::new(Behaviour::Fatal);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let err = Supervisor::new(Duration::from_secs(1))
            .run(routine, stop_rx)
            .await
            .expect_err("fatal");

        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn loop_ending_on_its_own_is_not_a_shutdown() {
        let (routine, finished) = FakeRoutine::new(Behaviour::Finish);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let report = Supervisor::new(Duration::from_secs(1))
            .run(routine, stop_rx)
            .await
            .expect("finished");

        assert_eq!(report, ShutdownReport::NotRequested);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropping_the_signal_marks_stopped() {
        let (handle, signal) = shutdown_pair();
        assert!(!*handle.stopped_rx.borrow());
        drop(signal);
        assert!(*handle.stopped_rx.borrow());
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown returns immediately");
    }
}
