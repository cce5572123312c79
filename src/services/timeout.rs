use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

type FireFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One-shot cancellable timer.
///
/// Construction does not arm it; `start` schedules the callback exactly
/// once. `stop` is idempotent and wins the race against a pending fire:
/// the stopped flag is set before the task is aborted, and the task
/// re-checks the flag after waking, so the callback never runs once `stop`
/// has begun.
pub struct Timeout {
    delay: Duration,
    stopped: Arc<AtomicBool>,
    on_fire: Mutex<Option<FireFuture>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Timeout {
    pub fn new<F>(delay: Duration, on_fire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Timeout {
            delay,
            stopped: Arc::new(AtomicBool::new(false)),
            on_fire: Mutex::new(Some(Box::pin(on_fire))),
            task: Mutex::new(None),
        }
    }

    /// Arm the timer. A second call is a no-op (the callback has already
    /// been consumed).
    pub async fn start(&self) {
        let Some(fire) = self.on_fire.lock().await.take() else {
            return;
        };

        let stopped = Arc::clone(&self.stopped);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if stopped.load(Ordering::SeqCst) {
                return;
            }
            fire.await;
        });

        *self.task.lock().await = Some(handle);
    }

    /// Cancel the timer. Double-stop is a no-op; stopping an already-fired
    /// timer is a no-op.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }

    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
