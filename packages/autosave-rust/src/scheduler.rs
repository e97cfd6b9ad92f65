//! Cancellable one-shot timers.
//!
//! [`ScheduledTask`] holds at most one armed timer. Re-arming aborts the
//! previous timer. When a timer fires, its work is handed to a detached
//! task, so cancelling afterwards never interrupts work already started.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A slot for one pending delayed task.
#[derive(Debug, Default)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` on `runtime` after `delay`, replacing any armed timer.
    pub fn arm<F>(&mut self, runtime: &Handle, delay: Duration, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let spawner = runtime.clone();
        self.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Detached: aborting this timer must not abort the work.
            drop(spawner.spawn(work));
        }));
    }

    /// Aborts the armed timer. Returns whether one was armed and had not
    /// yet fired.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let armed = !handle.is_finished();
                handle.abort();
                armed
            }
            None => false,
        }
    }

    /// Whether a timer is armed and has not fired yet.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counter_work(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut task = ScheduledTask::new();
        task.arm(&Handle::current(), Duration::from_millis(500), counter_work(&fired));
        assert!(task.is_armed());

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!task.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_timer() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut task = ScheduledTask::new();
        let runtime = Handle::current();
        task.arm(&runtime, Duration::from_millis(500), counter_work(&fired));
        tokio::time::sleep(Duration::from_millis(200)).await;
        task.arm(&runtime, Duration::from_millis(500), counter_work(&fired));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut task = ScheduledTask::new();
        task.arm(&Handle::current(), Duration::from_millis(100), counter_work(&fired));

        assert!(task.cancel());
        assert!(!task.cancel());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fire_does_not_abort_the_work() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut task = ScheduledTask::new();
        let work = {
            let done = Arc::clone(&done);
            async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }
        };
        task.arm(&Handle::current(), Duration::from_millis(100), work);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!task.cancel());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let mut task = ScheduledTask::new();
            task.arm(&Handle::current(), Duration::from_millis(100), counter_work(&fired));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
