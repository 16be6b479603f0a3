use tokio::task::JoinHandle;

/// Delayed callbacks owned by one session. Dropping the session aborts them.
#[derive(Debug, Default)]
pub struct SessionTimers {
    dwell: Option<JoinHandle<()>>,
    close: Option<JoinHandle<()>>,
}

impl SessionTimers {
    pub fn set_dwell(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.dwell.replace(handle) {
            previous.abort();
        }
    }

    pub fn cancel_dwell(&mut self) {
        if let Some(handle) = self.dwell.take() {
            handle.abort();
        }
    }

    pub fn close_pending(&self) -> bool {
        self.close.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn set_close(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.close.replace(handle) {
            previous.abort();
        }
    }

    /// Forget the close timer without aborting it; used by the timer itself
    /// when it tears the session down.
    pub fn detach_close(&mut self) {
        self.close.take();
    }

    pub fn cancel_all(&mut self) {
        self.cancel_dwell();
        if let Some(handle) = self.close.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_dropping_timers_aborts_callbacks() {
        let fired = Arc::new(AtomicBool::new(false));
        let mut timers = SessionTimers::default();

        let flag = fired.clone();
        timers.set_close(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2000)).await;
            flag.store(true, Ordering::SeqCst);
        }));
        assert!(timers.close_pending());

        drop(timers);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_dwell_aborts_previous() {
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));
        let mut timers = SessionTimers::default();

        let flag = first.clone();
        timers.set_dwell(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            flag.store(true, Ordering::SeqCst);
        }));
        let flag = second.clone();
        timers.set_dwell(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            flag.store(true, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert!(!first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));
    }
}
