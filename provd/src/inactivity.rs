//! Inactivity watchdog
//!
//! Fires a callback once no request has arrived and no response has been
//! sent for the configured delay. The daemon uses it to power the radio
//! down after a button press enabled it.

use std::time::Duration;

use log::*;
use tokio::time::Instant;

pub type IdleCallback = Box<dyn FnMut() + Send>;

/// Watchdog configuration handed to the engine
pub struct Watchdog {
    pub delay: Duration,
    pub callback: IdleCallback,
}

impl Watchdog {
    pub fn new(delay: Duration, callback: impl FnMut() + Send + 'static) -> Self {
        Self {
            delay,
            callback: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog").field("delay", &self.delay).finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct InactivityTimer {
    watchdog: Option<Watchdog>,
    deadline: Option<Instant>,
}

impl InactivityTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the watchdog; `None` disables it. A new watchdog is armed
    /// right away.
    pub fn set(&mut self, watchdog: Option<Watchdog>, now: Instant) {
        self.deadline = watchdog.as_ref().map(|w| now + w.delay);
        if let Some(w) = &watchdog {
            debug!("Inactivity timeout set to {:?}", w.delay);
        }
        self.watchdog = watchdog;
    }

    /// Push the deadline out by the full delay
    pub fn rearm(&mut self, now: Instant) {
        if let Some(w) = &self.watchdog {
            self.deadline = Some(now + w.delay);
        }
    }

    /// Stop the pending countdown, keeping the watchdog for the next rearm
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.watchdog.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run the callback if the deadline passed; it fires at most once per
    /// arming
    pub fn poll(&mut self, now: Instant) -> bool {
        match (self.deadline, self.watchdog.as_mut()) {
            (Some(deadline), Some(w)) if now >= deadline => {
                self.deadline = None;
                info!("No activity for {:?}", w.delay);
                (w.callback)();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn watchdog(secs: u64) -> (Arc<AtomicUsize>, Watchdog) {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let w = Watchdog::new(Duration::from_secs(secs), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        (fired, w)
    }

    #[test]
    fn fires_once_after_delay() {
        let start = Instant::now();
        let (fired, w) = watchdog(60);
        let mut timer = InactivityTimer::new();
        timer.set(Some(w), start);

        assert!(!timer.poll(start + Duration::from_secs(59)));
        assert!(timer.poll(start + Duration::from_secs(60)));
        assert!(!timer.poll(start + Duration::from_secs(120)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timer.deadline(), None);
    }

    #[test]
    fn activity_pushes_the_deadline() {
        let start = Instant::now();
        let (fired, w) = watchdog(10);
        let mut timer = InactivityTimer::new();
        timer.set(Some(w), start);

        timer.rearm(start + Duration::from_secs(8));
        assert!(!timer.poll(start + Duration::from_secs(12)));
        assert!(timer.poll(start + Duration::from_secs(18)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Rearmed after firing, it can fire again
        timer.rearm(start + Duration::from_secs(20));
        assert!(timer.poll(start + Duration::from_secs(30)));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancel_and_disable() {
        let start = Instant::now();
        let (fired, w) = watchdog(5);
        let mut timer = InactivityTimer::new();
        timer.set(Some(w), start);
        timer.cancel();
        assert!(!timer.poll(start + Duration::from_secs(10)));
        assert!(timer.is_enabled());

        timer.set(None, start);
        timer.rearm(start);
        assert_eq!(timer.deadline(), None);
        assert!(!timer.is_enabled());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
