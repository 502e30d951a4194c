use std::sync::{Condvar, Mutex};
use std::time::Duration;

// -------------------------------------------------------------------------------------------------

/// A bounded-wait counting semaphore.
///
/// The DecoderWorker and Collector threads each block on one of these with a timeout,
/// so a missed wakeup (e.g. a signal sent just before the waiter parks) can never hang a
/// thread forever: the 2-second timeout used throughout this crate exists purely to bound
/// that wake latency, not to act as a watchdog.
pub struct Semaphore {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Self {
            permits: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    /// Release one permit and wake a single waiter, if any is parked.
    pub fn signal(&self) {
        let mut permits = self.permits.lock().unwrap();
        *permits += 1;
        self.condvar.notify_one();
    }

    /// Block until a permit is available or `timeout` elapses, consuming at most one permit.
    /// Returns `true` if a permit was consumed, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let permits = self.permits.lock().unwrap();
        if *permits > 0 {
            let mut permits = permits;
            *permits -= 1;
            return true;
        }
        let (mut permits, result) = self
            .condvar
            .wait_timeout_while(permits, timeout, |permits| *permits == 0)
            .unwrap();
        if *permits > 0 {
            *permits -= 1;
            true
        } else {
            debug_assert!(result.timed_out());
            false
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_times_out_without_signal() {
        let sem = Semaphore::new();
        assert!(!sem.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn signal_wakes_a_waiter() {
        let sem = Arc::new(Semaphore::new());
        let waiter = {
            let sem = sem.clone();
            thread::spawn(move || sem.wait_timeout(Duration::from_secs(2)))
        };
        thread::sleep(Duration::from_millis(20));
        sem.signal();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn permits_accumulate_when_unconsumed() {
        let sem = Semaphore::new();
        sem.signal();
        sem.signal();
        assert!(sem.wait_timeout(Duration::from_millis(10)));
        assert!(sem.wait_timeout(Duration::from_millis(10)));
        assert!(!sem.wait_timeout(Duration::from_millis(10)));
    }
}
