//! Wake-up primitive standing in for the inter-processor interrupt

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A latched wake-up flag
///
/// `ring()` sets the flag and wakes a waiter; `wait()` returns as soon as the
/// flag is set (clearing it) or the timeout expires. A ring that happens while
/// nobody waits is not lost.
#[derive(Debug, Default)]
pub struct Doorbell {
    rung: Mutex<bool>,
    cvar: Condvar,
}

impl Doorbell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the flag and wake one waiter
    pub fn ring(&self) {
        let mut rung = self.rung.lock().unwrap_or_else(|e| e.into_inner());
        *rung = true;
        self.cvar.notify_one();
    }

    /// Wait until rung or timed out. Returns `true` if the doorbell was rung.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.rung.lock().unwrap_or_else(|e| {
            log::warn!("Doorbell mutex poisoned; continuing");
            e.into_inner()
        });
        let (mut rung, _) = self
            .cvar
            .wait_timeout_while(guard, timeout, |rung| !*rung)
            .unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *rung)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_ring_before_wait_is_latched() {
        let bell = Doorbell::new();
        bell.ring();
        assert!(bell.wait(Duration::from_millis(1)));
        // Flag is consumed by the first wait
        assert!(!bell.wait(Duration::from_millis(1)));
    }

    #[test]
    fn test_ring_wakes_other_thread() {
        let bell = Arc::new(Doorbell::new());
        let waiter = {
            let bell = bell.clone();
            thread::spawn(move || bell.wait(Duration::from_secs(5)))
        };
        bell.ring();
        assert!(waiter.join().unwrap());
    }
}
