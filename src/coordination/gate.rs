use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct GateState {
    open: bool,
    cancelled: bool,
}

/// A level-triggered gate threads can block on until it opens.
///
/// Opening wakes every waiter and keeps the gate open until it is closed again, so a thread
/// arriving late passes straight through. Cancelling wakes every waiter for good.
#[derive(Debug)]
pub struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Gate {
    /// Creates a new `Gate`.
    ///
    /// # Arguments
    /// * `open` - Whether the gate starts open.
    pub fn new(open: bool) -> Self {
        Self {
            state: Mutex::new(GateState {
                open,
                cancelled: false,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn open(&self) {
        self.state.lock().open = true;
        self.cond.notify_all();
    }

    pub fn close(&self) {
        self.state.lock().open = false;
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Wakes every current and future waiter, regardless of the gate being open.
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.cond.notify_all();
    }

    /// Blocks until the gate is open or cancelled.
    ///
    /// # Returns
    /// Whether the gate was open when the thread woke up.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();

        while !state.open && !state.cancelled {
            self.cond.wait(&mut state);
        }

        state.open
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    #[test]
    fn test_open_gate_does_not_block() {
        let gate = Gate::new(true);
        assert!(gate.wait());
        assert!(gate.wait());
    }

    #[test]
    fn test_open_wakes_a_blocked_thread() {
        let gate = Arc::new(Gate::new(false));
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait())
        };

        thread::sleep(Duration::from_millis(20));
        gate.open();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_cancel_wakes_a_closed_gate() {
        let gate = Arc::new(Gate::new(false));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || gate.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        gate.cancel();

        for waiter in waiters {
            assert!(!waiter.join().unwrap());
        }
        assert!(!gate.wait());
    }

    #[test]
    fn test_close_is_level_triggered() {
        let gate = Gate::new(true);
        gate.close();
        assert!(!gate.is_open());
        gate.open();
        assert!(gate.is_open());
    }
}
