use std::sync::{Condvar, Mutex, MutexGuard, mpsc};
use std::time::{Duration, Instant};

/// Serialized owner of one state machine's current value.
///
/// Every mutation goes through the cell's lock, so observers never see a torn update. Readers get
/// clones; subscribers receive every value that is set, in order.
pub struct StateCell<T: Clone + Send> {
    inner: Mutex<Inner<T>>,
    changed: Condvar,
}

struct Inner<T> {
    value: T,
    subscribers: Vec<mpsc::Sender<T>>,
}

impl<T: Clone + Send> StateCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value: initial,
                subscribers: Vec::new(),
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    pub fn set(&self, next: T) {
        let mut inner = self.lock();
        inner.value = next;
        publish(&mut inner);
        drop(inner);
        self.changed.notify_all();
    }

    /// Replace the value only when `guard` accepts the current one. Returns the previous value on
    /// success.
    pub fn transition(&self, guard: impl FnOnce(&T) -> bool, next: T) -> Option<T> {
        let mut inner = self.lock();
        if !guard(&inner.value) {
            return None;
        }
        let prev = std::mem::replace(&mut inner.value, next);
        publish(&mut inner);
        drop(inner);
        self.changed.notify_all();
        Some(prev)
    }

    /// Receive every subsequent value. The receiver is dropped from the list once disconnected.
    pub fn subscribe(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Block until `pred` holds or `timeout` elapses; returns the matching value.
    pub fn wait_until(&self, timeout: Duration, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if pred(&inner.value) {
                return Some(inner.value.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|p| p.into_inner());
            inner = guard;
        }
    }
}

fn publish<T: Clone>(inner: &mut Inner<T>) {
    let value = inner.value.clone();
    inner
        .subscribers
        .retain(|tx| tx.send(value.clone()).is_ok());
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/state.rs"]
mod tests;
