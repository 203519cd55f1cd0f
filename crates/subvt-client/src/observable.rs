//! Single-writer, multi-reader observable values.

use tokio::sync::watch;

/// Holds the current value and notifies [`Watcher`]s when it changes.
///
/// Readers only ever get copies; the value is replaced, never mutated in place.
#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            tx: watch::Sender::new(initial),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replace the value and notify watchers unconditionally.
    pub fn replace(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// New watcher starting at the current value.
    pub fn watch(&self) -> Watcher<T> {
        Watcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + PartialEq> Observable<T> {
    /// Replace the value, notifying watchers only when it differs.
    ///
    /// Returns whether a notification was sent.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

/// Read side of an [`Observable`].
#[derive(Debug, Clone)]
pub struct Watcher<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> Watcher<T> {
    /// Current value, marking it seen.
    pub fn get(&mut self) -> T {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next change.
    ///
    /// Returns `None` once the observable is gone.
    pub async fn changed(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the value satisfies `predicate`, checking the current value first.
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let value = self.rx.wait_for(|value| predicate(value)).await.ok()?;
        Some((*value).clone())
    }
}
