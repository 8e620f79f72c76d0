//! Synchronous observer primitive
//!
//! A `Signal` holds a list of callbacks and invokes them in connection
//! order whenever it is emitted. Delivery is synchronous: `emit` returns
//! only after every listener has run to completion, so observers see
//! mutations strictly in the order they occurred.

use std::fmt;

/// Handle identifying one connected listener, used to disconnect it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<T> = Box<dyn FnMut(&T) + Send>;

/// An observable event source with synchronously invoked listeners.
pub struct Signal<T> {
    next_id: u64,
    slots: Vec<(ListenerId, Callback<T>)>,
}

impl<T> Signal<T> {
    /// Creates a signal with no listeners.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            slots: Vec::new(),
        }
    }

    /// Connects a listener and returns the handle to disconnect it.
    pub fn connect<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.slots.push((id, Box::new(listener)));
        id
    }

    /// Disconnects the listener with the given handle. Returns whether a
    /// listener was actually removed; disconnecting twice is a no-op.
    pub fn disconnect(&mut self, id: ListenerId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|(slot_id, _)| *slot_id != id);
        self.slots.len() != before
    }

    /// Invokes every connected listener with the given value, in connection
    /// order.
    pub fn emit(&mut self, value: &T) {
        for (_, listener) in self.slots.iter_mut() {
            listener(value);
        }
    }

    /// The number of connected listeners.
    pub fn listener_count(&self) -> usize {
        self.slots.len()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_emit_reaches_all_listeners() {
        let mut signal = Signal::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            signal.connect(move |value: &u32| {
                hits.fetch_add(*value as usize, Ordering::Relaxed);
            });
        }

        signal.emit(&2);
        assert_eq!(hits.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_listeners_run_in_connection_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut signal = Signal::new();
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            signal.connect(move |_: &()| order.lock().push(tag));
        }
        signal.emit(&());
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_disconnect() {
        let mut signal = Signal::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let id = signal.connect(move |_: &()| {
            hits_clone.fetch_add(1, Ordering::Relaxed);
        });

        signal.emit(&());
        assert!(signal.disconnect(id));
        // A second disconnect of the same handle is a no-op.
        assert!(!signal.disconnect(id));
        signal.emit(&());

        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(signal.listener_count(), 0);
    }
}
