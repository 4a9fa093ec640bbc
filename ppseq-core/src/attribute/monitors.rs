use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError},
};

use super::Event;

/// A change handler. Handlers are identified by their allocation, so keep the [`Arc`] to remove it later.
pub type Handler<T> = Arc<dyn Fn(&Event<T>) + Send + Sync>;

struct Inner<T> {
    handlers: Vec<Handler<T>>,
    last_timestamp: Option<f64>,
    last_write: Option<f64>,
}

/// The subscribers of an attribute.
///
/// Events whose latest timestamp is older than the last accepted event, or older than the last local write,
/// are stale and are not delivered.
pub struct Monitors<T> {
    reference: String,
    inner: Mutex<Inner<T>>,
}

impl<T> std::fmt::Debug for Monitors<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitors")
            .field("reference", &self.reference)
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Monitors<T> {
    /// Creates a new [`Monitors`] for the attribute `reference`.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            inner: Mutex::new(Inner {
                handlers: Vec::new(),
                last_timestamp: None,
                last_write: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes `handler`. Returns `false` if it was already subscribed.
    pub fn add(&self, handler: &Handler<T>) -> bool {
        let mut inner = self.lock();
        if inner.handlers.iter().any(|h| Arc::ptr_eq(h, handler)) {
            return false;
        }
        inner.handlers.push(handler.clone());
        true
    }

    /// Unsubscribes `handler`. Returns `false` if it was not subscribed.
    pub fn remove(&self, handler: &Handler<T>) -> bool {
        let mut inner = self.lock();
        match inner.handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
            Some(i) => {
                inner.handlers.remove(i);
                true
            }
            None => false,
        }
    }

    /// The number of subscribed handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    /// Returns `true` if no handler is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a local write at `time`. Notifications older than it are stale from now on.
    pub fn note_write(&self, time: f64) {
        let mut inner = self.lock();
        inner.last_write = Some(inner.last_write.map_or(time, |t| t.max(time)));
    }

    /// Returns `true` if `event` is older than what this attribute has already seen.
    #[must_use]
    pub fn is_stale(&self, event: &Event<T>) -> bool {
        let inner = self.lock();
        Self::stale(&inner, event)
    }

    fn stale(inner: &Inner<T>, event: &Event<T>) -> bool {
        let Some(latest) = event.timestamps.latest() else {
            return false;
        };
        inner.last_timestamp.is_some_and(|t| latest < t)
            || inner.last_write.is_some_and(|t| latest < t)
    }

    /// Delivers `event` to every handler unless it is stale. Returns `false` for a stale event.
    ///
    /// A panicking handler is logged and does not prevent delivery to the others.
    pub fn notify(&self, event: &Event<T>) -> bool {
        let handlers = {
            let mut inner = self.lock();
            if Self::stale(&inner, event) {
                tracing::debug!(
                    "{}: dropped stale event with timestamps {:?}",
                    self.reference,
                    event.timestamps
                );
                return false;
            }
            if let Some(latest) = event.timestamps.latest() {
                inner.last_timestamp = Some(latest);
            }
            inner.handlers.clone()
        };
        handlers.iter().for_each(|handler| {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!("{}: monitor handler panicked", self.reference);
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::attribute::Timestamps;

    fn event(time: f64, value: char, ts: &[f64]) -> Event<char> {
        Event::new(time, value, "test").with_timestamps(Timestamps::new(ts.to_vec()))
    }

    fn recorder() -> (Handler<char>, Arc<Mutex<Vec<char>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler<char> = {
            let seen = seen.clone();
            Arc::new(move |e: &Event<char>| seen.lock().unwrap().push(e.value))
        };
        (handler, seen)
    }

    #[test]
    fn out_of_order_events() {
        let monitors = Monitors::new("test");
        let (handler, seen) = recorder();
        monitors.add(&handler);

        assert!(monitors.notify(&event(100., 'A', &[100.])));
        assert!(monitors.notify(&event(101., 'B', &[101.])));
        assert!(!monitors.notify(&event(102., 'C', &[99.])));

        assert_eq!(vec!['A', 'B'], *seen.lock().unwrap());
    }

    #[test]
    fn stale_after_write() {
        let monitors = Monitors::new("test");
        let (handler, seen) = recorder();
        monitors.add(&handler);

        monitors.note_write(200.);
        assert!(monitors.is_stale(&event(201., 'A', &[150.])));
        assert!(!monitors.notify(&event(201., 'A', &[150.])));
        assert!(monitors.notify(&event(202., 'B', &[150., 200.])));

        assert_eq!(vec!['B'], *seen.lock().unwrap());
    }

    #[test]
    fn add_is_idempotent() {
        let monitors = Monitors::<char>::new("test");
        let (handler, seen) = recorder();
        let (other, _) = recorder();

        assert!(monitors.add(&handler));
        assert!(!monitors.add(&handler));
        assert!(monitors.add(&other));
        assert_eq!(2, monitors.len());

        monitors.notify(&event(1., 'A', &[1.]));
        assert_eq!(vec!['A'], *seen.lock().unwrap());

        assert!(monitors.remove(&handler));
        assert!(!monitors.remove(&handler));
        assert_eq!(1, monitors.len());
        assert!(monitors.remove(&other));
        assert!(monitors.is_empty());
    }

    #[test]
    fn panicking_handler_is_contained() {
        let monitors = Monitors::<char>::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let bad: Handler<char> = Arc::new(|_: &Event<char>| panic!("handler failure"));
        let good: Handler<char> = {
            let calls = calls.clone();
            Arc::new(move |_: &Event<char>| {
                calls.fetch_add(1, Ordering::Relaxed);
            })
        };
        monitors.add(&bad);
        monitors.add(&good);

        assert!(monitors.notify(&event(1., 'A', &[1.])));
        assert!(monitors.notify(&event(2., 'B', &[2.])));
        assert_eq!(2, calls.load(Ordering::Relaxed));
    }

    #[test]
    fn events_without_ancestry_are_delivered() {
        let monitors = Monitors::new("test");
        let (handler, seen) = recorder();
        monitors.add(&handler);
        monitors.notify(&event(5., 'A', &[5.]));
        monitors.notify(&event(1., 'B', &[]));
        assert_eq!(vec!['A', 'B'], *seen.lock().unwrap());
    }
}
