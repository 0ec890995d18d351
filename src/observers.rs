use std::sync::{Arc, Mutex, Weak};

use slab::Slab;

/// Serial observer registry.
///
/// Registration returns a [`Subscription`] whose lifetime controls the
/// subscription: dropping it unsubscribes. Notifications dispatch one by
/// one on the notifying thread, which for kernel events is the simulation
/// thread, or the mutator thread while the simulation is stopped.
///
/// Callbacks must not subscribe or unsubscribe from within a
/// notification.
pub struct Observers<E> {
    inner: Arc<Mutex<Slab<Callback<E>>>>,
}

type Callback<E> = Box<dyn FnMut(&E) + Send>;

impl<E> Observers<E> {
    pub fn new() -> Observers<E> {
        Observers {
            inner: Arc::new(Mutex::new(Slab::new())),
        }
    }

    /// Registers `observer` and returns the handle keeping it alive.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: FnMut(&E) + Send + 'static,
        E: 'static,
    {
        let key = self.inner.lock().unwrap().insert(Box::new(observer));
        let slab = Arc::downgrade(&self.inner);

        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(slab) = Weak::upgrade(&slab) {
                    let _ = slab.lock().unwrap().try_remove(key);
                }
            })),
        }
    }

    /// Notifies every live observer, in registration order.
    pub fn notify(&self, event: &E) {
        let mut slab = self.inner.lock().unwrap();
        for (_, observer) in slab.iter_mut() {
            observer(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Clone for Observers<E> {
    fn clone(&self) -> Observers<E> {
        Observers {
            inner: self.inner.clone(),
        }
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Observers<E> {
        Observers::new()
    }
}

/// Handle returned by [`Observers::subscribe`].
///
/// Dropping it removes the observer. Call [`forget`](Subscription::forget)
/// to keep the observer registered for the life of the registry.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Leaves the observer registered forever.
    pub fn forget(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
