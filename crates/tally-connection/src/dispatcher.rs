//! Per-connection publish/subscribe.
//!
//! Listeners are grouped by key and run synchronously, in subscription
//! order, on the publishing task. A panicking listener is caught and
//! logged; the remaining listeners still run and the publisher never
//! sees the panic.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Handle returned by [`EventDispatcher::subscribe`], used to remove the
/// listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A shared listener callback.
pub type Listener<P> = Arc<dyn Fn(&P) + Send + Sync>;

struct Registry<K, P> {
    next_id: u64,
    listeners: HashMap<K, Vec<(SubscriptionId, Listener<P>)>>,
}

/// Fan-out of payloads of type `P` to listeners keyed by `K`.
///
/// No lock is held while listeners run, so a listener may itself
/// publish, subscribe, or unsubscribe. Changes made during a publish take
/// effect from the next publish on.
pub struct EventDispatcher<K, P> {
    registry: Mutex<Registry<K, P>>,
}

impl<K, P> EventDispatcher<K, P>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                listeners: HashMap::new(),
            }),
        }
    }

    /// Registers `listener` for `key`.
    pub fn subscribe<F>(&self, key: K, listener: F) -> SubscriptionId
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.subscribe_shared(key, Arc::new(listener))
    }

    /// Registers an already shared listener, e.g. one callback subscribed
    /// under several keys.
    pub fn subscribe_shared(&self, key: K, listener: Listener<P>) -> SubscriptionId {
        let mut registry = self.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.entry(key).or_default().push((id, listener));
        id
    }

    /// Removes one listener. Returns `false` if it wasn't registered
    /// under `key`.
    pub fn unsubscribe(&self, key: &K, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let Some(list) = registry.listeners.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        let removed = list.len() != before;
        if list.is_empty() {
            registry.listeners.remove(key);
        }
        removed
    }

    /// Delivers `payload` to every listener registered for `key`.
    ///
    /// Returns how many listeners ran to completion.
    pub fn publish(&self, key: &K, payload: &P) -> usize {
        let snapshot: Vec<Listener<P>> = match self.lock().listeners.get(key) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::error!(
                        panic = panic_message(&*panic),
                        "event listener panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.lock().listeners.clear();
    }

    /// Number of listeners registered for `key`.
    pub fn listener_count(&self, key: &K) -> usize {
        self.lock().listeners.get(key).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().listeners.is_empty()
    }

    // A listener that panicked can't have poisoned the lock (it never
    // runs under it), but recover anyway rather than propagate.
    fn lock(&self) -> MutexGuard<'_, Registry<K, P>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, P> Default for EventDispatcher<K, P>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
