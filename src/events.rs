//! Population event surface.
//!
//! Events are raised between operations, never from inside a parallel
//! pass. Subscribers hold a [`Subscription`] handle; dropping the handle
//! unsubscribes, so observer lifetime is tied to scope instead of to a
//! manual remove call.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PopulationEvent {
    /// The population finished a generation and rolled its bookkeeping.
    NewGeneration,
    ParametersChanged,
    FitnessOperationChanged,
    FitnessComparatorChanged,
    ScaledFitnessPrototypeChanged,
}

/// Snapshot delivered to subscribers. Carried by value because events fire
/// while the population is mid-mutation; observers that need more query
/// the population between operations.
#[derive(Clone, Debug)]
pub struct EventData {
    pub event: PopulationEvent,
    pub generation: usize,
    pub population_size: usize,
}

type Callback = Box<dyn Fn(&EventData) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: FxHashMap<PopulationEvent, Vec<(u64, Callback)>>,
}

/// Dispatches population events to registered subscribers.
pub struct EventManager {
    registry: Arc<Mutex<Registry>>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventManager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Register a subscriber. The returned handle unsubscribes on drop.
    #[must_use = "dropping the subscription immediately unsubscribes"]
    pub fn subscribe(
        &self,
        event: PopulationEvent,
        callback: impl Fn(&EventData) + Send + Sync + 'static,
    ) -> Subscription {
        let mut registry = self.registry.lock().expect("event registry poisoned");
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .subscribers
            .entry(event)
            .or_default()
            .push((id, Box::new(callback)));

        Subscription {
            registry: Arc::downgrade(&self.registry),
            event,
            id,
        }
    }

    pub fn raise(&self, data: EventData) {
        let registry = self.registry.lock().expect("event registry poisoned");
        if let Some(subscribers) = registry.subscribers.get(&data.event) {
            for (_, callback) in subscribers {
                callback(&data);
            }
        }
    }

    pub fn subscriber_count(&self, event: PopulationEvent) -> usize {
        self.registry
            .lock()
            .expect("event registry poisoned")
            .subscribers
            .get(&event)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock().expect("event registry poisoned");
        let total: usize = registry.subscribers.values().map(Vec::len).sum();
        f.debug_struct("EventManager")
            .field("subscribers", &total)
            .finish()
    }
}

/// Scoped subscriber handle; removes its callback when dropped.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    event: PopulationEvent,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut registry) = registry.lock() {
                if let Some(subscribers) = registry.subscribers.get_mut(&self.event) {
                    subscribers.retain(|(id, _)| *id != self.id);
                }
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}
