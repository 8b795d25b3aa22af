use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{BusError, ConfigError};

/// Event handler callable
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Identifies one subscription, used to unsubscribe it later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Publish/subscribe bus over a fixed set of event names
///
/// The set of names is declared once at construction; subscribing to or
/// publishing an undeclared name is an error rather than a silent no-op.
/// Handlers run synchronously on the publishing thread, in subscription order.
pub struct EventBus<E> {
    handlers: Mutex<HashMap<String, Vec<(HandlerId, Handler<E>)>>>,
    next_id: AtomicU64,
}

impl<E> EventBus<E> {
    pub fn new<I, S>(event_names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut handlers = HashMap::new();
        for name in event_names {
            let name = name.into();
            if name.is_empty() {
                return Err(ConfigError::EmptyEventName);
            }
            if handlers.contains_key(&name) {
                return Err(ConfigError::DuplicateEvent(name));
            }
            handlers.insert(name, Vec::new());
        }

        Ok(Self {
            handlers: Mutex::new(handlers),
            next_id: AtomicU64::new(1),
        })
    }

    /// Append a handler to the given event's handler list
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Result<HandlerId, BusError>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.lock();
        let list = handlers
            .get_mut(event)
            .ok_or_else(|| BusError::UnknownEvent(event.to_string()))?;

        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        list.push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Remove one handler, or every handler of the event when `id` is `None`
    pub fn unsubscribe(&self, event: &str, id: Option<HandlerId>) -> Result<(), BusError> {
        let mut handlers = self.handlers.lock();
        let list = handlers
            .get_mut(event)
            .ok_or_else(|| BusError::UnknownEvent(event.to_string()))?;

        match id {
            Some(id) => {
                let index = list
                    .iter()
                    .position(|(handler_id, _)| *handler_id == id)
                    .ok_or_else(|| BusError::UnknownHandler {
                        event: event.to_string(),
                        id: id.value(),
                    })?;
                list.remove(index);
            }
            None => list.clear(),
        }

        Ok(())
    }

    /// Invoke every handler currently subscribed to `event`
    ///
    /// Handlers see a snapshot taken before dispatch: handlers added or removed
    /// by a running handler take effect on the next publish. Panics raised by a
    /// handler propagate to the caller. Returns the number of handlers invoked.
    pub fn publish(&self, event: &str, payload: &E) -> Result<usize, BusError> {
        let snapshot: Vec<Handler<E>> = {
            let handlers = self.handlers.lock();
            handlers
                .get(event)
                .ok_or_else(|| BusError::UnknownEvent(event.to_string()))?
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };

        for handler in &snapshot {
            handler(payload);
        }

        Ok(snapshot.len())
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.handlers.lock().contains_key(event)
    }

    pub fn handler_count(&self, event: &str) -> Result<usize, BusError> {
        self.handlers
            .lock()
            .get(event)
            .map(Vec::len)
            .ok_or_else(|| BusError::UnknownEvent(event.to_string()))
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.lock();
        let mut counts: Vec<(&String, usize)> =
            handlers.iter().map(|(name, list)| (name, list.len())).collect();
        counts.sort();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_declarations() {
        assert_eq!(
            EventBus::<()>::new(["start", ""]).err(),
            Some(ConfigError::EmptyEventName)
        );
        assert_eq!(
            EventBus::<()>::new(["start", "start"]).err(),
            Some(ConfigError::DuplicateEvent("start".to_string()))
        );
    }

    #[test]
    fn test_handler_ids_are_unique() {
        let bus = EventBus::<u32>::new(["a", "b"]).unwrap();
        let first = bus.subscribe("a", |_| {}).unwrap();
        let second = bus.subscribe("b", |_| {}).unwrap();
        assert_ne!(first, second);
    }
}
