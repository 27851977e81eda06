//! Change-notification bus for Immich Album Watcher
//!
//! Coordinators publish album change notifications here; the service binary
//! and any automation layer subscribe. Delivery is fan-out over tokio
//! broadcast channels, one per event type, plus a MATCH_ALL channel.

use dashmap::DashMap;
use iaw_core::{Context, Event, EventData, EventType};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to notifications
///
/// Supports:
/// - Subscribing to specific event types
/// - Subscribing to all events (MATCH_ALL)
/// - Firing events to all subscribers
/// - Typed event subscriptions for type-safe event handling
pub struct EventBus {
    /// Map of event types to their broadcast senders
    listeners: DashMap<EventType, broadcast::Sender<Event<serde_json::Value>>>,
    /// Special sender for MATCH_ALL subscribers
    match_all_sender: broadcast::Sender<Event<serde_json::Value>>,
    /// Channel capacity
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            match_all_sender,
            capacity,
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe(
        &self,
        event_type: impl Into<EventType>,
    ) -> broadcast::Receiver<Event<serde_json::Value>> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        if event_type.is_match_all() {
            return self.match_all_sender.subscribe();
        }

        self.listeners
            .entry(event_type)
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    /// Subscribe to a typed event, receiving parsed data
    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(
        &self,
    ) -> TypedEventReceiver<T> {
        TypedEventReceiver::new(self.subscribe(T::event_type()))
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event<serde_json::Value>> {
        self.match_all_sender.subscribe()
    }

    /// Fire an event to all subscribers
    ///
    /// The event will be delivered to:
    /// 1. All subscribers of the specific event type
    /// 2. All MATCH_ALL subscribers
    pub fn fire(&self, event: Event<serde_json::Value>) {
        debug!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.listeners.get(&event.event_type) {
            // No active receivers is not an error
            let _ = sender.send(event.clone());
        }

        let _ = self.match_all_sender.send(event);
    }

    /// Fire `data` under an explicit event type
    ///
    /// Used when one payload goes out under several event types.
    pub fn fire_as<T: Serialize>(
        &self,
        event_type: impl Into<EventType>,
        data: &T,
        context: Context,
    ) {
        let event_type = event_type.into();
        match serde_json::to_value(data) {
            Ok(json) => self.fire(Event::new(event_type, json, context)),
            Err(e) => warn!(event_type = %event_type, error = %e, "Dropping unserializable event"),
        }
    }

    /// Fire a typed event
    pub fn fire_typed<T: EventData + Serialize>(&self, data: T, context: Context) {
        self.fire_as(T::event_type(), &data, context);
    }

    /// Get the number of active event type subscriptions
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A receiver for typed events
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event<serde_json::Value>>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedEventReceiver<T> {
    fn new(rx: broadcast::Receiver<Event<serde_json::Value>>) -> Self {
        Self {
            rx,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Receive the next typed event
    ///
    /// Events whose data does not deserialize as `T` are skipped.
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if let Ok(data) = serde_json::from_value::<T>(event.data.clone()) {
                return Ok(Event {
                    event_type: event.event_type,
                    data,
                    time_fired: event.time_fired,
                    context: event.context,
                });
            }
        }
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
