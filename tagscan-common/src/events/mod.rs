//! Event types for the tagscan event system
//!
//! Provides shared event definitions, the EventBus, and the ChangeNotifier seam
//! the nearby-tags engine publishes through.

mod nearby_types;

pub use nearby_types::NearbyChangeTrigger;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// tagscan event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag so they
/// can be forwarded to UI observers unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NearbyEvent {
    /// The nearby-tag collection changed
    ///
    /// Fires at most once per sighting batch and once per lookup-driven
    /// insertion. Observers re-read the collection; the event carries counts
    /// only.
    ///
    /// Triggers:
    /// - UI: Refresh the nearby list
    /// - Notifications: Announce newly found tags
    NearbyTagsChanged {
        /// Why the collection changed
        trigger: NearbyChangeTrigger,
        /// Tags visible under the current display mode
        visible_count: usize,
        /// Assigned tags in the collection
        assigned_count: usize,
        /// When the change was applied
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Display mode flipped between all tags and assigned-only
    DisplayModeChanged {
        /// Whether unassigned placeholders are now shown
        show_unassigned: bool,
        /// When the mode changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// New proximity UUIDs were added to the monitored region set
    RegionsAdded {
        /// UUIDs newly registered (already-known ones are not repeated)
        uuids: Vec<Uuid>,
        /// When the regions were added
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl NearbyEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &str {
        match self {
            NearbyEvent::NearbyTagsChanged { .. } => "NearbyTagsChanged",
            NearbyEvent::DisplayModeChanged { .. } => "DisplayModeChanged",
            NearbyEvent::RegionsAdded { .. } => "RegionsAdded",
        }
    }
}

/// Fire-and-forget sink for nearby events
///
/// No acknowledgement and no backpressure: implementations must not block the
/// caller, which may be holding up sighting ingestion. `publish` runs while the
/// engine holds its collection lock, so events arrive in the order the changes
/// were applied; implementations must not call back into the engine.
pub trait ChangeNotifier: Send + Sync {
    fn publish(&self, event: NearbyEvent);
}

/// Plain closures work as notifiers
impl<F> ChangeNotifier for F
where
    F: Fn(NearbyEvent) + Send + Sync,
{
    fn publish(&self, event: NearbyEvent) {
        self(event)
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use tagscan_common::events::{EventBus, NearbyEvent};
/// use std::sync::Arc;
///
/// let event_bus = Arc::new(EventBus::new(100));
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit(NearbyEvent::DisplayModeChanged {
///     show_unassigned: true,
///     timestamp: chrono::Utc::now(),
/// }).ok();
///
/// let received = rx.try_recv().unwrap();
/// assert_eq!(received.event_type(), "DisplayModeChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NearbyEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<NearbyEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: NearbyEvent,
    ) -> Result<usize, broadcast::error::SendError<NearbyEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: NearbyEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl ChangeNotifier for EventBus {
    fn publish(&self, event: NearbyEvent) {
        self.emit_lossy(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn changed(trigger: NearbyChangeTrigger) -> NearbyEvent {
        NearbyEvent::NearbyTagsChanged {
            trigger,
            visible_count: 1,
            assigned_count: 1,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        assert!(bus.emit(changed(NearbyChangeTrigger::Reset)).is_err());
        // lossy variant swallows the same condition
        bus.emit_lossy(changed(NearbyChangeTrigger::Reset));
    }

    #[test]
    fn test_eventbus_multiple_subscribers() {
        let bus = Arc::new(EventBus::new(10));
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(changed(NearbyChangeTrigger::LookupCompleted));

        assert_eq!(rx1.try_recv().unwrap().event_type(), "NearbyTagsChanged");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "NearbyTagsChanged");
    }

    #[test]
    fn test_eventbus_lossy_on_full_channel() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..10 {
            bus.emit_lossy(changed(NearbyChangeTrigger::SightingBatch));
        }
        // Oldest events were dropped; receiver reports the lag
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_closure_notifier() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let notifier: Arc<dyn ChangeNotifier> = Arc::new(move |_event: NearbyEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        notifier.publish(changed(NearbyChangeTrigger::Reset));
        notifier.publish(changed(NearbyChangeTrigger::Reset));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_event_serialization_tagged() {
        let event = changed(NearbyChangeTrigger::ManualInsert);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"NearbyTagsChanged\""));
        assert!(json.contains("\"trigger\":\"ManualInsert\""));

        let back: NearbyEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_type_method() {
        let events = vec![
            (changed(NearbyChangeTrigger::Reset), "NearbyTagsChanged"),
            (
                NearbyEvent::DisplayModeChanged {
                    show_unassigned: false,
                    timestamp: chrono::Utc::now(),
                },
                "DisplayModeChanged",
            ),
            (
                NearbyEvent::RegionsAdded {
                    uuids: vec![Uuid::new_v4()],
                    timestamp: chrono::Utc::now(),
                },
                "RegionsAdded",
            ),
        ];

        for (event, expected_type) in events {
            assert_eq!(event.event_type(), expected_type);
        }
    }
}
