//! Session change broadcasting.
//!
//! The EventBus fans [`SessionEvent`]s out to every interested consumer
//! (the navigation layer, the daemon's `watch` command, tests) from the
//! single session manager that produces them.
//!
//! # Example
//!
//! ```rust
//! use appshell_core::event_bus::EventBus;
//! use appshell_core::session::SessionEvent;
//!
//! let event_bus = EventBus::new("instance-1");
//! let _rx = event_bus.subscribe();
//!
//! assert_eq!(event_bus.emit(SessionEvent::Disposed), 1);
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::SessionEvent;

/// Events beyond this many unread cause slow subscribers to lag.
const DEFAULT_CAPACITY: usize = 256;

/// A session event stamped with the process instance that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEvent {
    pub instance_id: String,
    #[serde(flatten)]
    pub event: SessionEvent,
}

pub struct EventBus {
    instance_id: String,
    sender: broadcast::Sender<BroadcastEvent>,
}

impl EventBus {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self::with_capacity(instance_id, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(instance_id: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            instance_id: instance_id.into(),
            sender,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it; with none the
    /// event is dropped.
    pub fn emit(&self, event: SessionEvent) -> usize {
        log::debug!("session event: {:?}", event);
        let event = BroadcastEvent {
            instance_id: self.instance_id.clone(),
            event,
        };
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to all future events. Past events are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SignOutReason;
    use serde_json::json;

    mod broadcast_event {
        use super::*;

        #[test]
        fn serializes_flat_with_kind() {
            let event = BroadcastEvent {
                instance_id: "i1".into(),
                event: SessionEvent::SignedIn {
                    user_id: "u1".into(),
                },
            };
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(
                value,
                json!({"instanceId": "i1", "kind": "signedIn", "userId": "u1"})
            );
        }

        #[test]
        fn deserializes_flat_form() {
            let event: BroadcastEvent = serde_json::from_value(
                json!({"instanceId": "i2", "kind": "signedOut", "reason": "invalidated"}),
            )
            .unwrap();
            assert_eq!(event.instance_id, "i2");
            assert_eq!(
                event.event,
                SessionEvent::SignedOut {
                    reason: SignOutReason::Invalidated
                }
            );
        }
    }

    mod event_bus {
        use super::*;

        #[test]
        fn new_has_no_subscribers() {
            let bus = EventBus::new("i1");
            assert_eq!(bus.subscriber_count(), 0);
            assert_eq!(bus.instance_id(), "i1");
        }

        #[test]
        fn dropped_subscriber_decrements_count() {
            let bus = EventBus::new("i1");
            let rx = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 1);

            drop(rx);
            assert_eq!(bus.subscriber_count(), 0);
        }

        #[test]
        fn emit_returns_zero_with_no_subscribers() {
            let bus = EventBus::new("i1");
            assert_eq!(bus.emit(SessionEvent::Disposed), 0);
        }

        #[tokio::test]
        async fn emit_reaches_every_subscriber() {
            let bus = EventBus::new("i1");
            let mut rx1 = bus.subscribe();
            let mut rx2 = bus.subscribe();

            let delivered = bus.emit(SessionEvent::SignedOut {
                reason: SignOutReason::Logout,
            });
            assert_eq!(delivered, 2);

            let e1 = rx1.recv().await.unwrap();
            let e2 = rx2.recv().await.unwrap();
            assert_eq!(e1, e2);
            assert_eq!(e1.instance_id, "i1");
        }

        #[tokio::test]
        async fn late_subscriber_misses_old_events() {
            let bus = EventBus::new("i1");
            let mut early = bus.subscribe();

            bus.emit(SessionEvent::Loaded {
                authenticated: false,
            });
            let mut late = bus.subscribe();
            bus.emit(SessionEvent::Disposed);

            assert!(matches!(
                early.recv().await.unwrap().event,
                SessionEvent::Loaded { .. }
            ));
            assert_eq!(early.recv().await.unwrap().event, SessionEvent::Disposed);
            assert_eq!(late.recv().await.unwrap().event, SessionEvent::Disposed);
        }

        #[tokio::test]
        async fn slow_subscriber_lags() {
            let bus = EventBus::with_capacity("i1", 1);
            let mut rx = bus.subscribe();

            bus.emit(SessionEvent::Disposed);
            bus.emit(SessionEvent::Disposed);

            assert!(matches!(
                rx.recv().await,
                Err(broadcast::error::RecvError::Lagged(1))
            ));
        }
    }
}
