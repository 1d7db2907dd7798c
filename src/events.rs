use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the spotcam system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SpotcamEvent {
    /// A vehicle arrived at the monitored spot
    VehicleEntered {
        distance_mm: u32,
        timestamp: SystemTime,
    },
    /// The vehicle left the monitored spot
    VehicleExited {
        distance_mm: u32,
        timestamp: SystemTime,
    },
    /// A capture burst has started
    BurstStarted { label: String, burst_id: String },
    /// A capture burst has finished or was cut short
    BurstCompleted {
        label: String,
        burst_id: String,
        attempts: u32,
    },
    /// A capture was taken and accepted by the vision endpoint
    CaptureSent { label: String },
    /// The camera produced no image for a capture attempt
    CaptureFailed { label: String },
    /// A captured image could not be delivered
    SendFailed { label: String, reason: String },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl SpotcamEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            SpotcamEvent::VehicleEntered { timestamp, .. } => *timestamp,
            SpotcamEvent::VehicleExited { timestamp, .. } => *timestamp,
            SpotcamEvent::BurstStarted { .. } => SystemTime::now(),
            SpotcamEvent::BurstCompleted { .. } => SystemTime::now(),
            SpotcamEvent::CaptureSent { .. } => SystemTime::now(),
            SpotcamEvent::CaptureFailed { .. } => SystemTime::now(),
            SpotcamEvent::SendFailed { .. } => SystemTime::now(),
            SpotcamEvent::SystemError { .. } => SystemTime::now(),
            SpotcamEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SpotcamEvent::VehicleEntered { distance_mm, .. } => {
                format!("Vehicle entered (distance: {}mm)", distance_mm)
            }
            SpotcamEvent::VehicleExited { distance_mm, .. } => {
                format!("Vehicle exited (distance: {}mm)", distance_mm)
            }
            SpotcamEvent::BurstStarted { label, burst_id } => {
                format!("Burst started: {} ({})", label, burst_id)
            }
            SpotcamEvent::BurstCompleted {
                label,
                burst_id,
                attempts,
            } => {
                format!(
                    "Burst completed: {} ({}, {} attempts)",
                    label, burst_id, attempts
                )
            }
            SpotcamEvent::CaptureSent { label } => format!("{} capture sent", label),
            SpotcamEvent::CaptureFailed { label } => format!("{} capture failed", label),
            SpotcamEvent::SendFailed { label, reason } => {
                format!("{} capture send failed: {}", label, reason)
            }
            SpotcamEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            SpotcamEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SpotcamEvent::VehicleEntered { .. } => "vehicle_entered",
            SpotcamEvent::VehicleExited { .. } => "vehicle_exited",
            SpotcamEvent::BurstStarted { .. } => "burst_started",
            SpotcamEvent::BurstCompleted { .. } => "burst_completed",
            SpotcamEvent::CaptureSent { .. } => "capture_sent",
            SpotcamEvent::CaptureFailed { .. } => "capture_failed",
            SpotcamEvent::SendFailed { .. } => "send_failed",
            SpotcamEvent::SystemError { .. } => "system_error",
            SpotcamEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<SpotcamEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SpotcamEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers that received the event. An idle bus
    /// (no subscribers) is not an error; the event is logged and dropped.
    pub fn publish(&self, event: SpotcamEvent) -> Result<usize, EventBusError> {
        // Log important events at appropriate levels
        match &event {
            SpotcamEvent::VehicleEntered { distance_mm, .. } => {
                info!("Vehicle entry detected (distance: {}mm)", distance_mm);
            }
            SpotcamEvent::VehicleExited { distance_mm, .. } => {
                info!("Vehicle exit detected (distance: {}mm)", distance_mm);
            }
            SpotcamEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            SpotcamEvent::CaptureFailed { label } => {
                warn!("Failed to capture {} image", label);
            }
            SpotcamEvent::SendFailed { label, reason } => {
                warn!("Failed to send {} image: {}", label, reason);
            }
            SpotcamEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &SpotcamEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<SpotcamEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<SpotcamEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<SpotcamEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                    // Next event if this one doesn't match the filter
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let event = SpotcamEvent::VehicleEntered {
            distance_mm: 420,
            timestamp: SystemTime::now(),
        };

        let subscriber_count = event_bus.publish(event).unwrap();
        assert_eq!(subscriber_count, 1);

        let received_event = receiver.recv().await.unwrap();
        match received_event {
            SpotcamEvent::VehicleEntered { distance_mm, .. } => {
                assert_eq!(distance_mm, 420);
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_not_an_error() {
        let event_bus = EventBus::new(10);
        let delivered = event_bus
            .publish(SpotcamEvent::CaptureSent {
                label: "entry".to_string(),
            })
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        let event = SpotcamEvent::VehicleExited {
            distance_mm: 810,
            timestamp: SystemTime::now(),
        };

        event_bus.publish(event).unwrap();

        // Both receivers should get the event
        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let receiver = event_bus.subscribe();
        let filter = EventFilter::EventTypes(vec!["vehicle_entered", "vehicle_exited"]);
        let mut filtered_receiver = EventReceiver::new(receiver, filter, "test".to_string());

        event_bus
            .publish(SpotcamEvent::CaptureSent {
                label: "fallback".to_string(),
            })
            .unwrap();

        event_bus
            .publish(SpotcamEvent::VehicleEntered {
                distance_mm: 390,
                timestamp: SystemTime::now(),
            })
            .unwrap();

        // Only the presence event should come through
        let received = timeout(Duration::from_millis(100), filtered_receiver.recv())
            .await
            .unwrap()
            .unwrap();
        match received {
            SpotcamEvent::VehicleEntered { distance_mm, .. } => {
                assert_eq!(distance_mm, 390);
            }
            _ => panic!("Unexpected event type"),
        }
    }

    #[test]
    fn test_event_properties() {
        let event = SpotcamEvent::VehicleEntered {
            distance_mm: 444,
            timestamp: SystemTime::now(),
        };

        assert_eq!(event.event_type(), "vehicle_entered");
        assert!(event.description().contains("444"));

        let event = SpotcamEvent::SendFailed {
            label: "verification".to_string(),
            reason: "HTTP status 503".to_string(),
        };
        assert_eq!(event.event_type(), "send_failed");
        assert!(event.description().contains("503"));
    }
}
