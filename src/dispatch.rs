use crate::camera::StillCamera;
use crate::events::{EventBus, SpotcamEvent};
use crate::uplink::ImageTransport;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Result of one capture-and-send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Image captured and accepted by the endpoint
    Sent,
    /// Camera produced no image; nothing was sent
    CaptureFailed,
    /// Image captured but delivery failed
    SendFailed,
}

/// Capture scheduling seam; the orchestrator only sees this trait
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn capture_and_send(&self, label: &str) -> CaptureOutcome;
}

/// Captures one image and forwards it to the vision endpoint
///
/// Every failure is converted into a `CaptureOutcome` plus a log entry and
/// bus event; nothing propagates past this boundary, so the trigger loops
/// can invoke it fire-and-forget without risking their own lifetimes.
pub struct CaptureDispatcher {
    camera: Arc<dyn StillCamera>,
    transport: Arc<dyn ImageTransport>,
    event_bus: EventBus,
}

impl CaptureDispatcher {
    pub fn new(
        camera: Arc<dyn StillCamera>,
        transport: Arc<dyn ImageTransport>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            camera,
            transport,
            event_bus,
        }
    }
}

#[async_trait]
impl Dispatch for CaptureDispatcher {
    async fn capture_and_send(&self, label: &str) -> CaptureOutcome {
        let Some(image) = self.camera.capture_image().await else {
            let _ = self.event_bus.publish(SpotcamEvent::CaptureFailed {
                label: label.to_string(),
            });
            return CaptureOutcome::CaptureFailed;
        };

        debug!("Captured {} byte {} image", image.len(), label);

        match self.transport.send_image(image, Utc::now()).await {
            Ok(()) => {
                debug!("{} image sent", label);
                let _ = self.event_bus.publish(SpotcamEvent::CaptureSent {
                    label: label.to_string(),
                });
                CaptureOutcome::Sent
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    "request timeout".to_string()
                } else {
                    e.to_string()
                };
                let _ = self.event_bus.publish(SpotcamEvent::SendFailed {
                    label: label.to_string(),
                    reason,
                });
                CaptureOutcome::SendFailed
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Dispatcher double counting attempts per label
    pub struct CountingDispatch {
        pub attempts: AtomicUsize,
        pub labels: std::sync::Mutex<Vec<String>>,
        pub outcome: CaptureOutcome,
    }

    impl CountingDispatch {
        pub fn new(outcome: CaptureOutcome) -> Self {
            Self {
                attempts: AtomicUsize::new(0),
                labels: std::sync::Mutex::new(Vec::new()),
                outcome,
            }
        }

        pub fn count(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn count_for(&self, label: &str) -> usize {
            self.labels
                .lock()
                .unwrap()
                .iter()
                .filter(|l| l.as_str() == label)
                .count()
        }
    }

    #[async_trait]
    impl Dispatch for CountingDispatch {
        async fn capture_and_send(&self, label: &str) -> CaptureOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.labels.lock().unwrap().push(label.to_string());
            self.outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CameraError, UplinkError};
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCamera {
        image: Option<Vec<u8>>,
        captures: AtomicUsize,
    }

    impl FixedCamera {
        fn new(image: Option<Vec<u8>>) -> Self {
            Self {
                image,
                captures: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StillCamera for FixedCamera {
        async fn initialize(&self) -> Result<(), CameraError> {
            Ok(())
        }

        async fn capture_image(&self) -> Option<Vec<u8>> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            self.image.clone()
        }

        async fn close(&self) {}
    }

    struct FixedTransport {
        fail_status: Option<u16>,
        sends: AtomicUsize,
    }

    impl FixedTransport {
        fn new(fail_status: Option<u16>) -> Self {
            Self {
                fail_status,
                sends: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageTransport for FixedTransport {
        async fn send_image(
            &self,
            _image: Vec<u8>,
            _timestamp: DateTime<Utc>,
        ) -> Result<(), UplinkError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            match self.fail_status {
                None => Ok(()),
                Some(status) => Err(UplinkError::Status { status }),
            }
        }
    }

    #[tokio::test]
    async fn test_successful_capture_is_sent() {
        let camera = Arc::new(FixedCamera::new(Some(vec![0xFF, 0xD8, 0xFF, 0xD9])));
        let transport = Arc::new(FixedTransport::new(None));
        let dispatcher = CaptureDispatcher::new(
            camera.clone(),
            transport.clone(),
            EventBus::new(10),
        );

        let outcome = dispatcher.capture_and_send("entry").await;
        assert_eq!(outcome, CaptureOutcome::Sent);
        assert_eq!(camera.captures.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_capture_skips_send() {
        let camera = Arc::new(FixedCamera::new(None));
        let transport = Arc::new(FixedTransport::new(None));
        let dispatcher = CaptureDispatcher::new(
            camera.clone(),
            transport.clone(),
            EventBus::new(10),
        );

        let outcome = dispatcher.capture_and_send("verification").await;
        assert_eq!(outcome, CaptureOutcome::CaptureFailed);
        // No send attempt for a failed capture
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_send_reports_send_failed_without_recapture() {
        let camera = Arc::new(FixedCamera::new(Some(vec![0xFF, 0xD8, 0xFF, 0xD9])));
        let transport = Arc::new(FixedTransport::new(Some(503)));
        let dispatcher = CaptureDispatcher::new(
            camera.clone(),
            transport.clone(),
            EventBus::new(10),
        );

        let outcome = dispatcher.capture_and_send("exit").await;
        assert_eq!(outcome, CaptureOutcome::SendFailed);
        // One capture, one send; the next scheduled capture is the only retry
        assert_eq!(camera.captures.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_outcomes_surface_on_the_event_bus() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let dispatcher = CaptureDispatcher::new(
            Arc::new(FixedCamera::new(None)),
            Arc::new(FixedTransport::new(None)),
            event_bus,
        );

        dispatcher.capture_and_send("entry").await;
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "capture_failed");
    }
}
