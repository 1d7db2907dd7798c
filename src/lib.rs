pub mod camera;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod presence;
pub mod sensor;
pub mod smoothing;
pub mod uplink;

pub use camera::{camera_from_config, DisabledCamera, SimulatedCamera, StillCamera};
pub use config::SpotcamConfig;
pub use dispatch::{CaptureDispatcher, CaptureOutcome, Dispatch};
pub use error::{CameraError, Result, SensorError, SpotcamError, UplinkError};
pub use events::{EventBus, EventFilter, EventReceiver, SpotcamEvent};
pub use orchestrator::{ShutdownReason, TriggerOrchestrator};
pub use presence::{PresenceDetector, PresenceEdge, PresenceState};
pub use sensor::{RangeSensor, SensorHandle, SimulatedRangeSensor};
pub use smoothing::{DistanceSmoother, Sample};
pub use uplink::{ImageTransport, VisionUplink};
