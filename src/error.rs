use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpotcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Uplink error: {0}")]
    Uplink(#[from] UplinkError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl SpotcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors from the distance-sensor collaborator
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Failed to initialize sensor on I2C bus {bus} address {address:#04x}: {details}")]
    Init {
        bus: u8,
        address: u16,
        details: String,
    },

    #[error("Sensor read failed: {details}")]
    Read { details: String },
}

/// Errors from the still-camera collaborator
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to initialize camera: {details}")]
    Init { details: String },

    #[error("Capture failed: {details}")]
    Capture { details: String },
}

/// Errors from the outbound image uplink
#[derive(Error, Debug)]
pub enum UplinkError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Endpoint rejected capture with HTTP status {status}")]
    Status { status: u16 },
}

impl UplinkError {
    /// Whether the failure was a client-side request timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, UplinkError::Transport(e) if e.is_timeout())
    }
}

/// Errors from the broadcast event bus
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SpotcamError>;
