use crate::config::SensorConfig;
use crate::error::SensorError;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Interface to the distance sensor collaborator
///
/// Implementations must tolerate absent hardware by failing `initialize`
/// rather than panicking; a failed read returns `None` and the caller skips
/// that sampling cycle.
#[async_trait]
pub trait RangeSensor: Send {
    async fn initialize(&mut self) -> Result<(), SensorError>;

    /// Read the current distance in millimeters, or `None` on a failed read
    async fn read_distance(&mut self) -> Option<u32>;

    async fn close(&mut self);
}

/// Capability-checked handle to the range sensor, selected once at startup
///
/// `Disabled` stands in when the sensor is turned off in configuration or
/// its driver failed to come up; callers check `is_active()` instead of
/// sprinkling availability conditionals through the sampling logic.
pub enum SensorHandle {
    Active(Box<dyn RangeSensor>),
    Disabled,
}

impl SensorHandle {
    /// Select and initialize the sensor described by the configuration
    pub async fn from_config(config: &SensorConfig) -> Self {
        if !config.enabled {
            info!("Range sensor disabled by configuration");
            return SensorHandle::Disabled;
        }

        let mut sensor: Box<dyn RangeSensor> = if config.simulate {
            Box::new(SimulatedRangeSensor::parked_cycle(config))
        } else {
            // No hardware driver is linked into this build; without the
            // simulator the process runs in fallback mode.
            warn!(
                "No range sensor driver available (I2C bus {}, address {:#04x}), \
                 running without presence sensing",
                config.i2c_bus, config.i2c_address
            );
            return SensorHandle::Disabled;
        };

        match sensor.initialize().await {
            Ok(()) => SensorHandle::Active(sensor),
            Err(e) => {
                warn!("Failed to initialize range sensor: {}", e);
                SensorHandle::Disabled
            }
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SensorHandle::Active(_))
    }

    /// Read one distance sample; `None` when disabled or on a failed read
    pub async fn read_distance(&mut self) -> Option<u32> {
        match self {
            SensorHandle::Active(sensor) => sensor.read_distance().await,
            SensorHandle::Disabled => None,
        }
    }

    pub async fn close(&mut self) {
        if let SensorHandle::Active(sensor) = self {
            sensor.close().await;
        }
    }
}

/// Synthetic range sensor cycling through a parked-vehicle scenario
///
/// Replays a fixed pattern of distances: vacant spot, an arrival, a parked
/// stretch, then a departure. Lets the full trigger pipeline run on a dev
/// machine with no hardware attached.
pub struct SimulatedRangeSensor {
    pattern: Vec<u32>,
    cursor: usize,
}

impl SimulatedRangeSensor {
    pub fn new(pattern: Vec<u32>) -> Self {
        Self { pattern, cursor: 0 }
    }

    /// A vacancy/arrival/departure cycle sized to the configured thresholds
    pub fn parked_cycle(config: &SensorConfig) -> Self {
        let vacant = config.absent_mm + 200;
        let occupied = config.present_mm.saturating_sub(150).max(1);
        let mut pattern = Vec::new();
        pattern.extend(std::iter::repeat(vacant).take(20));
        pattern.extend(std::iter::repeat(occupied).take(60));
        pattern.extend(std::iter::repeat(vacant).take(20));
        Self::new(pattern)
    }
}

#[async_trait]
impl RangeSensor for SimulatedRangeSensor {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        info!(
            "Simulated range sensor initialized ({} samples per cycle)",
            self.pattern.len()
        );
        Ok(())
    }

    async fn read_distance(&mut self) -> Option<u32> {
        let distance = self.pattern[self.cursor % self.pattern.len()];
        self.cursor += 1;
        debug!("Simulated distance reading: {}mm", distance);
        Some(distance)
    }

    async fn close(&mut self) {
        debug!("Simulated range sensor closed");
    }
}

/// Test sensor replaying an explicit script of readings, including failures
#[cfg(test)]
pub struct ScriptedRangeSensor {
    readings: std::collections::VecDeque<Option<u32>>,
    /// Reading repeated once the script is exhausted
    tail: Option<u32>,
}

#[cfg(test)]
impl ScriptedRangeSensor {
    pub fn new<I: IntoIterator<Item = Option<u32>>>(readings: I, tail: Option<u32>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            tail,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl RangeSensor for ScriptedRangeSensor {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    async fn read_distance(&mut self) -> Option<u32> {
        self.readings.pop_front().unwrap_or(self.tail)
    }

    async fn close(&mut self) {}
}
