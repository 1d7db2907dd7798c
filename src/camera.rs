use crate::config::CameraConfig;
use crate::error::CameraError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Interface to the still-camera collaborator
///
/// `capture_image` returns the encoded image bytes, or `None` when the
/// capture failed; the caller abandons that attempt without sending.
#[async_trait]
pub trait StillCamera: Send + Sync {
    async fn initialize(&self) -> Result<(), CameraError>;

    /// Capture one encoded still image (JPEG bytes)
    async fn capture_image(&self) -> Option<Vec<u8>>;

    async fn close(&self);
}

/// Select and initialize the camera described by the configuration
///
/// With no hardware driver linked into the build, `simulate = true` yields
/// a synthetic-image camera and `simulate = false` a disabled one whose
/// captures always fail (logged once here, per-attempt downstream).
pub async fn camera_from_config(config: &CameraConfig) -> Arc<dyn StillCamera> {
    let camera: Arc<dyn StillCamera> = if config.simulate {
        Arc::new(SimulatedCamera::new(config.clone()))
    } else {
        warn!("No camera driver available, captures will fail until one is attached");
        Arc::new(DisabledCamera)
    };

    if let Err(e) = camera.initialize().await {
        warn!("Failed to initialize camera: {}", e);
    }
    camera
}

/// Synthetic camera producing a placeholder JPEG envelope
///
/// The payload is not a decodable photograph, just well-formed enough
/// (SOI/APP0/COM/EOI markers) for the uplink and endpoint plumbing to treat
/// it as a JPEG of plausible size.
pub struct SimulatedCamera {
    config: CameraConfig,
}

impl SimulatedCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }

    fn synthetic_jpeg(&self) -> Vec<u8> {
        let (width, height) = self.config.resolution;
        let comment = format!("spotcam simulated capture {}x{}", width, height);

        let mut image = Vec::with_capacity(2048);
        // SOI + JFIF APP0
        image.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]);
        image.extend_from_slice(b"JFIF\0");
        image.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
        // COM segment carrying the simulation note
        let com_len = (comment.len() + 2) as u16;
        image.extend_from_slice(&[0xFF, 0xFE]);
        image.extend_from_slice(&com_len.to_be_bytes());
        image.extend_from_slice(comment.as_bytes());
        // Filler entropy-free payload, then EOI
        image.resize(image.len() + 1024, 0x00);
        image.extend_from_slice(&[0xFF, 0xD9]);
        image
    }
}

#[async_trait]
impl StillCamera for SimulatedCamera {
    async fn initialize(&self) -> Result<(), CameraError> {
        info!(
            "Simulated camera initialized ({}x{}, rotation {}, quality {})",
            self.config.resolution.0,
            self.config.resolution.1,
            self.config.rotation,
            self.config.quality
        );
        Ok(())
    }

    async fn capture_image(&self) -> Option<Vec<u8>> {
        let image = self.synthetic_jpeg();
        debug!("Simulated capture produced {} bytes", image.len());
        Some(image)
    }

    async fn close(&self) {
        debug!("Simulated camera closed");
    }
}

/// Camera stand-in used when no driver is available; every capture fails
pub struct DisabledCamera;

#[async_trait]
impl StillCamera for DisabledCamera {
    async fn initialize(&self) -> Result<(), CameraError> {
        Ok(())
    }

    async fn capture_image(&self) -> Option<Vec<u8>> {
        None
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpotcamConfig;

    #[tokio::test]
    async fn test_simulated_capture_is_jpeg_shaped() {
        let camera = SimulatedCamera::new(SpotcamConfig::default().camera);
        camera.initialize().await.unwrap();

        let image = camera.capture_image().await.unwrap();
        assert_eq!(&image[..2], &[0xFF, 0xD8], "missing SOI marker");
        assert_eq!(&image[image.len() - 2..], &[0xFF, 0xD9], "missing EOI marker");
        assert!(image.len() > 1024);
    }

    #[tokio::test]
    async fn test_disabled_camera_never_captures() {
        let camera = DisabledCamera;
        camera.initialize().await.unwrap();
        assert!(camera.capture_image().await.is_none());
    }

    #[tokio::test]
    async fn test_selection_honors_simulate_flag() {
        let mut config = SpotcamConfig::default().camera;
        config.simulate = true;
        let camera = camera_from_config(&config).await;
        assert!(camera.capture_image().await.is_some());

        config.simulate = false;
        let camera = camera_from_config(&config).await;
        assert!(camera.capture_image().await.is_none());
    }
}
