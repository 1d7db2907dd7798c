use crate::config::{DeviceConfig, UplinkConfig};
use crate::error::UplinkError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

/// Outbound transport for captured images
#[async_trait]
pub trait ImageTransport: Send + Sync {
    /// Deliver one encoded image to the vision endpoint
    async fn send_image(
        &self,
        image: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), UplinkError>;
}

/// HTTP client posting captures to the remote vision endpoint
///
/// One multipart POST per capture: the JPEG plus the station identifier,
/// spot number, and an ISO-8601 timestamp. The request timeout is the only
/// bounded wait the trigger loops are exposed to.
pub struct VisionUplink {
    client: reqwest::Client,
    url: String,
    station_id: String,
    spot_number: u32,
}

impl VisionUplink {
    pub fn new(config: &UplinkConfig, device: &DeviceConfig) -> Result<Self, UplinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let url = config.url();
        info!("Vision uplink configured: {}", url);

        Ok(Self {
            client,
            url,
            station_id: device.station_id.clone(),
            spot_number: device.spot_number,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ImageTransport for VisionUplink {
    async fn send_image(
        &self,
        image: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), UplinkError> {
        let part = reqwest::multipart::Part::bytes(image)
            .file_name("capture.jpg")
            .mime_str("image/jpeg")?;

        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("station_id", self.station_id.clone())
            .text("spot_number", self.spot_number.to_string())
            .text("timestamp", timestamp.to_rfc3339());

        let response = self.client.post(&self.url).multipart(form).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::OK {
            debug!("Image sent successfully (spot #{})", self.spot_number);
            Ok(())
        } else {
            Err(UplinkError::Status {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpotcamConfig;

    #[test]
    fn test_url_built_from_config() {
        let config = SpotcamConfig::default();
        let uplink = VisionUplink::new(&config.uplink, &config.device).unwrap();
        assert_eq!(uplink.url(), "http://127.0.0.1:8000/receive_image");
    }

    #[test]
    fn test_url_respects_protocol_and_port() {
        let mut config = SpotcamConfig::default();
        config.uplink.protocol = "https".to_string();
        config.uplink.host = "vision.example.net".to_string();
        config.uplink.port = 8443;
        config.uplink.endpoint = "/ingest".to_string();

        let uplink = VisionUplink::new(&config.uplink, &config.device).unwrap();
        assert_eq!(uplink.url(), "https://vision.example.net:8443/ingest");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_transport_error() {
        let mut config = SpotcamConfig::default();
        // Reserved TEST-NET address; nothing listens there
        config.uplink.host = "192.0.2.1".to_string();
        config.uplink.timeout_seconds = 1;

        let uplink = VisionUplink::new(&config.uplink, &config.device).unwrap();
        let err = uplink
            .send_image(vec![0xFF, 0xD8, 0xFF, 0xD9], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, UplinkError::Transport(_)));
    }
}
