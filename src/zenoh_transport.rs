//! Zenoh transport binding
//!
//! Feature-gated binding of the command and telemetry boundaries to Zenoh:
//! a subscriber delivering inbound command envelopes and a publisher
//! implementing the telemetry trait. The rest of the crate never sees Zenoh
//! types; disable the `zenoh-integration` feature and the daemon falls back
//! to stdin/stdout transports.

#[cfg(feature = "zenoh-integration")]
use {
    crate::telemetry::{TelemetryPublisher, TelemetrySnapshot},
    anyhow::{anyhow, Context},
    async_trait::async_trait,
    std::sync::Arc,
    tracing::{debug, info},
    zenoh::{
        handlers::FifoChannelHandler, pubsub::Publisher, pubsub::Subscriber, sample::Sample,
        Session,
    },
};

/// Topic a car's inbound command envelopes arrive on
pub fn command_topic(device_id: &str) -> String {
    format!("derby/{}/command", device_id)
}

/// Topic a car's telemetry snapshots are published to
pub fn telemetry_topic(device_id: &str, sensor_topic: &str) -> String {
    format!("derby/{}/events/{}", device_id, sensor_topic)
}

/// Zenoh-backed telemetry publisher
#[cfg(feature = "zenoh-integration")]
pub struct ZenohTelemetry {
    publisher: Arc<Publisher<'static>>,
    _session: Arc<Session>, // Keep session alive
}

#[cfg(feature = "zenoh-integration")]
impl ZenohTelemetry {
    /// Declare a telemetry publisher on an open session
    pub async fn new(session: Arc<Session>, topic: &str) -> anyhow::Result<Self> {
        let publisher = session
            .declare_publisher(topic.to_string())
            .await
            .map_err(|e| anyhow!("Failed to create telemetry publisher: {}", e))?;

        info!("Telemetry publisher created on '{}'", topic);
        Ok(Self {
            publisher: Arc::new(publisher),
            _session: session,
        })
    }
}

#[cfg(feature = "zenoh-integration")]
#[async_trait]
impl TelemetryPublisher for ZenohTelemetry {
    async fn publish(&self, snapshot: &TelemetrySnapshot) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(snapshot).context("Failed to serialize snapshot")?;

        self.publisher
            .put(payload)
            .await
            .map_err(|e| anyhow!("Failed to publish telemetry: {}", e))?;

        debug!("Published telemetry snapshot");
        Ok(())
    }
}

/// Zenoh subscription delivering inbound command envelope payloads
#[cfg(feature = "zenoh-integration")]
pub struct ZenohCommandSource {
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
    _session: Arc<Session>,
}

#[cfg(feature = "zenoh-integration")]
impl ZenohCommandSource {
    pub async fn new(session: Arc<Session>, topic: &str) -> anyhow::Result<Self> {
        let subscriber = session
            .declare_subscriber(topic.to_string())
            .await
            .map_err(|e| anyhow!("Failed to create command subscriber: {}", e))?;

        info!("Command subscriber created on '{}'", topic);
        Ok(Self {
            subscriber,
            _session: session,
        })
    }

    /// Wait for the next inbound envelope payload
    pub async fn recv(&self) -> anyhow::Result<Vec<u8>> {
        let sample = self
            .subscriber
            .recv_async()
            .await
            .map_err(|e| anyhow!("Command subscription closed: {}", e))?;
        Ok(sample.payload().to_bytes().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_scoped_by_device() {
        assert_eq!(command_topic("car-7-device"), "derby/car-7-device/command");
        assert_eq!(
            telemetry_topic("car-7-device", "sensor-data"),
            "derby/car-7-device/events/sensor-data"
        );
    }
}
