//! Client connection engine for the Cassandra/DSE native protocol.
//!
//! A [`Connection`] multiplexes many in-flight requests over one TCP (or
//! caller-supplied) transport: stream ids come from a bounded pool, each
//! request gets a bounded queue of response frames and an inactivity
//! timeout, and the v5 modern-framing switch happens transparently during
//! the handshake.

pub mod connection;
pub mod error;
pub mod handshake;
pub mod inflight;
pub mod io;
pub mod streampool;

pub use connection::Connection;
pub use error::{ConnectionError, RequestError, Result};
pub use inflight::{InFlightRequest, InFlightTable};
pub use io::{BoxedTransport, FramingState, Transport};
pub use streampool::StreamIdPool;

use cqlauth::Credentials;
use cqlframe::message::CodecRegistry;
use cqlframe::Frame;
use cqlwire::version::CompressionAlgorithm;
use cqlwire::ProtocolVersion;
use std::sync::Arc;
use std::time::Duration;

/// Hard protocol cap on concurrent requests (stream ids are 15 bits plus
/// sign on the wire).
pub const MAX_IN_FLIGHT_LIMIT: usize = 32_767;

/// Callback for server-push EVENT frames.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, frame: Frame);
}

/// Connection behavior knobs.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Protocol version to negotiate.
    pub version: ProtocolVersion,
    /// Body compression (legacy framing) / payload compression (modern).
    pub compression: CompressionAlgorithm,
    /// PLAIN credentials, when the server authenticates.
    pub credentials: Option<Credentials>,
    /// Cap on concurrent requests; also sizes the outbound and event queues.
    pub max_in_flight: usize,
    /// Per-request response queue depth.
    pub max_pending: usize,
    pub connect_timeout: Duration,
    /// Per-request inactivity timeout.
    pub read_timeout: Duration,
    /// When set, an OPTIONS heartbeat goes out at this interval.
    pub heartbeat_interval: Option<Duration>,
    /// Invoked in order for every EVENT frame.
    pub event_handlers: Vec<Arc<dyn EventHandler>>,
    /// Message codecs; defaults plus caller overrides.
    pub codec_registry: Arc<CodecRegistry>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::V4,
            compression: CompressionAlgorithm::None,
            credentials: None,
            max_in_flight: 1024,
            max_pending: 10,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(12),
            heartbeat_interval: None,
            event_handlers: Vec::new(),
            codec_registry: Arc::new(CodecRegistry::new()),
        }
    }
}

impl ConnectionConfig {
    pub fn with_version(version: ProtocolVersion) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    pub fn validate(&self) -> error::Result<()> {
        if self.max_in_flight == 0 || self.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            return Err(error::ConnectionError::Config(format!(
                "max_in_flight must be in 1..={}, got {}",
                MAX_IN_FLIGHT_LIMIT, self.max_in_flight
            )));
        }
        if self.max_pending == 0 {
            return Err(error::ConnectionError::Config(
                "max_pending must be at least 1".to_string(),
            ));
        }
        if !self.version.supports_compression(self.compression) {
            return Err(error::ConnectionError::Config(format!(
                "{} compression is not supported on protocol {}",
                self.compression.as_str(),
                self.version
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConnectionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_max_in_flight_bounds() {
        let mut config = ConnectionConfig::default();
        config.max_in_flight = 0;
        assert!(config.validate().is_err());
        config.max_in_flight = MAX_IN_FLIGHT_LIMIT + 1;
        assert!(config.validate().is_err());
        config.max_in_flight = MAX_IN_FLIGHT_LIMIT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_snappy_rejected_on_modern_framing_versions() {
        let config = ConnectionConfig::with_version(ProtocolVersion::V5)
            .with_compression(CompressionAlgorithm::Snappy);
        assert!(config.validate().is_err());
        let config = ConnectionConfig::with_version(ProtocolVersion::V4)
            .with_compression(CompressionAlgorithm::Snappy);
        assert!(config.validate().is_ok());
    }
}
