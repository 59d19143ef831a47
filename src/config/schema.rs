//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for an ingress server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Where and how to listen.
    pub listener: ListenerConfig,

    /// Request admission and facade settings.
    pub ingress: IngressConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host name or IP literal (e.g. "0.0.0.0", "::1", "localhost").
    pub address: String,

    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,

    /// Pending-connection queue length. `None` uses the transport default.
    pub backlog: Option<u32>,

    /// For IPv6 addresses, refuse IPv4-mapped connections.
    pub v6_only: bool,

    /// Share the port with other listeners. Not supported; rejected by validation.
    pub shared: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
            backlog: None,
            v6_only: false,
            shared: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IngressConfig {
    /// Honor `x-forwarded-proto` / `x-forwarded-host` when resolving URIs.
    pub trust_forwarded_headers: bool,

    /// Body chunks buffered per response before writes wait.
    pub response_buffer: usize,

    /// Admitted requests waiting for the consumer before arrivals get 503.
    pub queue_capacity: usize,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_headers: true,
            response_buffer: crate::transport::http1::DEFAULT_RESPONSE_BUFFER,
            queue_capacity: crate::ingress::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
