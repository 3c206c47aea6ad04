//! Error handling for the server monitor crate.

/// A specialized `Result` type for server monitor operations.
pub type Result<T> = std::result::Result<T, SystemError>;

/// The main error type for server monitor operations.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A metric provider query failed or returned nothing usable
    #[error("Metric provider error: {0}")]
    Provider(String),

    /// Outbound message could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Message could not be delivered to a subscriber
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Public tunnel negotiation or transport failed
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    /// HTTP request to the tunnel service failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SystemError {
    /// Create a new metric provider error
    pub fn provider_error(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a new delivery error
    pub fn delivery_error(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new tunnel error
    pub fn tunnel_error(msg: impl Into<String>) -> Self {
        Self::Tunnel(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error means the subscriber is gone rather than a defect.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Delivery(_))
    }
}
