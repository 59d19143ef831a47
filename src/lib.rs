//! Pull-based HTTP ingress over a push-style native transport.
//!
//! A bound [`Server`] hands out a single [`RequestStream`]. While the stream
//! is paused, or before anyone subscribes, new requests are answered with
//! `503 Service Unavailable` at the edge instead of being queued.
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use ingress_http::{bind, BindOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server = bind("127.0.0.1", 8080, BindOptions::default()).await?;
//! let mut requests = server.requests()?;
//! while let Some(request) = requests.next().await {
//!     let mut response = request?.into_response();
//!     response.write("hello").await?;
//!     response.close().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod headers;
pub mod http;
pub mod ingress;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod transport;

pub use config::schema::ServerConfig;
pub use error::{
    BindError, BodyError, CloseError, HeaderImmutableError, ResponseError, SubscribeError,
    TransportError, UnsupportedOperation, UriError,
};
pub use headers::HeaderTable;
pub use http::{HttpRequest, HttpResponse, RequestId};
pub use ingress::RequestStream;
pub use lifecycle::{BindOptions, Binder, Server, ServerState};
pub use transport::{Body, HyperTransport};

/// Bind a hyper-backed server, resolving `address` with the system resolver.
pub async fn bind(address: &str, port: u16, options: BindOptions) -> Result<Server, BindError> {
    Binder::new(HyperTransport::default())
        .bind(address, port, options)
        .await
}
