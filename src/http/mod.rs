//! Request and response facades.
//!
//! # Data Flow
//! ```text
//! NativeExchange
//!     → request.rs (HttpRequest: head, lazy headers/cookies/URI, body)
//!         → uri.rs (requested URI from forwarding headers or the socket)
//!     → response.rs (HttpResponse: mutable until finalized, then streams)
//!     → ResponseSink → native transport
//! ```

pub mod request;
pub mod response;
pub mod uri;

pub use request::{HttpRequest, RequestId, X_REQUEST_ID};
pub use response::HttpResponse;
pub use uri::UriResolver;
