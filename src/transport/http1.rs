//! hyper-based native transport (HTTP/1.1 over TCP).
//!
//! # Responsibilities
//! - Run the accept loop and serve each connection with hyper
//! - Turn each hyper request into a `NativeExchange` pushed to the sink
//! - Turn the exchange's `ResponseSource` back into a hyper response
//! - On close: stop accepting, let open connections finish, then acknowledge
//!
//! # Design Decisions
//! - The accept loop never waits on the consumer; admission is the sink's call
//! - A sink that drops an exchange without answering gets a 500
//! - TLS is not terminated here, so connections always report unencrypted

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{stream, TryStreamExt};
use http::{HeaderName, HeaderValue, Request, Response, StatusCode};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::{
    response_channel, Body, ListenOptions, ListenerSink, NativeExchange, NativeListener,
    RequestHead, ResponseHead, ResponseSource, Transport,
};
use crate::error::TransportError;
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::Listener;
use crate::net::SocketMeta;

type ResponseBody = UnsyncBoxBody<Bytes, Infallible>;

/// Default number of body chunks buffered per response.
pub const DEFAULT_RESPONSE_BUFFER: usize = 16;

/// Pause after a failed accept before trying again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Transport that serves HTTP/1.1 with hyper on tokio TCP sockets.
#[derive(Debug, Clone, Copy)]
pub struct HyperTransport {
    response_buffer: usize,
}

impl HyperTransport {
    pub fn new(response_buffer: usize) -> Self {
        Self {
            response_buffer: response_buffer.max(1),
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_BUFFER)
    }
}

impl Transport for HyperTransport {
    fn create_listener(&self) -> Arc<dyn NativeListener> {
        Arc::new(HyperListener::new(self.response_buffer))
    }
}

/// One listening socket and its connections.
struct HyperListener {
    response_buffer: usize,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl HyperListener {
    fn new(response_buffer: usize) -> Self {
        Self {
            response_buffer,
            shutdown: Shutdown::new(),
            tracker: ConnectionTracker::new(),
            accept_task: Mutex::new(None),
        }
    }
}

impl NativeListener for HyperListener {
    fn listen(&self, options: ListenOptions, sink: Arc<dyn ListenerSink>) {
        let ctx = ServeContext {
            sink,
            shutdown: self.shutdown.subscribe(),
            tracker: self.tracker.clone(),
            response_buffer: self.response_buffer,
        };

        let task = tokio::spawn(async move {
            let listener = match Listener::bind(&options) {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::warn!(address = %options.addr, error = %e, "Listener bind failed");
                    ctx.sink.on_error(e.into());
                    return;
                }
            };
            match listener.local_addr() {
                Ok(local) => ctx.sink.on_listening(local),
                Err(e) => {
                    ctx.sink.on_error(e.into());
                    return;
                }
            }
            accept_loop(listener, ctx).await;
        });

        if let Ok(mut slot) = self.accept_task.lock() {
            *slot = Some(task);
        }
    }

    fn close(&self, ack: oneshot::Sender<()>) {
        self.shutdown.trigger();
        let task = self.accept_task.lock().ok().and_then(|mut slot| slot.take());
        let tracker = self.tracker.clone();

        // Dropped outside a runtime: the accept loop sees the trigger on its own.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let _ = ack.send(());
            return;
        };
        runtime.spawn(async move {
            if let Some(task) = task {
                let _ = task.await;
            }
            tracker.wait_idle().await;
            tracing::debug!("Listener torn down");
            let _ = ack.send(());
        });
    }
}

impl Drop for HyperListener {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Everything a connection task needs, cloned per connection.
#[derive(Clone)]
struct ServeContext {
    sink: Arc<dyn ListenerSink>,
    shutdown: watch::Receiver<bool>,
    tracker: ConnectionTracker,
    response_buffer: usize,
}

async fn accept_loop(listener: Listener, ctx: ServeContext) {
    let mut shutdown = ctx.shutdown.clone();
    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let guard = ctx.tracker.track();
                    tokio::spawn(serve_connection(stream, peer, guard, ctx.clone()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    ctx.sink.on_error(e.into());
                    // Errors like EMFILE persist; give the process a moment to free descriptors.
                    tokio::select! {
                        _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
                        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            },
        }
    }
    tracing::debug!("Accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
    mut ctx: ServeContext,
) {
    let meta = Arc::new(SocketMeta {
        local: stream.local_addr().ok(),
        remote: Some(peer),
        encrypted: false,
    });

    let service = {
        let sink = Arc::clone(&ctx.sink);
        let response_buffer = ctx.response_buffer;
        service_fn(move |req: Request<Incoming>| {
            let sink = Arc::clone(&sink);
            let meta = Arc::clone(&meta);
            async move {
                Ok::<_, Infallible>(dispatch(req, meta, sink, response_buffer).await)
            }
        })
    };

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(connection_id = %guard.id(), error = %e, "Connection error");
                }
                break;
            }
            _ = ctx.shutdown.wait_for(|stop| *stop), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

async fn dispatch(
    req: Request<Incoming>,
    meta: Arc<SocketMeta>,
    sink: Arc<dyn ListenerSink>,
    response_buffer: usize,
) -> Response<ResponseBody> {
    let (parts, incoming) = req.into_parts();

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.to_string());
    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let body = Body::from_stream(
        incoming
            .into_data_stream()
            .map_err(TransportError::from),
    );

    let (response, source) = response_channel(response_buffer);
    sink.on_exchange(NativeExchange {
        head: RequestHead {
            method: parts.method,
            target,
            version: parts.version,
            headers,
        },
        connection: meta,
        body,
        response,
    });

    into_hyper_response(source).await
}

async fn into_hyper_response(source: ResponseSource) -> Response<ResponseBody> {
    let ResponseSource { head, body } = source;
    let head = match head.await {
        Ok(head) => head,
        Err(_) => {
            tracing::warn!("Exchange dropped without a response");
            return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let frames = stream::unfold(body, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, Infallible>(Frame::data(chunk)), rx))
    });

    match build_response(&head, StreamBody::new(frames).boxed_unsync()) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, status = %head.status, "Invalid response head");
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn build_response(
    head: &ResponseHead,
    body: ResponseBody,
) -> Result<Response<ResponseBody>, http::Error> {
    let mut response = Response::new(body);
    *response.status_mut() = head.status;
    let headers = response.headers_mut();
    for (name, value) in &head.headers {
        headers.append(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }
    if head.status.canonical_reason() != Some(head.reason.as_str()) {
        if let Ok(reason) = hyper::ext::ReasonPhrase::try_from(head.reason.clone().into_bytes()) {
            response.extensions_mut().insert(reason);
        }
    }
    Ok(response)
}

fn empty_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(Empty::new().boxed_unsync());
    *response.status_mut() = status;
    response
}
