//! TCP listener setup.
//!
//! # Responsibilities
//! - Bind to the resolved address with the requested backlog
//! - Apply `IPV6_V6ONLY` for IPv6 listeners
//! - Accept incoming TCP connections

use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

use crate::transport::ListenOptions;

/// Backlog used when the caller does not ask for one.
pub const DEFAULT_BACKLOG: u32 = 511;

/// A bound, listening TCP socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind and listen according to `options`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(options: &ListenOptions) -> io::Result<Self> {
        let addr = options.addr;
        let socket = socket2::Socket::new(
            if addr.is_ipv4() {
                socket2::Domain::IPV4
            } else {
                socket2::Domain::IPV6
            },
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;
        socket.set_reuse_address(true)?;
        if addr.is_ipv6() {
            socket.set_only_v6(options.v6_only)?;
        }
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let backlog = options.backlog.unwrap_or(DEFAULT_BACKLOG);
        socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

        let std_listener: std::net::TcpListener = socket.into();
        let inner = TcpListener::from_std(std_listener)?;

        tracing::info!(
            address = %inner.local_addr()?,
            backlog,
            v6_only = options.v6_only,
            "Listener bound"
        );

        Ok(Self { inner })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, addr) = self.inner.accept().await?;
        tracing::debug!(peer_addr = %addr, "Connection accepted");
        Ok((stream, addr))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
