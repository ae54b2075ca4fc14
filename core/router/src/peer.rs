//! The seams between the router and the protocol layer.

use std::sync::Arc;

use async_trait::async_trait;
use bithorde_store::{Asset, BindRead};
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::Friend;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("upstream has no matching asset")]
    NotFound,
    #[error("upstream failed. {0}")]
    Upstream(String),
}

/// A connected, authenticated peer session.
#[async_trait]
pub trait Peer: Send + Sync {
    /// The peer name established during the handshake.
    fn name(&self) -> &str;

    /// Ask the peer to bind the requested asset for reading.
    async fn bind_read(&self, req: BindRead) -> Result<Arc<dyn Asset>, BindError>;
}

/// Receiver of freshly dialed sockets. The server side runs the protocol
/// handshake on the stream and reports the resulting session back through
/// [`Router::on_connected`](crate::router::Router::on_connected).
#[async_trait]
pub trait Hookup: Send + Sync {
    async fn hookup(&self, stream: TcpStream, friend: &Friend);
}
