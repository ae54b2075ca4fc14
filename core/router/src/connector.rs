//! Dialing loop for one active friend.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Friend;
use crate::peer::Hookup;

/// Delay between dial attempts after a failure.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Resolves, connects and hands the socket over, then goes back to sleep:
/// after a failure for [`RECONNECT_INTERVAL`], after a successful handoff for
/// twice that. The redial is harmless while the link is up and heals the
/// window where a session died without the connector hearing of it yet.
pub struct FriendConnector {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl FriendConnector {
    pub fn spawn(friend: Friend, hookup: Arc<dyn Hookup>) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run(friend, hookup, cancelled.clone()));
        Self { cancelled, task }
    }

    /// Stop dialing. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.task.abort();
    }
}

impl Drop for FriendConnector {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run(friend: Friend, hookup: Arc<dyn Hookup>, cancelled: Arc<AtomicBool>) {
    let Some(port) = friend.port else {
        return;
    };
    while !cancelled.load(Ordering::Relaxed) {
        let delay = match attempt(&friend, port, hookup.as_ref()).await {
            Ok(()) => 2 * RECONNECT_INTERVAL,
            Err(e) => {
                debug!(friend = %friend.name, "connecting failed: {e}");
                RECONNECT_INTERVAL
            }
        };
        tokio::time::sleep(delay).await;
    }
}

async fn attempt(friend: &Friend, port: u16, hookup: &dyn Hookup) -> io::Result<()> {
    let mut addrs = lookup_host((friend.addr.as_str(), port)).await?;
    let addr = addrs.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "hostname resolved to no addresses")
    })?;
    let stream = TcpStream::connect(addr).await?;
    info!(friend = %friend.name, %addr, "connected");
    hookup.hookup(stream, friend).await;
    Ok(())
}
