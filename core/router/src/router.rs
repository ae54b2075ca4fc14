//! Friend bookkeeping and the forwarding entry point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bithorde_store::{BindRead, Info, InfoList, Manageable};
use parking_lot::Mutex;
use tracing::info;

use crate::config::Friend;
use crate::connector::FriendConnector;
use crate::forwarded::ForwardedAsset;
use crate::peer::{Hookup, Peer};

/// Budget assumed for requests that carry no timeout of their own.
pub const DEFAULT_BIND_TIMEOUT: Duration = Duration::from_millis(500);

/// Margin reserved for delivering the reply back to the requester.
pub const FORWARD_GRACE: Duration = Duration::from_millis(20);

pub struct Router {
    name: String,
    hookup: Arc<dyn Hookup>,
    friends: Mutex<HashMap<String, Friend>>,
    connectors: Mutex<HashMap<String, FriendConnector>>,
    connected: Mutex<HashMap<String, Arc<dyn Peer>>>,
}

impl Router {
    /// `name` is this node's own peer name, used for loop prevention.
    pub fn new(name: impl Into<String>, hookup: Arc<dyn Hookup>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            hookup,
            friends: Mutex::new(HashMap::new()),
            connectors: Mutex::new(HashMap::new()),
            connected: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a friend; an addressable one gets a connector dialing it.
    pub fn add_friend(&self, friend: Friend) {
        let name = friend.name.clone();
        self.friends.lock().insert(name.clone(), friend.clone());
        if friend.port.is_some() {
            let mut connectors = self.connectors.lock();
            connectors
                .entry(name)
                .or_insert_with(|| FriendConnector::spawn(friend, self.hookup.clone()));
        }
    }

    pub fn friends(&self) -> usize {
        self.friends.lock().len()
    }

    pub fn upstreams(&self) -> usize {
        self.connected.lock().len()
    }

    pub fn connected_friends(&self) -> Vec<String> {
        self.connected.lock().keys().cloned().collect()
    }

    /// A session authenticated as a friend: stop dialing it and record it as
    /// the active upstream. Sessions of unknown peers are none of ours.
    pub fn on_connected(&self, client: Arc<dyn Peer>) {
        let peer = client.name().to_string();
        if self.friends.lock().contains_key(&peer) {
            info!(friend = %peer, "friend connected");
            if let Some(connector) = self.connectors.lock().remove(&peer) {
                connector.cancel();
            }
            self.connected.lock().insert(peer, client);
        }
    }

    /// A session went away. Only the entry for this very client is removed,
    /// so a replacement session that won the race stays untouched, and an
    /// addressable friend gets its connector back.
    pub fn on_disconnected(&self, client: &Arc<dyn Peer>) {
        let peer = client.name();
        {
            let mut connected = self.connected.lock();
            if connected
                .get(peer)
                .is_some_and(|current| same_peer(current, client))
            {
                connected.remove(peer);
            }
        }

        let friend = self.friends.lock().get(peer).cloned();
        if let Some(friend) = friend {
            if friend.port.is_some() {
                let mut connectors = self.connectors.lock();
                connectors
                    .entry(peer.to_string())
                    .or_insert_with(|| FriendConnector::spawn(friend, self.hookup.clone()));
            }
        }
    }

    /// Open a forwarded asset for a request we cannot answer locally.
    /// Returns nothing when the request's deadline budget is already spent.
    pub fn open_asset(self: &Arc<Self>, req: &BindRead) -> Option<Arc<ForwardedAsset>> {
        let budget = req
            .timeout
            .unwrap_or(DEFAULT_BIND_TIMEOUT)
            .checked_sub(FORWARD_GRACE)
            .filter(|budget| !budget.is_zero())?;
        Some(ForwardedAsset::new(self.clone(), req.clone(), budget))
    }

    /// Connected friends this request may be forwarded to: everyone except
    /// the session it came in on and the peers it already traversed.
    pub(crate) fn eligible_peers(&self, req: &BindRead) -> Vec<Arc<dyn Peer>> {
        self.connected
            .lock()
            .values()
            .filter(|peer| req.requester.as_deref() != Some(peer.name()))
            .filter(|peer| !req.routes.iter().any(|hop| hop == peer.name()))
            .cloned()
            .collect()
    }
}

impl Manageable for Router {
    fn describe(&self, target: &mut Info) {
        target.put(format_args!(
            "{} upstreams ({} configured)",
            self.upstreams(),
            self.friends()
        ));
    }

    fn inspect(&self, target: &mut InfoList) {
        let connected = self.connected.lock();
        for (name, friend) in self.friends.lock().iter() {
            if connected.contains_key(name) {
                target.append(name.clone(), "connected");
            } else {
                target.append(
                    name.clone(),
                    format_args!("{}:{}", friend.addr, friend.port.unwrap_or(0)),
                );
            }
        }
    }
}

fn same_peer(a: &Arc<dyn Peer>, b: &Arc<dyn Peer>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
