//! Virtual assets served by whichever friend answers first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bithorde_store::{Asset, BindRead, BitHordeIds, ReadError, Status};
use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{watch, OnceCell};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::router::Router;

/// An asset backed by an upstream peer. Binding is lazy: the first read
/// multicasts the request to every eligible connected friend and keeps the
/// first upstream that answers. Deadline expiry and upstream failures all
/// surface as read misses, never as unverified data.
pub struct ForwardedAsset {
    router: Arc<Router>,
    req: BindRead,
    budget: Duration,
    upstream: OnceCell<Option<Arc<dyn Asset>>>,
    status_tx: watch::Sender<Status>,
}

impl ForwardedAsset {
    pub(crate) fn new(router: Arc<Router>, mut req: BindRead, budget: Duration) -> Arc<Self> {
        // Leave our trace for downstream loop prevention.
        req.routes.push(router.name().to_string());
        let (status_tx, _) = watch::channel(Status::Pending);
        Arc::new(Self {
            router,
            req,
            budget,
            upstream: OnceCell::new(),
            status_tx,
        })
    }

    async fn upstream(&self) -> Option<Arc<dyn Asset>> {
        self.upstream.get_or_init(|| self.bind()).await.clone()
    }

    async fn bind(&self) -> Option<Arc<dyn Asset>> {
        let deadline = Instant::now() + self.budget;
        let peers = self.router.eligible_peers(&self.req);
        if peers.is_empty() {
            debug!("no eligible upstream for {:?}", self.req.ids);
            self.finish(Status::NotFound);
            return None;
        }

        let mut pending: FuturesUnordered<_> = peers
            .into_iter()
            .map(|peer| {
                let req = self.req.clone();
                async move { peer.bind_read(req).await }
            })
            .collect();

        let raced = timeout_at(deadline, async {
            while let Some(outcome) = pending.next().await {
                match outcome {
                    Ok(asset) => return Some(asset),
                    Err(e) => debug!("upstream bind failed: {e}"),
                }
            }
            None
        })
        .await;

        match raced {
            Ok(Some(asset)) => {
                self.finish(Status::Success);
                Some(asset)
            }
            Ok(None) => {
                self.finish(Status::NotFound);
                None
            }
            Err(_) => {
                self.finish(Status::Timeout);
                None
            }
        }
    }

    fn finish(&self, status: Status) {
        self.status_tx.send_if_modified(|current| {
            if *current == Status::Pending {
                *current = status;
                true
            } else {
                false
            }
        });
    }
}

#[async_trait]
impl Asset for ForwardedAsset {
    /// Unknown (zero) until an upstream has been bound.
    fn size(&self) -> u64 {
        self.upstream
            .get()
            .and_then(|bound| bound.as_ref().map(|asset| asset.size()))
            .unwrap_or(0)
    }

    async fn read(&self, offset: u64, len: usize) -> Result<Bytes, ReadError> {
        match self.upstream().await {
            Some(upstream) => match upstream.read(offset, len).await {
                Ok(bytes) => Ok(bytes),
                Err(e) => {
                    debug!("upstream read failed: {e}");
                    Ok(Bytes::new())
                }
            },
            None => Ok(Bytes::new()),
        }
    }

    fn ids(&self) -> BitHordeIds {
        self.req.ids.clone()
    }

    fn status(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }
}
