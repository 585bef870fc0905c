//! Connection pool over several liteserver sessions.
//!
//! Queries go to Ready sessions in round-robin order, preferring those with
//! fewer than `max_req_per_peer` queries in flight. Transport failures are
//! retried on a different session; liteserver errors are returned as is.

use crate::liteclient::config::PoolConfig;
use crate::liteclient::hook::{DisconnectHook, FixedRetry, SharedHook};
use crate::liteclient::session::{Connector, Session, TcpConnector};
use crate::liteclient::types::{NodeInfo, PeerReport, PoolError, SessionError};
use crate::tl::{LiteQuery, MasterchainInfo, Request, Response, TlError, Version};
use bytes::Bytes;
use derivative::Derivative;
use futures::future::{BoxFuture, join_all};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tl_proto::TlWrite;
use tokio::task::JoinHandle;

type Result<T> = std::result::Result<T, PoolError>;

#[derive(Debug, Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

#[derive(Derivative)]
#[derivative(Debug)]
struct PoolInner {
    sessions: Vec<Session>,
    cursor: AtomicUsize,
    config: PoolConfig,
    #[derivative(Debug = "ignore")]
    hook: SharedHook,
    #[derivative(Debug = "ignore")]
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let keepalive = self
            .keepalive
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = keepalive {
            handle.abort();
        }
    }
}

impl Pool {
    /// Builds one Idle session per node; nothing is dialed until `start`
    pub fn new(nodes: impl IntoIterator<Item = NodeInfo>, config: PoolConfig) -> Self {
        Self::with_connector(nodes, config, Arc::new(TcpConnector))
    }

    pub fn with_connector(
        nodes: impl IntoIterator<Item = NodeInfo>,
        config: PoolConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let hook = SharedHook::new(Arc::new(FixedRetry::new(config.reconnect_policy())));
        let sessions = nodes
            .into_iter()
            .map(|node| Session::with_hook(node, &config, connector.clone(), hook.clone()))
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                sessions,
                cursor: AtomicUsize::new(0),
                config,
                hook,
                keepalive: Mutex::new(None),
            }),
        }
    }

    /// Connects to every node concurrently; fails unless at least one session is Ready
    pub async fn connect(
        nodes: impl IntoIterator<Item = NodeInfo>,
        config: PoolConfig,
    ) -> Result<Self> {
        let pool = Self::new(nodes, config);
        if let Err(e) = pool.start().await {
            pool.shutdown().await;
            return Err(e);
        }
        Ok(pool)
    }

    /// Handshakes every session that is not Ready and starts the keepalive.
    /// Sessions that fail are reported to the hook as `HandshakeFailed`.
    pub async fn start(&self) -> Result<usize> {
        let ready = self.connect_missing().await;
        if ready == 0 {
            return Err(PoolError::NoAvailableNodes);
        }
        log::info!(
            "pool started with {}/{} ready sessions",
            ready,
            self.peers_num()
        );
        self.spawn_keepalive();
        Ok(ready)
    }

    async fn connect_missing(&self) -> usize {
        let sessions: Vec<&Session> = self
            .inner
            .sessions
            .iter()
            .filter(|session| !session.is_ready())
            .collect();
        let results = join_all(sessions.iter().map(|session| session.connect())).await;

        for (session, result) in sessions.iter().zip(results) {
            if let Err(e) = result {
                log::warn!("failed to connect to {}: {}", session.node(), e);
                session.notify_handshake_failed();
            }
        }
        self.ready_peers_num()
    }

    /// Explicitly reconnects every session that is not Ready
    pub async fn reconnect(&self) -> Result<usize> {
        let ready = self.connect_missing().await;
        if ready == 0 {
            return Err(PoolError::NoAvailableNodes);
        }
        let keepalive_stopped = self.lock_keepalive().is_none();
        if keepalive_stopped {
            self.spawn_keepalive();
        }
        Ok(ready)
    }

    /// Stops the keepalive and closes every session
    pub async fn shutdown(&self) {
        if let Some(handle) = self.lock_keepalive().take() {
            handle.abort();
        }
        join_all(self.inner.sessions.iter().map(|session| session.close())).await;
        log::info!("pool shut down");
    }

    pub fn set_on_disconnect<H: DisconnectHook + 'static>(&self, hook: H) {
        self.inner.hook.replace(Arc::new(hook));
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn sessions(&self) -> &[Session] {
        &self.inner.sessions
    }

    pub fn peers_num(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn ready_peers_num(&self) -> usize {
        self.inner
            .sessions
            .iter()
            .filter(|session| session.is_ready())
            .count()
    }

    pub fn stats(&self) -> Vec<PeerReport> {
        self.inner
            .sessions
            .iter()
            .map(|session| PeerReport {
                node: *session.node(),
                state: session.state(),
                stats: session.stats(),
            })
            .collect()
    }

    fn lock_keepalive(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_keepalive(&self) {
        let Some(interval) = self.inner.config.ping_interval else {
            return;
        };
        let handle = tokio::spawn(keepalive(Arc::downgrade(&self.inner), interval));
        if let Some(stale) = self.lock_keepalive().replace(handle) {
            stale.abort();
        }
    }

    fn choose_session(&self, tried: &HashSet<usize>) -> Option<usize> {
        let sessions = &self.inner.sessions;
        if sessions.is_empty() {
            return None;
        }

        let start = self.inner.cursor.fetch_add(1, Ordering::Relaxed);
        let candidates: Vec<usize> = (0..sessions.len())
            .map(|offset| (start + offset) % sessions.len())
            .filter(|idx| !tried.contains(idx) && sessions[*idx].is_ready())
            .collect();

        // First pass: next peer with acceptable load
        let max_req = self.inner.config.max_req_per_peer;
        if let Some(&idx) = candidates
            .iter()
            .find(|&&idx| sessions[idx].in_flight() < max_req)
        {
            return Some(idx);
        }

        // Second pass: least loaded peer
        candidates
            .into_iter()
            .min_by_key(|&idx| sessions[idx].in_flight())
    }

    pub async fn query(&self, payload: &[u8]) -> Result<Bytes> {
        self.query_with_timeout(payload, self.inner.config.query_timeout)
            .await
    }

    pub async fn query_with_timeout(&self, payload: &[u8], timeout: Duration) -> Result<Bytes> {
        let mut tried = HashSet::new();
        let mut last_error: Option<SessionError> = None;

        for attempt in 0..=self.inner.config.max_retries {
            let Some(idx) = self.choose_session(&tried) else {
                break;
            };
            tried.insert(idx);

            let session = &self.inner.sessions[idx];
            match session.send_with_timeout(payload, timeout).await {
                Ok(answer) => return Ok(answer),
                Err(e) if e.is_retryable() => {
                    log::warn!(
                        "query to {} failed on attempt {}: {}",
                        session.node(),
                        attempt + 1,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_error.map_or(PoolError::NoAvailableNodes, PoolError::Session))
    }

    /// Wraps `request` in `liteServer.query`; a `liteServer.error` answer becomes `PoolError::Remote`
    pub async fn lite_query<T: TlWrite>(&self, request: T) -> Result<Bytes> {
        let data = tl_proto::serialize(request);
        let payload = tl_proto::serialize(LiteQuery { data: &data });
        let answer = self.query(&payload).await?;

        if let Ok(Response::Error { code, message }) = tl_proto::deserialize::<Response>(&answer) {
            return Err(PoolError::Remote {
                code,
                message: String::from_utf8_lossy(message).into_owned(),
            });
        }
        Ok(answer)
    }

    /// Server unix time
    pub async fn get_time(&self) -> Result<u32> {
        let answer = self.lite_query(Request::GetTime).await?;
        match decode(&answer)? {
            Response::CurrentTime { now } => Ok(now),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn get_version(&self) -> Result<Version> {
        let answer = self.lite_query(Request::GetVersion).await?;
        match decode(&answer)? {
            Response::Version {
                mode,
                version,
                capabilities,
                now,
            } => Ok(Version {
                mode,
                version,
                capabilities,
                now,
            }),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn get_masterchain_info(&self) -> Result<MasterchainInfo> {
        let answer = self.lite_query(Request::GetMasterchainInfo).await?;
        match decode(&answer)? {
            Response::MasterchainInfo {
                last,
                state_root_hash,
                init,
            } => Ok(MasterchainInfo {
                last,
                state_root_hash,
                init,
            }),
            other => Err(unexpected(&other)),
        }
    }
}

fn decode(answer: &[u8]) -> Result<Response<'_>> {
    tl_proto::deserialize::<Response>(answer).map_err(|e| PoolError::Tl(TlError::from(e)))
}

fn unexpected(response: &Response<'_>) -> PoolError {
    PoolError::Tl(TlError::UnexpectedResponse(format!("{response:?}")))
}

async fn keepalive(pool: Weak<PoolInner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = pool.upgrade() else {
            break;
        };
        let sessions: Vec<Session> = inner
            .sessions
            .iter()
            .filter(|session| session.is_ready())
            .cloned()
            .collect();
        drop(inner);

        join_all(sessions.into_iter().map(|session| async move {
            match session.ping().await {
                Ok(rtt) => log::trace!("ping {} took {:?}", session.node(), rtt),
                Err(e) => {
                    log::warn!("keepalive to {} failed: {}", session.node(), e);
                    session.abort_connection().await;
                }
            }
        }))
        .await;
    }
}

impl tower::Service<Vec<u8>> for Pool {
    type Response = Bytes;
    type Error = PoolError;
    type Future = BoxFuture<'static, Result<Bytes>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, payload: Vec<u8>) -> Self::Future {
        let pool = self.clone();
        Box::pin(async move { pool.query(&payload).await })
    }
}
