//! A single ADNL-TCP connection to a liteserver.
//!
//! The session owns the write half of the framed connection and a reader task
//! that routes every `adnl.message.answer` / `tcp.pong` to the caller waiting
//! for it. Each caller registers a oneshot slot keyed by its random query id
//! before writing, so answers may arrive in any order.

use crate::adnl::{AdnlCodec, AdnlPeer};
use crate::liteclient::config::PoolConfig;
use crate::liteclient::hook::{
    DisconnectEvent, DisconnectHook, DisconnectReason, FixedRetry, ReconnectDecision,
    ReconnectPolicy, SharedHook,
};
use crate::liteclient::types::{NodeInfo, PeerStats, SessionError};
use crate::tl::Message;
use async_trait::async_trait;
use bytes::Bytes;
use derivative::Derivative;
use futures::future::BoxFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Handshaking,
    Ready,
    /// Terminal until an explicit `connect` or `reconnect_with`
    Disconnected,
}

pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncReadWrite for T {}

/// Opens the byte stream a session runs its handshake over
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: SocketAddr) -> std::io::Result<Box<dyn AsyncReadWrite>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: SocketAddr) -> std::io::Result<Box<dyn AsyncReadWrite>> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

type Transport = Framed<Box<dyn AsyncReadWrite>, AdnlCodec>;
type FrameSink = SplitSink<Transport, Bytes>;
type FrameStream = SplitStream<Transport>;
type Reply = oneshot::Sender<Result<Bytes, SessionError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PendingKey {
    Query([u8; 32]),
    Ping(u64),
}

#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Derivative)]
#[derivative(Debug)]
struct SessionInner {
    node: NodeInfo,
    query_timeout: Duration,
    handshake_timeout: Duration,
    #[derivative(Debug = "ignore")]
    connector: Arc<dyn Connector>,
    #[derivative(Debug = "ignore")]
    hook: SharedHook,
    state: watch::Sender<SessionState>,
    #[derivative(Debug = "ignore")]
    pending: Mutex<HashMap<PendingKey, Reply>>,
    #[derivative(Debug = "ignore")]
    writer: tokio::sync::Mutex<Option<FrameSink>>,
    #[derivative(Debug = "ignore")]
    reader: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every connect and teardown; stale readers and writers compare against it
    generation: AtomicU64,
    closed: AtomicBool,
    #[derivative(Debug = "ignore")]
    connect_lock: tokio::sync::Mutex<()>,
    stats: Mutex<PeerStats>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let reader = self
            .reader
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub fn new(node: NodeInfo, config: &PoolConfig) -> Self {
        Self::with_connector(node, config, Arc::new(TcpConnector))
    }

    pub fn with_connector(node: NodeInfo, config: &PoolConfig, connector: Arc<dyn Connector>) -> Self {
        let hook = SharedHook::new(Arc::new(FixedRetry::new(config.reconnect_policy())));
        Self::with_hook(node, config, connector, hook)
    }

    pub(crate) fn with_hook(
        node: NodeInfo,
        config: &PoolConfig,
        connector: Arc<dyn Connector>,
        hook: SharedHook,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            inner: Arc::new(SessionInner {
                node,
                query_timeout: config.query_timeout,
                handshake_timeout: config.handshake_timeout,
                connector,
                hook,
                state,
                pending: Mutex::new(HashMap::new()),
                writer: tokio::sync::Mutex::new(None),
                reader: Mutex::new(None),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                connect_lock: tokio::sync::Mutex::new(()),
                stats: Mutex::new(PeerStats::default()),
            }),
        }
    }

    pub fn node(&self) -> &NodeInfo {
        &self.inner.node
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn stats(&self) -> PeerStats {
        *lock(&self.inner.stats)
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.inner.stats).current_requests as usize
    }

    /// Replaces the hook; sessions of one pool share a single hook slot
    pub fn set_on_disconnect(&self, hook: Arc<dyn DisconnectHook>) {
        self.inner.hook.replace(hook);
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            log::trace!("session {}: {:?} -> {:?}", self.inner.node, previous, state);
        }
    }

    /// Dial and handshake; a no-op on a Ready session. Reopens a closed session.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.inner.closed.store(false, Ordering::SeqCst);
        self.establish().await
    }

    async fn establish(&self) -> Result<(), SessionError> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SessionError::NotConnected);
        }

        self.set_state(SessionState::Handshaking);
        let node = self.inner.node;
        let connector = self.inner.connector.clone();
        let dial = async move {
            let stream = connector.connect(node.addr).await?;
            let peer = AdnlPeer::connect(&node.public_key, stream)
                .await
                .map_err(|e| SessionError::HandshakeRejected(e.to_string()))?;
            Ok::<_, SessionError>(peer)
        };

        let peer = match tokio::time::timeout(self.inner.handshake_timeout, dial).await {
            Ok(Ok(peer)) => peer,
            Ok(Err(e)) => {
                log::warn!("handshake with {} failed: {}", node, e);
                self.set_state(SessionState::Disconnected);
                return Err(e);
            }
            Err(_) => {
                log::warn!("handshake with {} timed out", node);
                self.set_state(SessionState::Disconnected);
                return Err(SessionError::HandshakeTimeout);
            }
        };

        let (sink, stream) = peer.into_framed().split();
        let mut writer = self.inner.writer.lock().await;
        if self.inner.closed.load(Ordering::SeqCst) {
            self.set_state(SessionState::Disconnected);
            return Err(SessionError::NotConnected);
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *writer = Some(sink);
        let reader = tokio::spawn(read_loop(Arc::downgrade(&self.inner), stream, generation));
        if let Some(stale) = lock(&self.inner.reader).replace(reader) {
            stale.abort();
        }
        self.set_state(SessionState::Ready);
        drop(writer);

        log::debug!("session to {} is ready", node);
        Ok(())
    }

    pub async fn send(&self, payload: &[u8]) -> Result<Bytes, SessionError> {
        self.send_with_timeout(payload, self.inner.query_timeout)
            .await
    }

    /// Sends `payload` as an `adnl.message.query` and waits for its answer
    pub async fn send_with_timeout(
        &self,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Bytes, SessionError> {
        let query_id: [u8; 32] = rand::random();
        let packet = tl_proto::serialize(Message::Query {
            query_id: &query_id,
            query: payload,
        });

        let tracker = InFlight::start(&self.inner);
        let result = self
            .request(PendingKey::Query(query_id), packet, timeout)
            .await;
        tracker.finish(result.is_ok());
        result
    }

    /// `tcp.ping` round trip
    pub async fn ping(&self) -> Result<Duration, SessionError> {
        let random_id: u64 = rand::random();
        let packet = tl_proto::serialize(Message::Ping { random_id });

        let started = Instant::now();
        self.request(PendingKey::Ping(random_id), packet, self.inner.query_timeout)
            .await?;
        Ok(started.elapsed())
    }

    async fn request(
        &self,
        key: PendingKey,
        packet: Vec<u8>,
        timeout: Duration,
    ) -> Result<Bytes, SessionError> {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        if !self.is_ready() {
            return Err(SessionError::NotConnected);
        }

        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending).insert(key, tx);
        let _slot = PendingSlot {
            inner: &self.inner,
            key,
        };
        // a teardown that already drained the table would never resolve this slot
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return Err(SessionError::NotConnected);
        }

        let exchange = async {
            self.write(packet, generation).await?;
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(SessionError::ConnectionLost),
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::QueryTimeout),
        }
    }

    async fn write(&self, packet: Vec<u8>, generation: u64) -> Result<(), SessionError> {
        let mut writer = self.inner.writer.lock().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return Err(SessionError::ConnectionLost);
        }
        let Some(sink) = writer.as_mut() else {
            return Err(SessionError::NotConnected);
        };

        if let Err(e) = sink.send(Bytes::from(packet)).await {
            drop(writer);
            log::warn!("write to {} failed: {}", self.inner.node, e);
            self.teardown(generation, false).await;
            return Err(SessionError::ConnectionLost);
        }
        Ok(())
    }

    fn dispatch(&self, packet: &[u8]) {
        let node = &self.inner.node;
        let (key, answer) = match tl_proto::deserialize::<Message>(packet) {
            Ok(Message::Answer { query_id, answer }) => {
                (PendingKey::Query(*query_id), Bytes::copy_from_slice(answer))
            }
            Ok(Message::Pong { random_id }) => (PendingKey::Ping(random_id), Bytes::new()),
            Ok(_) => {
                log::debug!("ignoring unsolicited message from {}", node);
                return;
            }
            Err(e) => {
                log::debug!("discarding undecodable packet from {}: {:?}", node, e);
                return;
            }
        };

        let reply = lock(&self.inner.pending).remove(&key);
        match reply {
            Some(reply) => {
                // the waiter may have given up already
                let _ = reply.send(Ok(answer));
            }
            None => log::debug!("discarding answer with unknown id from {}", node),
        }
    }

    fn fail_pending(&self) {
        let drained: Vec<Reply> = lock(&self.inner.pending)
            .drain()
            .map(|(_, reply)| reply)
            .collect();
        if !drained.is_empty() {
            log::debug!(
                "failing {} pending queries to {}",
                drained.len(),
                self.inner.node
            );
        }
        for reply in drained {
            let _ = reply.send(Err(SessionError::ConnectionLost));
        }
    }

    /// Drops the connection of `generation` if it is still the current one
    async fn teardown(&self, generation: u64, from_reader: bool) {
        let mut writer = self.inner.writer.lock().await;
        if self
            .inner
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let sink = writer.take();
        self.set_state(SessionState::Disconnected);
        drop(writer);
        drop(sink);

        let reader = lock(&self.inner.reader).take();
        if !from_reader {
            if let Some(reader) = reader {
                reader.abort();
            }
        }

        self.fail_pending();
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        log::warn!("connection to {} lost", self.inner.node);
        self.notify(DisconnectReason::ConnectionLost);
    }

    fn notify(&self, reason: DisconnectReason) {
        let event = DisconnectEvent {
            node: self.inner.node,
            reason,
        };
        match self.inner.hook.notify(&event) {
            ReconnectDecision::Reconnect(policy) => {
                tokio::spawn(self.clone().reconnect_task(policy));
            }
            ReconnectDecision::Abandon => {
                log::debug!("no reconnect for {} after {:?}", self.inner.node, reason);
            }
        }
    }

    pub(crate) fn notify_handshake_failed(&self) {
        self.notify(DisconnectReason::HandshakeFailed);
    }

    fn reconnect_task(self, policy: ReconnectPolicy) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _ = self.reconnect_with(policy).await;
        })
    }

    /// Up to `policy.attempts` handshakes, each preceded by `policy.delay`.
    /// Exhaustion leaves the session Disconnected and notifies the hook.
    pub async fn reconnect_with(&self, policy: ReconnectPolicy) -> Result<(), SessionError> {
        let mut last_error = SessionError::NotConnected;
        for attempt in 1..=policy.attempts {
            tokio::time::sleep(policy.delay).await;
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(SessionError::NotConnected);
            }
            match self.establish().await {
                Ok(()) => {
                    log::info!("reconnected to {} on attempt {}", self.inner.node, attempt);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "reconnect {}/{} to {} failed: {}",
                        attempt,
                        policy.attempts,
                        self.inner.node,
                        e
                    );
                    last_error = e;
                }
            }
        }

        self.notify(DisconnectReason::ReconnectExhausted);
        Err(last_error)
    }

    /// Shuts the connection down without consulting the hook
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);

        let mut writer = self.inner.writer.lock().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let sink = writer.take();
        self.set_state(SessionState::Disconnected);
        drop(writer);

        if let Some(mut sink) = sink {
            let _ = sink.close().await;
        }
        if let Some(reader) = lock(&self.inner.reader).take() {
            reader.abort();
        }
        self.fail_pending();
    }

    /// Treat the current connection as lost
    pub(crate) async fn abort_connection(&self) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        if self.is_ready() {
            self.teardown(generation, false).await;
        }
    }
}

async fn read_loop(inner: Weak<SessionInner>, mut stream: FrameStream, generation: u64) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(packet)) => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                Session { inner }.dispatch(&packet);
            }
            Some(Err(e)) => break e.to_string(),
            None => break "closed by peer".to_owned(),
        }
    };

    if let Some(inner) = inner.upgrade() {
        log::debug!("reader for {} stopped: {}", inner.node, reason);
        Session { inner }.teardown(generation, true).await;
    }
}

/// Removes the pending slot when the waiter finishes or is dropped
struct PendingSlot<'a> {
    inner: &'a SessionInner,
    key: PendingKey,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        lock(&self.inner.pending).remove(&self.key);
    }
}

struct InFlight<'a> {
    inner: &'a SessionInner,
    started: Instant,
    done: bool,
}

impl<'a> InFlight<'a> {
    fn start(inner: &'a SessionInner) -> Self {
        lock(&inner.stats).current_requests += 1;
        Self {
            inner,
            started: Instant::now(),
            done: false,
        }
    }

    fn finish(mut self, ok: bool) {
        self.done = true;
        let elapsed = self.started.elapsed().as_millis() as u64;
        let mut stats = lock(&self.inner.stats);
        stats.current_requests -= 1;
        stats.record(elapsed, ok);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            let mut stats = lock(&self.inner.stats);
            stats.current_requests -= 1;
            stats.record(self.started.elapsed().as_millis() as u64, false);
        }
    }
}
