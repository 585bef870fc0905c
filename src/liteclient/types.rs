use crate::adnl::AdnlError;
use crate::liteclient::session::SessionState;
use crate::tl::TlError;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is not connected")]
    NotConnected,
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("connection lost")]
    ConnectionLost,
    #[error("query timed out")]
    QueryTimeout,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ADNL error: {0}")]
    Adnl(#[from] AdnlError),
    #[error("TL error: {0}")]
    Tl(#[from] TlError),
}

impl SessionError {
    /// Transport failures a pool may retry on another session
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::NotConnected | SessionError::ConnectionLost | SessionError::QueryTimeout
        )
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no available nodes")]
    NoAvailableNodes,
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("liteserver error {code}: {message}")]
    Remote { code: i32, message: String },
    #[error("TL error: {0}")]
    Tl(#[from] TlError),
}

/// Address and key of a liteserver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeInfo {
    pub addr: SocketAddr,
    pub public_key: [u8; 32],
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.addr, hex::encode(&self.public_key[..4]))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub avg_response_time_ms: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub current_requests: u64,
}

impl PeerStats {
    pub(crate) fn record(&mut self, elapsed_ms: u64, ok: bool) {
        if ok {
            self.avg_response_time_ms = calc_new_average(
                self.avg_response_time_ms,
                self.total_requests - self.failed_requests,
                elapsed_ms,
            );
        } else {
            self.failed_requests += 1;
        }
        self.total_requests += 1;
    }
}

/// Running mean after adding `new_value` to `n` samples averaging `old_avg`
pub(crate) fn calc_new_average(old_avg: u64, n: u64, new_value: u64) -> u64 {
    if n == 0 {
        new_value
    } else {
        (old_avg * n + new_value) / (n + 1)
    }
}

/// Snapshot of one pool member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerReport {
    pub node: NodeInfo,
    pub state: SessionState,
    pub stats: PeerStats,
}
