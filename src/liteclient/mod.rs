//! Liteserver sessions over ADNL-TCP and the pool balancing queries across them

pub mod config;
pub mod hook;
pub mod pool;
pub mod session;
pub mod types;


pub use config::PoolConfig;
pub use hook::{
    DisconnectEvent, DisconnectHook, DisconnectReason, FixedRetry, NeverReconnect,
    ReconnectDecision, ReconnectPolicy,
};
pub use pool::Pool;
pub use session::{Connector, Session, SessionState, TcpConnector};
pub use types::{NodeInfo, PeerReport, PeerStats, PoolError, SessionError};
