//! Disconnect notifications and the reconnection policy they drive.
//!
//! A session consults its hook synchronously whenever it leaves `Ready`
//! unexpectedly, when a pool fails to bring it up, and when an explicit
//! reconnect gives up. The hook answers with a [`ReconnectDecision`].

use crate::liteclient::types::NodeInfo;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// A Ready session lost its connection
    ConnectionLost,
    /// The initial handshake of a pool member failed
    HandshakeFailed,
    /// Every attempt of a reconnect policy failed
    ReconnectExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectEvent {
    pub node: NodeInfo,
    pub reason: DisconnectReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Reconnect(ReconnectPolicy),
    Abandon,
}

pub trait DisconnectHook: Send + Sync {
    fn on_disconnect(&self, event: &DisconnectEvent) -> ReconnectDecision;
}

impl<F> DisconnectHook for F
where
    F: Fn(&DisconnectEvent) -> ReconnectDecision + Send + Sync,
{
    fn on_disconnect(&self, event: &DisconnectEvent) -> ReconnectDecision {
        self(event)
    }
}

/// Default hook: retry with a fixed policy, give up once it is exhausted
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRetry {
    policy: ReconnectPolicy,
}

impl FixedRetry {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy }
    }
}

impl DisconnectHook for FixedRetry {
    fn on_disconnect(&self, event: &DisconnectEvent) -> ReconnectDecision {
        match event.reason {
            DisconnectReason::ConnectionLost | DisconnectReason::HandshakeFailed => {
                ReconnectDecision::Reconnect(self.policy)
            }
            DisconnectReason::ReconnectExhausted => {
                log::warn!("giving up on {}", event.node);
                ReconnectDecision::Abandon
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReconnect;

impl DisconnectHook for NeverReconnect {
    fn on_disconnect(&self, _event: &DisconnectEvent) -> ReconnectDecision {
        ReconnectDecision::Abandon
    }
}

/// Hook slot shared by every session of a pool; replacing it affects them all
#[derive(Clone)]
pub(crate) struct SharedHook(Arc<RwLock<Arc<dyn DisconnectHook>>>);

impl SharedHook {
    pub(crate) fn new(hook: Arc<dyn DisconnectHook>) -> Self {
        Self(Arc::new(RwLock::new(hook)))
    }

    pub(crate) fn replace(&self, hook: Arc<dyn DisconnectHook>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = hook;
    }

    /// Runs the current hook outside the lock
    pub(crate) fn notify(&self, event: &DisconnectEvent) -> ReconnectDecision {
        let hook = self.0.read().unwrap_or_else(PoisonError::into_inner).clone();
        hook.on_disconnect(event)
    }
}
