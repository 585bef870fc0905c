//! Model of the public TON global config: the list of liteservers and their keys

use crate::liteclient::NodeInfo;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

#[cfg(test)]
mod tests;

pub const MAINNET_CONFIG_URL: &str = "https://ton.org/global.config.json";
pub const TESTNET_CONFIG_URL: &str = "https://ton.org/testnet-global.config.json";

/// IPv4 address stored in the config as a signed 32-bit integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub struct LiteServerAddress(pub Ipv4Addr);

impl From<i32> for LiteServerAddress {
    fn from(ip: i32) -> Self {
        Self(Ipv4Addr::from(ip as u32))
    }
}

impl From<LiteServerAddress> for i32 {
    fn from(addr: LiteServerAddress) -> Self {
        u32::from(addr.0) as i32
    }
}

impl Deref for LiteServerAddress {
    type Target = Ipv4Addr;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for LiteServerAddress {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ConfigPublicKey {
    #[serde(rename = "pub.ed25519")]
    Ed25519 {
        #[serde_as(as = "Base64")]
        key: [u8; 32],
    },
}

impl From<ConfigPublicKey> for [u8; 32] {
    fn from(key: ConfigPublicKey) -> Self {
        match key {
            ConfigPublicKey::Ed25519 { key } => key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLiteServer {
    pub ip: LiteServerAddress,
    pub port: u16,
    pub id: ConfigPublicKey,
}

impl ConfigLiteServer {
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip.0, self.port)
    }

    pub fn node_info(&self) -> NodeInfo {
        NodeInfo {
            addr: SocketAddr::V4(self.socket_addr()),
            public_key: self.id.into(),
        }
    }
}

impl From<&ConfigLiteServer> for NodeInfo {
    fn from(server: &ConfigLiteServer) -> Self {
        server.node_info()
    }
}

/// Only the liteserver list is modelled; other sections of the file are ignored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigGlobal {
    pub liteservers: Vec<ConfigLiteServer>,
}

impl ConfigGlobal {
    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.liteservers.iter().map(NodeInfo::from).collect()
    }
}

impl FromStr for ConfigGlobal {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}
