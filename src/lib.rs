pub mod adnl;
pub mod cli;
pub mod crc;
pub mod liteclient;
pub mod network_config;
pub mod tl;
pub mod tvm;
pub mod utils;
