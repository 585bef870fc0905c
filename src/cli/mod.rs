use crate::liteclient::{Pool, PoolConfig};
use crate::network_config::{ConfigGlobal, MAINNET_CONFIG_URL, TESTNET_CONFIG_URL};
use crate::tvm::deserialize_boc_roots;
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// tonlink-rs CLI
#[derive(Parser, Debug)]
#[command(name = "tonlink-rs")]
#[command(about = "TON cell codec and liteserver transport", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a bag of cells and print every root as a cell tree
    BocDump {
        /// BOC as hex or base64
        boc: String,
    },
    /// Connect a pool to several liteservers and query them through it
    Probe {
        /// Number of liteservers to use
        #[arg(short = 'n', long, default_value = "3")]
        num_servers: usize,
        /// Global config file; downloaded when absent
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
        /// Use the testnet global config
        #[arg(long)]
        testnet: bool,
        /// Query timeout in milliseconds
        #[arg(short = 't', long, default_value = "10000")]
        timeout_ms: u64,
    },
}

async fn download_config(testnet: bool) -> Result<String> {
    let url = if testnet {
        TESTNET_CONFIG_URL
    } else {
        MAINNET_CONFIG_URL
    };
    tokio::task::spawn_blocking(move || {
        let mut response = ureq::get(url).call().map_err(|e| {
            anyhow::anyhow!("Error occurred while fetching config from {}: {:?}.", url, e)
        })?;
        if response.status() != 200 {
            return Err(anyhow::anyhow!(
                "Url {} responded with error code {}",
                url,
                response.status()
            ));
        }
        Ok(response.body_mut().read_to_string()?)
    })
    .await?
}

fn decode_boc_text(input: &str) -> Result<Vec<u8>> {
    let input = input.trim();
    if input.len() % 2 == 0 && input.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Ok(hex::decode(input)?);
    }
    STANDARD
        .decode(input)
        .context("BOC is neither hex nor base64")
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Execute the command
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::BocDump { boc } => self.execute_boc_dump(boc),
            Commands::Probe {
                num_servers,
                config,
                testnet,
                timeout_ms,
            } => {
                self.execute_probe(*num_servers, config.as_ref(), *testnet, *timeout_ms)
                    .await
            }
        }
    }

    fn execute_boc_dump(&self, boc: &str) -> Result<()> {
        let raw = decode_boc_text(boc)?;
        let roots = deserialize_boc_roots(&raw)?;

        for (i, root) in roots.iter().enumerate() {
            println!("root {i}: hash {} depth {}", root.hash_hex(), root.depth());
            println!("{root}");
        }
        Ok(())
    }

    async fn execute_probe(
        &self,
        num_servers: usize,
        config_path: Option<&PathBuf>,
        testnet: bool,
        timeout_ms: u64,
    ) -> Result<()> {
        let config_json = match config_path {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?,
            None => download_config(testnet).await?,
        };
        let config = ConfigGlobal::from_str(&config_json)?;

        let mut nodes = config.nodes();
        nodes.shuffle(&mut rand::thread_rng());
        nodes.truncate(num_servers);
        log::info!("Connecting to {} liteservers...", nodes.len());

        let pool_config = PoolConfig {
            query_timeout: Duration::from_millis(timeout_ms),
            ..PoolConfig::default()
        };
        let init_start = Instant::now();
        let pool = Pool::connect(nodes, pool_config).await?;
        log::info!(
            "{}/{} sessions ready in {:.3}s",
            pool.ready_peers_num(),
            pool.peers_num(),
            init_start.elapsed().as_secs_f64()
        );

        let op_start = Instant::now();
        let now = pool.get_time().await?;
        log::info!("Server time {} ({:.3}s)", now, op_start.elapsed().as_secs_f64());

        let op_start = Instant::now();
        let version = pool.get_version().await?;
        log::info!(
            "LiteServer version {} mode {} capabilities {} ({:.3}s)",
            version.version,
            version.mode,
            version.capabilities,
            op_start.elapsed().as_secs_f64()
        );

        let op_start = Instant::now();
        let info = pool.get_masterchain_info().await?;
        log::info!(
            "Masterchain info: {} ({:.3}s)",
            info,
            op_start.elapsed().as_secs_f64()
        );

        for peer in pool.stats() {
            log::info!(
                "{}: {:?}, {} requests, avg {} ms",
                peer.node,
                peer.state,
                peer.stats.total_requests,
                peer.stats.avg_response_time_ms
            );
        }

        pool.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boc_text_accepts_hex_and_base64() {
        let from_hex = decode_boc_text("b5ee9c724101010100020000004cacb9cd").unwrap();
        let from_base64 = decode_boc_text(" te6cckEBAQEAAgAAAEysuc0= ").unwrap();
        assert_eq!(from_hex, from_base64);
        assert!(decode_boc_text("not a boc!").is_err());
    }

    #[test]
    fn parses_probe_arguments() {
        let cli = Cli::try_parse_from(["tonlink-rs", "probe", "-n", "2", "--testnet"]).unwrap();
        match cli.command {
            Commands::Probe {
                num_servers,
                testnet,
                config,
                timeout_ms,
            } => {
                assert_eq!(num_servers, 2);
                assert!(testnet);
                assert!(config.is_none());
                assert_eq!(timeout_ms, 10_000);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn boc_dump_runs() {
        let cli = Cli::try_parse_from(["tonlink-rs", "boc-dump", "te6cckEBAQEAAgAAAEysuc0="]).unwrap();
        assert!(tokio_test::block_on(cli.execute()).is_ok());
    }
}
