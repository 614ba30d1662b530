use anyhow::Context;
use sb_api_types::Cluster;
use sb_chain_solana::SolanaRpcConfig;
use sb_wallet_provider::{KeypairWallet, PROVIDER_GLOBAL, StaticHost};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub(crate) struct ServiceConfig {
    pub(crate) listen_addr: SocketAddr,
    pub(crate) cluster: Cluster,
    /// Keypair file that plays the injected wallet. Unset means no provider.
    pub(crate) wallet_keypair: Option<PathBuf>,
}

impl ServiceConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let value = |key: &str| lookup(key).filter(|raw| !raw.trim().is_empty());

        let cluster = match value("SOLBRIDGE_RPC_URL") {
            Some(url) => url
                .parse::<Cluster>()
                .map_err(anyhow::Error::msg)
                .context("SOLBRIDGE_RPC_URL must be an http(s) URL or a cluster name")?,
            None => value("SOLBRIDGE_CLUSTER")
                .unwrap_or_else(|| "devnet".to_owned())
                .parse::<Cluster>()
                .map_err(anyhow::Error::msg)
                .context("invalid SOLBRIDGE_CLUSTER")?,
        };

        let listen_addr = value("SOLBRIDGE_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned())
            .parse::<SocketAddr>()
            .context("invalid SOLBRIDGE_LISTEN_ADDR")?;

        Ok(Self {
            listen_addr,
            cluster,
            wallet_keypair: value("SOLBRIDGE_WALLET_KEYPAIR").map(PathBuf::from),
        })
    }

    pub(crate) fn rpc_config(&self) -> SolanaRpcConfig {
        if !self.cluster.has_faucet() {
            warn!(
                "{} runs no faucet; account funding will be rejected",
                self.cluster.rpc_url()
            );
        }
        SolanaRpcConfig::for_cluster(&self.cluster)
    }

    /// Builds the host namespace the session probes for a wallet.
    pub(crate) fn host(&self) -> anyhow::Result<StaticHost> {
        let Some(path) = &self.wallet_keypair else {
            info!("SOLBRIDGE_WALLET_KEYPAIR not set; running without a wallet provider");
            return Ok(StaticHost::empty());
        };

        let wallet = KeypairWallet::from_keypair_file(path)
            .with_context(|| format!("failed to load wallet keypair {}", path.display()))?;
        info!("wallet provider backed by {}", path.display());
        Ok(StaticHost::empty().with_global(PROVIDER_GLOBAL, Arc::new(wallet)))
    }
}
