use sb_api_types::LAMPORTS_PER_SOL;
use sb_chain_client::DEFAULT_SIGNATURE_FEE;
use sb_wallet_provider::ConnectOpts;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Faucet credit requested for every newly generated account.
    pub funding_lamports: u64,
    /// Fixed amount moved to the connected wallet per transfer.
    pub transfer_lamports: u64,
    /// Headroom kept for the transaction fee when judging the source balance.
    pub fee_reserve_lamports: u64,
    /// Refuse to build a transfer the source balance cannot cover.
    /// Off by default: the shortfall is logged and the ledger decides.
    pub require_covering_balance: bool,
    /// Upper bound for single balance queries.
    pub rpc_timeout: Duration,
    pub connect_opts: ConnectOpts,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            funding_lamports: 2 * LAMPORTS_PER_SOL,
            transfer_lamports: 2 * LAMPORTS_PER_SOL,
            fee_reserve_lamports: DEFAULT_SIGNATURE_FEE,
            require_covering_balance: false,
            rpc_timeout: Duration::from_secs(30),
            connect_opts: ConnectOpts::default(),
        }
    }
}
