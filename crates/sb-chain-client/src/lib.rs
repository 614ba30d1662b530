use async_trait::async_trait;
use sb_api_types::{ConfirmationStatus, TransferRecord, TxSignature, WalletAddress};
use sb_crypto::Signer;
use thiserror::Error;

mod memory;

pub use memory::{DEFAULT_SIGNATURE_FEE, InMemoryLedger, LedgerCall};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("faucet unavailable: {0}")]
    FaucetUnavailable(String),
    #[error("confirmation window expired for {0}")]
    ConfirmationExpired(TxSignature),
    #[error("submission rejected: {0}")]
    Submission(String),
    #[error("unexpected ledger response: {0}")]
    InvalidResponse(String),
}

/// Facade over the ledger's RPC endpoint.
///
/// `get_balance` never blocks forever on its own account, but callers still
/// wrap it in a timeout. `await_confirmation` is the only polling point and
/// is bounded by the ledger's confirmation window.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn get_balance(&self, address: &WalletAddress) -> Result<u64, GatewayError>;

    async fn request_funds(
        &self,
        address: &WalletAddress,
        lamports: u64,
    ) -> Result<TxSignature, GatewayError>;

    async fn await_confirmation(
        &self,
        request_id: &TxSignature,
    ) -> Result<ConfirmationStatus, GatewayError>;

    /// Signs with `signer` and broadcasts. A rejected submission moves no funds.
    async fn submit_transfer(
        &self,
        record: &TransferRecord,
        signer: &dyn Signer,
    ) -> Result<TxSignature, GatewayError>;
}
