//! request funds -> wait for confirmation -> read balance.

use sb_api_types::{ConfirmationStatus, TxSignature, WalletAddress, lamports_to_sol};
use sb_chain_client::LedgerGateway;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, timed};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingReport {
    pub request_id: TxSignature,
    pub balance: u64,
}

/// Runs one funding round. Each failure short-circuits; nothing is retried.
/// Running it again on a funded account simply requests another credit.
pub async fn fund_account(
    gateway: &dyn LedgerGateway,
    address: &WalletAddress,
    config: &SessionConfig,
) -> Result<FundingReport, SessionError> {
    info!(
        "airdropping {} SOL to generated account {}",
        lamports_to_sol(config.funding_lamports),
        address
    );

    let request_id = gateway
        .request_funds(address, config.funding_lamports)
        .await
        .map_err(|err| {
            warn!("faucet request for {} failed: {}", address, err);
            SessionError::from(err)
        })?;

    let status = gateway.await_confirmation(&request_id).await.map_err(|err| {
        warn!("confirmation of {} failed: {}", request_id, err);
        SessionError::from(err)
    })?;

    if status == ConfirmationStatus::Expired {
        warn!(
            "airdrop {} expired before confirmation; {} stays unfunded",
            request_id, address
        );
        return Err(SessionError::ConfirmationExpired(request_id.0));
    }
    info!("airdrop {} confirmed", request_id);

    let balance = timed(config.rpc_timeout, "getBalance", gateway.get_balance(address)).await?;
    info!(
        "generated account {} balance: {} SOL",
        address,
        lamports_to_sol(balance)
    );

    Ok(FundingReport {
        request_id,
        balance,
    })
}
