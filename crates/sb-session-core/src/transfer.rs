//! One-shot transfer from the generated account to the connected wallet.

use sb_api_types::{TransferRecord, WalletAddress, lamports_to_sol};
use sb_chain_client::LedgerGateway;
use sb_crypto::{GeneratedAccount, Signer};
use sb_wallet_provider::{ConnectOpts, ProviderHandle};
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, timed};

/// Connect-if-needed handshake. Always goes through the provider so an
/// already connected wallet hands back a fresh acknowledgment.
pub async fn confirm_destination(
    provider: &ProviderHandle,
    opts: ConnectOpts,
) -> Result<WalletAddress, SessionError> {
    let was_connected = provider.is_connected();

    let address = provider.connect(opts).await.map_err(|err| {
        warn!("wallet handshake before transfer failed: {}", err);
        SessionError::from(err)
    })?;

    if was_connected {
        info!("wallet account {} re-confirmed", address);
    } else {
        info!("wallet account {} connected for transfer", address);
    }
    Ok(address)
}

/// Reads the source balance, builds the record and submits it signed by the
/// generated account. The balance only blocks submission when
/// `require_covering_balance` is set.
pub async fn submit(
    gateway: &dyn LedgerGateway,
    account: &GeneratedAccount,
    destination: &WalletAddress,
    config: &SessionConfig,
) -> Result<TransferRecord, SessionError> {
    let source = account.address();

    let balance = timed(config.rpc_timeout, "getBalance", gateway.get_balance(&source)).await?;
    info!("sender wallet balance: {} SOL", lamports_to_sol(balance));

    let required = config
        .transfer_lamports
        .saturating_add(config.fee_reserve_lamports);
    if balance < required {
        if config.require_covering_balance {
            warn!(
                "refusing transfer from {}: {} lamports available, {} required",
                source, balance, required
            );
            return Err(SessionError::Submission(format!(
                "insufficient funds: {balance} lamports available, {required} required"
            )));
        }
        warn!(
            "balance of {} ({} lamports) is below the {} lamports needed; submitting anyway",
            source, balance, required
        );
    }

    let mut record = TransferRecord::new(source, destination.clone(), config.transfer_lamports);
    info!(
        "sending {} SOL to {} (transfer {})",
        lamports_to_sol(record.lamports),
        record.destination,
        record.id
    );

    let signature = gateway
        .submit_transfer(&record, account)
        .await
        .map_err(|err| {
            warn!("transfer {} abandoned: {}", record.id, err);
            SessionError::from(err)
        })?;

    if signature.is_empty() {
        return Err(SessionError::Submission(
            "ledger returned an empty signature".to_owned(),
        ));
    }

    info!("transfer {} sent, signature {}", record.id, signature);
    record.signature = Some(signature);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_api_types::LAMPORTS_PER_SOL;
    use sb_chain_client::{InMemoryLedger, LedgerCall};

    fn wallet() -> WalletAddress {
        WalletAddress::from_public_key(&[12_u8; 32])
    }

    #[tokio::test]
    async fn shortfall_is_logged_but_submitted_by_default() {
        let ledger = InMemoryLedger::new();
        let account = GeneratedAccount::generate();
        ledger.credit(&account.address(), 2 * LAMPORTS_PER_SOL);

        let err = submit(&ledger, &account, &wallet(), &SessionConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Submission(_)));
        assert_eq!(ledger.submissions().len(), 1);
        assert_eq!(ledger.balance_of(&account.address()), 2 * LAMPORTS_PER_SOL);
    }

    #[tokio::test]
    async fn covering_balance_gate_stops_before_construction() {
        let ledger = InMemoryLedger::new();
        let account = GeneratedAccount::generate();
        ledger.credit(&account.address(), 2 * LAMPORTS_PER_SOL);
        let config = SessionConfig {
            require_covering_balance: true,
            ..SessionConfig::default()
        };

        let err = submit(&ledger, &account, &wallet(), &config)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("insufficient funds"));
        assert_eq!(
            ledger.calls(),
            vec![LedgerCall::GetBalance(account.address())]
        );
    }

    #[tokio::test]
    async fn covered_transfer_returns_a_signed_record() {
        let ledger = InMemoryLedger::new();
        let account = GeneratedAccount::generate();
        ledger.credit(&account.address(), 3 * LAMPORTS_PER_SOL);

        let record = submit(&ledger, &account, &wallet(), &SessionConfig::default())
            .await
            .unwrap();

        assert_eq!(record.source, account.address());
        assert_eq!(record.destination, wallet());
        assert_eq!(record.lamports, 2 * LAMPORTS_PER_SOL);
        assert!(record.signature.as_ref().is_some_and(|sig| !sig.is_empty()));
        assert_eq!(ledger.balance_of(&wallet()), 2 * LAMPORTS_PER_SOL);
    }
}
