use async_trait::async_trait;
use sb_api_types::{ConfirmationStatus, TransferRecord, TxSignature, WalletAddress};
use sb_crypto::Signer;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::{GatewayError, LedgerGateway};

/// Lamports charged per transaction signature, matching Solana's base fee.
pub const DEFAULT_SIGNATURE_FEE: u64 = 5_000;

const ENDPOINT: &str = "memory://ledger";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    GetBalance(WalletAddress),
    RequestFunds(WalletAddress, u64),
    AwaitConfirmation(TxSignature),
    SubmitTransfer(TransferRecord),
}

#[derive(Debug, Clone)]
struct PendingCredit {
    address: WalletAddress,
    lamports: u64,
}

#[derive(Debug)]
struct LedgerState {
    balances: HashMap<WalletAddress, u64>,
    pending: HashMap<TxSignature, PendingCredit>,
    faucet_available: bool,
    offline: bool,
    expire_next: usize,
    sequence: u64,
    calls: Vec<LedgerCall>,
}

/// Deterministic in-process ledger for tests and offline runs.
///
/// Faucet credits land when their confirmation is awaited, so an expired or
/// never-awaited request leaves the balance untouched.
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    signature_fee: u64,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                balances: HashMap::new(),
                pending: HashMap::new(),
                faucet_available: true,
                offline: false,
                expire_next: 0,
                sequence: 0,
                calls: Vec::new(),
            }),
            signature_fee: DEFAULT_SIGNATURE_FEE,
        }
    }

    pub fn with_signature_fee(mut self, lamports: u64) -> Self {
        self.signature_fee = lamports;
        self
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn credit(&self, address: &WalletAddress, lamports: u64) {
        let mut state = self.state();
        *state.balances.entry(address.clone()).or_default() += lamports;
    }

    pub fn balance_of(&self, address: &WalletAddress) -> u64 {
        self.state().balances.get(address).copied().unwrap_or(0)
    }

    /// Makes the faucet reject requests, like a rate-limited devnet faucet.
    pub fn set_faucet_available(&self, available: bool) {
        self.state().faucet_available = available;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// The next `count` awaited confirmations report `Expired`.
    pub fn expire_next_confirmations(&self, count: usize) {
        self.state().expire_next = count;
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state().calls.clone()
    }

    pub fn submissions(&self) -> Vec<TransferRecord> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                LedgerCall::SubmitTransfer(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    fn next_request_id(state: &mut LedgerState) -> TxSignature {
        state.sequence += 1;
        let mut raw = [0_u8; 64];
        raw[..8].copy_from_slice(&state.sequence.to_le_bytes());
        raw[8..16].copy_from_slice(b"faucet::");
        TxSignature::from_bytes(&raw)
    }

    fn ensure_online(state: &LedgerState) -> Result<(), GatewayError> {
        if state.offline {
            return Err(GatewayError::Network("ledger endpoint unreachable".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    async fn get_balance(&self, address: &WalletAddress) -> Result<u64, GatewayError> {
        let mut state = self.state();
        state.calls.push(LedgerCall::GetBalance(address.clone()));
        Self::ensure_online(&state)?;
        Ok(state.balances.get(address).copied().unwrap_or(0))
    }

    async fn request_funds(
        &self,
        address: &WalletAddress,
        lamports: u64,
    ) -> Result<TxSignature, GatewayError> {
        let mut state = self.state();
        state
            .calls
            .push(LedgerCall::RequestFunds(address.clone(), lamports));
        Self::ensure_online(&state)?;

        if !state.faucet_available {
            return Err(GatewayError::FaucetUnavailable(
                "airdrop request limit reached".to_owned(),
            ));
        }

        let request_id = Self::next_request_id(&mut state);
        state.pending.insert(
            request_id.clone(),
            PendingCredit {
                address: address.clone(),
                lamports,
            },
        );
        debug!("faucet request {} queued for {}", request_id, address);
        Ok(request_id)
    }

    async fn await_confirmation(
        &self,
        request_id: &TxSignature,
    ) -> Result<ConfirmationStatus, GatewayError> {
        let mut state = self.state();
        state
            .calls
            .push(LedgerCall::AwaitConfirmation(request_id.clone()));
        Self::ensure_online(&state)?;

        let Some(credit) = state.pending.remove(request_id) else {
            return Err(GatewayError::InvalidResponse(format!(
                "unknown request id {request_id}"
            )));
        };

        if state.expire_next > 0 {
            state.expire_next -= 1;
            return Ok(ConfirmationStatus::Expired);
        }

        *state.balances.entry(credit.address).or_default() += credit.lamports;
        Ok(ConfirmationStatus::Confirmed)
    }

    async fn submit_transfer(
        &self,
        record: &TransferRecord,
        signer: &dyn Signer,
    ) -> Result<TxSignature, GatewayError> {
        let mut state = self.state();
        state.calls.push(LedgerCall::SubmitTransfer(record.clone()));
        Self::ensure_online(&state)?;

        if signer.address() != record.source {
            return Err(GatewayError::Submission(format!(
                "signature mismatch: signer {} does not own {}",
                signer.address(),
                record.source
            )));
        }

        let required = record.lamports.saturating_add(self.signature_fee);
        let available = state.balances.get(&record.source).copied().unwrap_or(0);
        if available < required {
            return Err(GatewayError::Submission(format!(
                "insufficient funds: {available} lamports available, {required} required"
            )));
        }

        state.sequence += 1;
        let message = format!(
            "{}:{}:{}:{}:{}",
            record.id, record.source, record.destination, record.lamports, state.sequence
        );
        let signature = signer
            .sign(message.as_bytes())
            .map_err(|err| GatewayError::Submission(err.to_string()))?;

        state.balances.insert(record.source.clone(), available - required);
        *state
            .balances
            .entry(record.destination.clone())
            .or_default() += record.lamports;

        Ok(TxSignature::from_bytes(&signature))
    }
}
