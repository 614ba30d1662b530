use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sb_api_types::{Cluster, Commitment, ConfirmationStatus, TransferRecord, TxSignature, WalletAddress};
use sb_chain_client::{GatewayError, LedgerGateway};
use sb_crypto::Signer;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

mod rpc;
pub mod transaction;

use rpc::{LatestBlockhash, RpcClient, RpcFailure, SignatureStatus, WithContext};

#[derive(Debug, Clone)]
pub struct SolanaRpcConfig {
    pub endpoint: String,
    pub commitment: Commitment,
    /// Pause between signature-status polls while waiting for confirmation.
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for SolanaRpcConfig {
    fn default() -> Self {
        Self::for_cluster(&Cluster::Devnet)
    }
}

impl SolanaRpcConfig {
    pub fn for_cluster(cluster: &Cluster) -> Self {
        Self {
            endpoint: cluster.rpc_url().trim_end_matches('/').to_owned(),
            commitment: Commitment::Confirmed,
            poll_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// JSON-RPC gateway to a Solana cluster.
pub struct SolanaRpcGateway {
    rpc: RpcClient,
    config: SolanaRpcConfig,
    /// Blockhash window observed just before each airdrop request.
    airdrop_windows: Mutex<HashMap<TxSignature, LatestBlockhash>>,
}

impl SolanaRpcGateway {
    pub fn new(config: SolanaRpcConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| GatewayError::Network(format!("http client setup: {err}")))?;

        Ok(Self {
            rpc: RpcClient::new(config.endpoint.clone(), http),
            config,
            airdrop_windows: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &SolanaRpcConfig {
        &self.config
    }

    fn airdrop_windows(&self) -> MutexGuard<'_, HashMap<TxSignature, LatestBlockhash>> {
        self.airdrop_windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn commitment_param(&self) -> serde_json::Value {
        json!({ "commitment": self.config.commitment.as_str() })
    }

    async fn latest_blockhash(&self) -> Result<LatestBlockhash, GatewayError> {
        let response: WithContext<LatestBlockhash> = self
            .rpc
            .call("getLatestBlockhash", json!([self.commitment_param()]))
            .await
            .map_err(|err| err.into_gateway("getLatestBlockhash"))?;
        Ok(response.value)
    }

    async fn block_height(&self) -> Result<u64, GatewayError> {
        self.rpc
            .call("getBlockHeight", json!([self.commitment_param()]))
            .await
            .map_err(|err| err.into_gateway("getBlockHeight"))
    }

    async fn signature_status(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<SignatureStatus>, GatewayError> {
        let response: WithContext<Vec<Option<SignatureStatus>>> = self
            .rpc
            .call(
                "getSignatureStatuses",
                json!([[signature.as_str()], { "searchTransactionHistory": false }]),
            )
            .await
            .map_err(|err| err.into_gateway("getSignatureStatuses"))?;
        Ok(response.value.into_iter().next().flatten())
    }

    /// Polls until `signature` reaches the configured commitment or the block
    /// height passes the window's last valid height.
    async fn confirm_within(
        &self,
        signature: &TxSignature,
        window: &LatestBlockhash,
    ) -> Result<ConfirmationStatus, GatewayError> {
        loop {
            if let Some(status) = self.signature_status(signature).await? {
                if let Some(err) = status.err.as_ref() {
                    return Err(GatewayError::Submission(format!(
                        "transaction {signature} failed: {err}"
                    )));
                }
                if status
                    .level()
                    .is_some_and(|level| level >= self.config.commitment)
                {
                    return Ok(ConfirmationStatus::Confirmed);
                }
            }

            let height = self.block_height().await?;
            if height > window.last_valid_block_height {
                warn!(
                    "signature {} expired at block height {} (last valid {})",
                    signature, height, window.last_valid_block_height
                );
                return Ok(ConfirmationStatus::Expired);
            }

            debug!(
                "signature {} pending at height {}/{}",
                signature, height, window.last_valid_block_height
            );
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

fn decode_blockhash(blockhash: &str) -> Result<[u8; 32], GatewayError> {
    let bytes = bs58::decode(blockhash)
        .into_vec()
        .map_err(|err| GatewayError::InvalidResponse(format!("blockhash {blockhash}: {err}")))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| GatewayError::InvalidResponse(format!("blockhash {blockhash} is not 32 bytes")))
}

#[async_trait]
impl LedgerGateway for SolanaRpcGateway {
    fn endpoint(&self) -> &str {
        self.rpc.endpoint()
    }

    async fn get_balance(&self, address: &WalletAddress) -> Result<u64, GatewayError> {
        let response: WithContext<u64> = self
            .rpc
            .call("getBalance", json!([address.as_str(), self.commitment_param()]))
            .await
            .map_err(|err| err.into_gateway("getBalance"))?;
        Ok(response.value)
    }

    async fn request_funds(
        &self,
        address: &WalletAddress,
        lamports: u64,
    ) -> Result<TxSignature, GatewayError> {
        info!("requesting airdrop of {} lamports to {}", lamports, address);
        // The faucet's transaction can be no older than this window.
        let window = self.latest_blockhash().await?;
        let signature: String = self
            .rpc
            .call(
                "requestAirdrop",
                json!([address.as_str(), lamports, self.commitment_param()]),
            )
            .await
            .map_err(|err| match err {
                RpcFailure::Rejected { code, message } => {
                    GatewayError::FaucetUnavailable(format!("rpc error {code}: {message}"))
                }
                other => other.into_gateway("requestAirdrop"),
            })?;

        let request_id = TxSignature(signature);
        self.airdrop_windows().insert(request_id.clone(), window);
        Ok(request_id)
    }

    /// Waits on the window captured by `request_funds`. Signatures this
    /// gateway did not request fall back to the current window.
    async fn await_confirmation(
        &self,
        request_id: &TxSignature,
    ) -> Result<ConfirmationStatus, GatewayError> {
        let captured = self.airdrop_windows().remove(request_id);
        let window = match captured {
            Some(window) => window,
            None => self.latest_blockhash().await?,
        };
        self.confirm_within(request_id, &window).await
    }

    async fn submit_transfer(
        &self,
        record: &TransferRecord,
        signer: &dyn Signer,
    ) -> Result<TxSignature, GatewayError> {
        if signer.address() != record.source {
            return Err(GatewayError::Submission(format!(
                "signature mismatch: signer {} does not own {}",
                signer.address(),
                record.source
            )));
        }
        if record.source == record.destination {
            return Err(GatewayError::Submission(
                "source and destination are the same account".to_owned(),
            ));
        }

        let from = record
            .source
            .to_public_key()
            .map_err(|err| GatewayError::Submission(format!("source: {err}")))?;
        let to = record
            .destination
            .to_public_key()
            .map_err(|err| GatewayError::Submission(format!("destination: {err}")))?;

        let window = self.latest_blockhash().await?;
        let blockhash = decode_blockhash(&window.blockhash)?;

        let message = transaction::transfer_message(&from, &to, record.lamports, &blockhash);
        let signature = signer
            .sign(&message)
            .map_err(|err| GatewayError::Submission(format!("signing failed: {err}")))?;
        let wire = transaction::wire_transaction(&[signature], &message);

        let sent: String = self
            .rpc
            .call(
                "sendTransaction",
                json!([
                    STANDARD.encode(&wire),
                    {
                        "encoding": "base64",
                        "preflightCommitment": self.config.commitment.as_str(),
                    }
                ]),
            )
            .await
            .map_err(|err| match err {
                RpcFailure::Rejected { code, message } => {
                    GatewayError::Submission(format!("rpc error {code}: {message}"))
                }
                other => other.into_gateway("sendTransaction"),
            })?;
        let signature = TxSignature(sent);
        info!(
            "transfer {} broadcast as {}, awaiting confirmation",
            record.id, signature
        );

        match self.confirm_within(&signature, &window).await? {
            ConfirmationStatus::Confirmed => Ok(signature),
            ConfirmationStatus::Expired => Err(GatewayError::ConfirmationExpired(signature)),
        }
    }
}
