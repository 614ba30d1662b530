use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is not valid base58: {0}")]
    Encoding(String),
    #[error("address must decode to 32 bytes, got {0}")]
    Length(usize),
}

/// Base58 encoding of a 32-byte ed25519 public key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self(bs58::encode(public_key).into_string())
    }

    pub fn parse(value: &str) -> Result<Self, AddressError> {
        let address = Self(value.trim().to_owned());
        address.to_public_key()?;
        Ok(address)
    }

    pub fn to_public_key(&self) -> Result<[u8; 32], AddressError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|err| AddressError::Encoding(err.to_string()))?;
        <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| AddressError::Length(bytes.len()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base58 transaction signature. Also serves as the request id of a faucet credit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TxSignature(pub String);

impl TxSignature {
    pub fn from_bytes(signature: &[u8]) -> Self {
        Self(bs58::encode(signature).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Confirmed,
    Expired,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Cluster {
    #[default]
    Devnet,
    Testnet,
    MainnetBeta,
    Localnet,
    Custom(String),
}

impl Cluster {
    pub fn rpc_url(&self) -> &str {
        match self {
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Cluster::Localnet => "http://127.0.0.1:8899",
            Cluster::Custom(url) => url,
        }
    }

    /// Only test networks run a faucet.
    pub fn has_faucet(&self) -> bool {
        !matches!(self, Cluster::MainnetBeta)
    }
}

impl FromStr for Cluster {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "devnet" => Ok(Cluster::Devnet),
            "testnet" => Ok(Cluster::Testnet),
            "mainnet-beta" | "mainnet" => Ok(Cluster::MainnetBeta),
            "localnet" | "localhost" => Ok(Cluster::Localnet),
            url if url.starts_with("http://") || url.starts_with("https://") => {
                Ok(Cluster::Custom(url.trim_end_matches('/').to_owned()))
            }
            other => Err(format!("unknown cluster: {other}")),
        }
    }
}

/// One attempt to move lamports from the generated account to the connected wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferRecord {
    pub id: Uuid,
    pub source: WalletAddress,
    pub destination: WalletAddress,
    pub lamports: u64,
    pub signature: Option<TxSignature>,
}

impl TransferRecord {
    pub fn new(source: WalletAddress, destination: WalletAddress, lamports: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            destination,
            lamports,
            signature: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderAbsent,
    UserRejected,
    NetworkError,
    FaucetUnavailable,
    ConfirmationExpired,
    SubmissionError,
    InvalidAction,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ProviderAbsent => "provider_absent",
            ErrorKind::UserRejected => "user_rejected",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::FaucetUnavailable => "faucet_unavailable",
            ErrorKind::ConfirmationExpired => "confirmation_expired",
            ErrorKind::SubmissionError => "submission_error",
            ErrorKind::InvalidAction => "invalid_action",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoProvider,
    ProviderReady,
    WalletConnected,
    AccountGenerated,
    AccountFunded,
    TransferComplete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionError {
    pub action: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Everything the presentation layer needs to render a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub provider_present: bool,
    pub wallet_address: Option<WalletAddress>,
    pub account_address: Option<WalletAddress>,
    pub account_balance: Option<u64>,
    pub funded: bool,
    pub last_transfer: Option<TransferRecord>,
    pub last_error: Option<ActionError>,
}

impl SessionSnapshot {
    pub fn empty(provider_present: bool) -> Self {
        Self {
            state: if provider_present {
                SessionState::ProviderReady
            } else {
                SessionState::NoProvider
            },
            provider_present,
            wallet_address: None,
            account_address: None,
            account_balance: None,
            funded: false,
            last_transfer: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConnectResponse {
    pub wallet_address: WalletAddress,
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountFundResponse {
    pub account_address: WalletAddress,
    pub request_id: TxSignature,
    pub balance_lamports: u64,
    pub balance_sol: f64,
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountBalanceResponse {
    pub account_address: WalletAddress,
    pub balance_lamports: u64,
    pub balance_sol: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferResponse {
    pub transfer: TransferRecord,
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}
