//! Wallet provider capability surface.
//!
//! A wallet provider is the object a host (browser extension, desktop shell)
//! injects into its global namespace to broker user approval for connecting
//! and signing. The session never probes the host itself: [`locate`] runs once
//! and the resulting [`Provider`] is passed around explicitly.

use async_trait::async_trait;
use sb_api_types::WalletAddress;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

mod keypair;
mod locator;

pub use keypair::KeypairWallet;
pub use locator::{HostEnvironment, PROVIDER_GLOBAL, Provider, ProviderHandle, StaticHost, locate};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("user rejected the request: {0}")]
    UserRejected(String),
    #[error("wallet is not connected")]
    NotConnected,
    #[error("wallet does not support {0}")]
    Unsupported(String),
    #[error("invalid request params: {0}")]
    InvalidParams(String),
    #[error("signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOpts {
    /// Succeed silently only when the site is already trusted; never prompt.
    pub only_if_trusted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayEncoding {
    #[default]
    Utf8,
    Hex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEvent {
    Connect,
    Disconnect,
    AccountChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderNotice {
    Connected(WalletAddress),
    Disconnected,
    AccountChanged(Option<WalletAddress>),
}

impl ProviderNotice {
    pub fn event(&self) -> ProviderEvent {
        match self {
            ProviderNotice::Connected(_) => ProviderEvent::Connect,
            ProviderNotice::Disconnected => ProviderEvent::Disconnect,
            ProviderNotice::AccountChanged(_) => ProviderEvent::AccountChanged,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&ProviderNotice) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Connect,
    Disconnect,
    SignTransaction,
    SignAllTransactions,
    SignMessage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub sign_transaction: bool,
    pub sign_message: bool,
    pub connect: bool,
    pub disconnect: bool,
}

impl Capabilities {
    pub fn full() -> Self {
        Self {
            sign_transaction: true,
            sign_message: true,
            connect: true,
            disconnect: true,
        }
    }

    /// Methods a provider must expose before the session will use it.
    pub fn covers_session(&self) -> bool {
        self.connect && self.disconnect && self.sign_transaction
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    pub signature: Vec<u8>,
    pub public_key: WalletAddress,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Marker flag identifying a compatible extension.
    fn is_phantom(&self) -> bool;
    fn capabilities(&self) -> Capabilities;
    fn is_connected(&self) -> bool;
    fn public_key(&self) -> Option<WalletAddress>;

    async fn connect(&self, opts: ConnectOpts) -> Result<WalletAddress, ProviderError>;
    async fn disconnect(&self) -> Result<(), ProviderError>;

    /// Returns the detached signature over a serialized transaction message.
    async fn sign_transaction(&self, message: &[u8]) -> Result<Vec<u8>, ProviderError>;
    async fn sign_all_transactions(
        &self,
        messages: &[Vec<u8>],
    ) -> Result<Vec<Vec<u8>>, ProviderError>;
    async fn sign_message(
        &self,
        message: &[u8],
        display: DisplayEncoding,
    ) -> Result<SignedMessage, ProviderError>;

    fn on(&self, event: ProviderEvent, handler: EventHandler);

    /// Untyped entry point. Byte payloads travel base58-encoded.
    async fn request(&self, method: RequestMethod, params: Value) -> Result<Value, ProviderError> {
        match method {
            RequestMethod::Connect => {
                let opts = ConnectOpts {
                    only_if_trusted: params["onlyIfTrusted"].as_bool().unwrap_or(false),
                };
                let public_key = self.connect(opts).await?;
                Ok(json!({ "publicKey": public_key.as_str() }))
            }
            RequestMethod::Disconnect => {
                self.disconnect().await?;
                Ok(Value::Null)
            }
            RequestMethod::SignTransaction => {
                let message = decode_param(&params["message"])?;
                let signature = self.sign_transaction(&message).await?;
                Ok(json!({ "signature": bs58::encode(signature).into_string() }))
            }
            RequestMethod::SignAllTransactions => {
                let messages = params["messages"]
                    .as_array()
                    .ok_or_else(|| ProviderError::InvalidParams("messages must be an array".to_owned()))?
                    .iter()
                    .map(decode_param)
                    .collect::<Result<Vec<_>, _>>()?;
                let signatures = self.sign_all_transactions(&messages).await?;
                let encoded: Vec<String> = signatures
                    .iter()
                    .map(|signature| bs58::encode(signature).into_string())
                    .collect();
                Ok(json!({ "signatures": encoded }))
            }
            RequestMethod::SignMessage => {
                let message = decode_param(&params["message"])?;
                let display = match params["display"].as_str() {
                    Some("hex") => DisplayEncoding::Hex,
                    _ => DisplayEncoding::Utf8,
                };
                let signed = self.sign_message(&message, display).await?;
                Ok(json!({
                    "signature": bs58::encode(&signed.signature).into_string(),
                    "publicKey": signed.public_key.as_str(),
                }))
            }
        }
    }
}

fn decode_param(value: &Value) -> Result<Vec<u8>, ProviderError> {
    let encoded = value
        .as_str()
        .ok_or_else(|| ProviderError::InvalidParams("expected a base58 string".to_owned()))?;
    bs58::decode(encoded)
        .into_vec()
        .map_err(|err| ProviderError::InvalidParams(err.to_string()))
}
