use async_trait::async_trait;
use sb_api_types::WalletAddress;
use sb_crypto::{GeneratedAccount, Signer};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::{
    Capabilities, ConnectOpts, DisplayEncoding, EventHandler, ProviderError, ProviderEvent,
    ProviderNotice, SignedMessage, WalletProvider,
};

/// Wallet provider backed by a keypair held in process.
///
/// Plays the injected extension for headless hosts: approval is a switch
/// instead of a popup, and events are delivered synchronously to handlers.
pub struct KeypairWallet {
    account: GeneratedAccount,
    marker: bool,
    capabilities: Capabilities,
    approving: AtomicBool,
    connected: AtomicBool,
    trusted: AtomicBool,
    connects: AtomicUsize,
    handlers: Mutex<HashMap<ProviderEvent, Vec<EventHandler>>>,
}

impl KeypairWallet {
    pub fn new(account: GeneratedAccount) -> Self {
        Self {
            account,
            marker: true,
            capabilities: Capabilities::full(),
            approving: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            trusted: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub fn generate() -> Self {
        Self::new(GeneratedAccount::generate())
    }

    pub fn from_keypair_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::new(sb_crypto::read_keypair_file(path)?))
    }

    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn address(&self) -> WalletAddress {
        self.account.address()
    }

    /// When false, every prompt is declined as if the user clicked "reject".
    pub fn set_approving(&self, approving: bool) {
        self.approving.store(approving, Ordering::SeqCst);
    }

    /// Number of approved connect prompts so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Simulates the user disconnecting from the extension's own UI.
    pub fn revoke(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.emit(&ProviderNotice::Disconnected);
        }
    }

    /// Simulates the user switching accounts inside the extension. `None`
    /// means the extension no longer exposes any account to this origin.
    pub fn announce_account_change(&self, address: Option<WalletAddress>) {
        self.emit(&ProviderNotice::AccountChanged(address));
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<ProviderEvent, Vec<EventHandler>>> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, notice: &ProviderNotice) {
        let handlers = self
            .handlers()
            .get(&notice.event())
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(notice);
        }
    }

    fn require_approval(&self, prompt: &str) -> Result<(), ProviderError> {
        if self.approving.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::UserRejected(prompt.to_owned()))
        }
    }

    fn require_connected(&self) -> Result<(), ProviderError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::NotConnected)
        }
    }

    fn sign_bytes(&self, payload: &[u8]) -> Result<Vec<u8>, ProviderError> {
        self.account
            .sign(payload)
            .map_err(|err| ProviderError::Signing(err.to_string()))
    }
}

#[async_trait]
impl WalletProvider for KeypairWallet {
    fn is_phantom(&self) -> bool {
        self.marker
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn public_key(&self) -> Option<WalletAddress> {
        self.is_connected().then(|| self.account.address())
    }

    async fn connect(&self, opts: ConnectOpts) -> Result<WalletAddress, ProviderError> {
        if opts.only_if_trusted && !self.trusted.load(Ordering::SeqCst) {
            return Err(ProviderError::UserRejected(
                "site is not trusted yet".to_owned(),
            ));
        }
        self.require_approval("connect")?;

        self.connected.store(true, Ordering::SeqCst);
        self.trusted.store(true, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);

        let address = self.account.address();
        info!("wallet {} approved connection", address);
        self.emit(&ProviderNotice::Connected(address.clone()));
        Ok(address)
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.connected.store(false, Ordering::SeqCst);
        debug!("wallet {} disconnected", self.account.address());
        self.emit(&ProviderNotice::Disconnected);
        Ok(())
    }

    async fn sign_transaction(&self, message: &[u8]) -> Result<Vec<u8>, ProviderError> {
        self.require_connected()?;
        self.require_approval("sign transaction")?;
        self.sign_bytes(message)
    }

    async fn sign_all_transactions(
        &self,
        messages: &[Vec<u8>],
    ) -> Result<Vec<Vec<u8>>, ProviderError> {
        self.require_connected()?;
        self.require_approval("sign all transactions")?;
        messages
            .iter()
            .map(|message| self.sign_bytes(message))
            .collect()
    }

    async fn sign_message(
        &self,
        message: &[u8],
        display: DisplayEncoding,
    ) -> Result<SignedMessage, ProviderError> {
        if !self.capabilities.sign_message {
            return Err(ProviderError::Unsupported("signMessage".to_owned()));
        }
        self.require_connected()?;
        self.require_approval(match display {
            DisplayEncoding::Utf8 => "sign message",
            DisplayEncoding::Hex => "sign message (hex)",
        })?;

        Ok(SignedMessage {
            signature: self.sign_bytes(message)?,
            public_key: self.account.address(),
        })
    }

    fn on(&self, event: ProviderEvent, handler: EventHandler) {
        self.handlers().entry(event).or_default().push(handler);
    }
}
