use sb_api_types::{
    ActionError, SessionSnapshot, SessionState, TransferRecord, WalletAddress, lamports_to_sol,
};
use sb_chain_client::LedgerGateway;
use sb_crypto::{GeneratedAccount, Signer};
use sb_wallet_provider::{
    HostEnvironment, Provider, ProviderEvent, ProviderHandle, ProviderNotice, locate,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, timed};
use crate::funding::{self, FundingReport};
use crate::transfer;

/// Owns everything one user session knows: the located provider, the
/// connected wallet reference, and the generated account.
///
/// Actions take `&mut self`, so at most one workflow runs per session. A
/// failed action never changes state; it only updates `last_error`.
pub struct Session {
    provider: Provider,
    gateway: Arc<dyn LedgerGateway>,
    config: SessionConfig,
    wallet: Option<WalletAddress>,
    account: Option<GeneratedAccount>,
    account_balance: Option<u64>,
    funded: bool,
    last_transfer: Option<TransferRecord>,
    last_error: Option<ActionError>,
    notices: Option<mpsc::UnboundedReceiver<ProviderNotice>>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl Session {
    /// Probes `host` once and builds the session around whatever it finds.
    pub fn start(
        host: &dyn HostEnvironment,
        gateway: Arc<dyn LedgerGateway>,
        config: SessionConfig,
    ) -> Self {
        Self::new(locate(host), gateway, config)
    }

    pub fn new(provider: Provider, gateway: Arc<dyn LedgerGateway>, config: SessionConfig) -> Self {
        let notices = provider.handle().map(|handle| {
            let (tx, rx) = mpsc::unbounded_channel();
            for event in [ProviderEvent::Disconnect, ProviderEvent::AccountChanged] {
                let tx = tx.clone();
                handle.provider().on(
                    event,
                    Arc::new(move |notice: &ProviderNotice| {
                        let _ = tx.send(notice.clone());
                    }),
                );
            }
            rx
        });

        let (snapshots, _) = watch::channel(SessionSnapshot::empty(provider.is_present()));
        info!(
            "session started against {} (provider present: {})",
            gateway.endpoint(),
            provider.is_present()
        );

        Self {
            provider,
            gateway,
            config,
            wallet: None,
            account: None,
            account_balance: None,
            funded: false,
            last_transfer: None,
            last_error: None,
            notices,
            snapshots,
        }
    }

    pub fn wallet(&self) -> Option<&WalletAddress> {
        self.wallet.as_ref()
    }

    pub fn account_address(&self) -> Option<WalletAddress> {
        self.account.as_ref().map(|account| account.address())
    }

    pub fn state(&self) -> SessionState {
        if !self.provider.is_present() {
            return SessionState::NoProvider;
        }
        match (&self.account, self.funded, &self.wallet, &self.last_transfer) {
            (Some(_), true, Some(_), Some(_)) => SessionState::TransferComplete,
            (Some(_), true, _, _) => SessionState::AccountFunded,
            (Some(_), false, _, _) => SessionState::AccountGenerated,
            (None, _, Some(_), _) => SessionState::WalletConnected,
            (None, _, None, _) => SessionState::ProviderReady,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            provider_present: self.provider.is_present(),
            wallet_address: self.wallet.clone(),
            account_address: self.account_address(),
            account_balance: self.account_balance,
            funded: self.funded,
            last_transfer: self.last_transfer.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Receives a fresh snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    /// Applies disconnects and account switches the user made in the wallet itself.
    pub fn sync_provider(&mut self) {
        if self.apply_notices(false) {
            self.publish();
        }
    }

    /// Drains queued provider notices into the wallet reference. With
    /// `after_own_call` set, connect and disconnect notices are dropped since
    /// the session's own call already accounted for them; account switches
    /// still apply.
    fn apply_notices(&mut self, after_own_call: bool) -> bool {
        let Some(notices) = self.notices.as_mut() else {
            return false;
        };

        let mut changed = false;
        while let Ok(notice) = notices.try_recv() {
            match notice {
                ProviderNotice::Connected(_) | ProviderNotice::Disconnected if after_own_call => {}
                ProviderNotice::Disconnected | ProviderNotice::AccountChanged(None) => {
                    if self.wallet.take().is_some() {
                        info!("wallet disconnected from the provider side");
                        changed = true;
                    }
                }
                ProviderNotice::AccountChanged(Some(address)) => {
                    if self.wallet.is_some() && self.wallet.as_ref() != Some(&address) {
                        info!("wallet account changed to {}", address);
                        self.wallet = Some(address);
                        changed = true;
                    }
                }
                ProviderNotice::Connected(_) => {}
            }
        }
        changed
    }

    fn handle(&self) -> Result<ProviderHandle, SessionError> {
        self.provider
            .handle()
            .cloned()
            .ok_or(SessionError::ProviderAbsent)
    }

    fn settle<T>(&mut self, action: &str, outcome: Result<T, SessionError>) -> Result<T, SessionError> {
        match &outcome {
            Ok(_) => self.last_error = None,
            Err(err) => {
                warn!("{} failed ({}): {}", action, err.kind(), err);
                self.last_error = Some(ActionError {
                    action: action.to_owned(),
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
        self.publish();
        outcome
    }

    pub async fn connect_wallet(&mut self) -> Result<WalletAddress, SessionError> {
        let outcome = self.run_connect().await;
        self.settle("connect_wallet", outcome)
    }

    async fn run_connect(&mut self) -> Result<WalletAddress, SessionError> {
        let handle = self.handle()?;
        self.apply_notices(false);

        let address = handle.connect(self.config.connect_opts).await?;
        info!("wallet account {}", address);
        self.wallet = Some(address.clone());
        self.apply_notices(true);

        Ok(self.wallet.clone().unwrap_or(address))
    }

    pub async fn disconnect_wallet(&mut self) -> Result<(), SessionError> {
        let outcome = self.run_disconnect().await;
        self.settle("disconnect_wallet", outcome)
    }

    async fn run_disconnect(&mut self) -> Result<(), SessionError> {
        let handle = self.handle()?;
        self.apply_notices(false);
        if self.wallet.is_none() {
            return Err(SessionError::InvalidAction("wallet is not connected".to_owned()));
        }

        handle.disconnect().await?;
        if let Some(address) = self.wallet.take() {
            info!("disconnected wallet {}", address);
        }
        self.apply_notices(true);
        Ok(())
    }

    /// Generates the session's account and immediately funds it. A funding
    /// failure is returned but the account stays, generated and unfunded.
    pub async fn create_account(&mut self) -> Result<FundingReport, SessionError> {
        let outcome = self.run_create().await;
        self.settle("create_account", outcome)
    }

    async fn run_create(&mut self) -> Result<FundingReport, SessionError> {
        self.handle()?;
        self.apply_notices(false);
        if let Some(existing) = self.account_address() {
            return Err(SessionError::InvalidAction(format!(
                "account {existing} already generated for this session"
            )));
        }

        let account = GeneratedAccount::generate();
        info!("generated account {}", account.address());
        self.account = Some(account);
        self.account_balance = None;
        self.funded = false;
        self.publish();

        self.run_funding().await
    }

    /// Requests another faucet credit for the generated account.
    pub async fn fund_account(&mut self) -> Result<FundingReport, SessionError> {
        let outcome = self.run_fund().await;
        self.settle("fund_account", outcome)
    }

    async fn run_fund(&mut self) -> Result<FundingReport, SessionError> {
        self.handle()?;
        self.apply_notices(false);
        self.run_funding().await
    }

    async fn run_funding(&mut self) -> Result<FundingReport, SessionError> {
        let address = self
            .account_address()
            .ok_or_else(|| SessionError::InvalidAction("no generated account".to_owned()))?;

        let report = funding::fund_account(self.gateway.as_ref(), &address, &self.config).await?;
        self.funded = true;
        self.account_balance = Some(report.balance);
        Ok(report)
    }

    pub async fn transfer_to_wallet(&mut self) -> Result<TransferRecord, SessionError> {
        let outcome = self.run_transfer().await;
        self.settle("transfer_to_wallet", outcome)
    }

    async fn run_transfer(&mut self) -> Result<TransferRecord, SessionError> {
        let handle = self.handle()?;
        self.apply_notices(false);
        if self.account.is_none() {
            return Err(SessionError::InvalidAction("no generated account".to_owned()));
        }
        if !self.funded {
            return Err(SessionError::InvalidAction(
                "generated account has not been funded".to_owned(),
            ));
        }

        let destination = transfer::confirm_destination(&handle, self.config.connect_opts).await?;
        self.wallet = Some(destination.clone());
        self.apply_notices(true);
        self.publish();

        let Some(account) = self.account.as_ref() else {
            return Err(SessionError::InvalidAction("no generated account".to_owned()));
        };
        let record =
            transfer::submit(self.gateway.as_ref(), account, &destination, &self.config).await?;
        let source = record.source.clone();
        self.last_transfer = Some(record.clone());

        match timed(
            self.config.rpc_timeout,
            "getBalance",
            self.gateway.get_balance(&source),
        )
        .await
        {
            Ok(balance) => {
                info!("generated account balance after transfer: {} SOL", lamports_to_sol(balance));
                self.account_balance = Some(balance);
            }
            Err(err) => warn!("could not refresh balance after transfer: {}", err),
        }

        Ok(record)
    }

    /// Re-reads the generated account's balance.
    pub async fn refresh_balance(&mut self) -> Result<u64, SessionError> {
        let outcome = self.run_refresh().await;
        self.settle("refresh_balance", outcome)
    }

    async fn run_refresh(&mut self) -> Result<u64, SessionError> {
        self.handle()?;
        self.apply_notices(false);
        let address = self
            .account_address()
            .ok_or_else(|| SessionError::InvalidAction("no generated account".to_owned()))?;

        let balance = timed(
            self.config.rpc_timeout,
            "getBalance",
            self.gateway.get_balance(&address),
        )
        .await?;
        info!("generated wallet balance: {} SOL", lamports_to_sol(balance));
        self.account_balance = Some(balance);
        Ok(balance)
    }
}
