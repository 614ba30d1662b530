use sb_api_types::WalletAddress;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::{Capabilities, ConnectOpts, ProviderError, WalletProvider};

/// Global under which compatible extensions inject themselves.
pub const PROVIDER_GLOBAL: &str = "solana";

/// Read-only view of the host's global namespace.
pub trait HostEnvironment: Send + Sync {
    fn global(&self, name: &str) -> Option<Arc<dyn WalletProvider>>;
}

/// Host whose globals are fixed at construction.
#[derive(Default, Clone)]
pub struct StaticHost {
    globals: HashMap<String, Arc<dyn WalletProvider>>,
}

impl StaticHost {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_global(mut self, name: &str, provider: Arc<dyn WalletProvider>) -> Self {
        self.globals.insert(name.to_owned(), provider);
        self
    }
}

impl HostEnvironment for StaticHost {
    fn global(&self, name: &str) -> Option<Arc<dyn WalletProvider>> {
        self.globals.get(name).cloned()
    }
}

#[derive(Clone)]
pub struct ProviderHandle {
    provider: Arc<dyn WalletProvider>,
    capabilities: Capabilities,
}

impl ProviderHandle {
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn is_connected(&self) -> bool {
        self.provider.is_connected()
    }

    pub fn public_key(&self) -> Option<WalletAddress> {
        self.provider.public_key()
    }

    pub fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.provider
    }

    pub async fn connect(&self, opts: ConnectOpts) -> Result<WalletAddress, ProviderError> {
        self.provider.connect(opts).await
    }

    pub async fn disconnect(&self) -> Result<(), ProviderError> {
        self.provider.disconnect().await
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("capabilities", &self.capabilities)
            .field("connected", &self.is_connected())
            .field("public_key", &self.public_key())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Provider {
    Absent,
    Present(ProviderHandle),
}

impl Provider {
    pub fn is_present(&self) -> bool {
        matches!(self, Provider::Present(_))
    }

    pub fn handle(&self) -> Option<&ProviderHandle> {
        match self {
            Provider::Present(handle) => Some(handle),
            Provider::Absent => None,
        }
    }
}

/// Probes the host once for a compatible wallet. Absence is a normal outcome.
pub fn locate(host: &dyn HostEnvironment) -> Provider {
    let Some(candidate) = host.global(PROVIDER_GLOBAL) else {
        info!("no `{}` global injected; wallet provider absent", PROVIDER_GLOBAL);
        return Provider::Absent;
    };

    if !candidate.is_phantom() {
        info!("`{}` global lacks the wallet marker flag; ignoring it", PROVIDER_GLOBAL);
        return Provider::Absent;
    }

    let capabilities = candidate.capabilities();
    if !capabilities.covers_session() {
        info!(
            "`{}` global is missing required methods ({:?}); ignoring it",
            PROVIDER_GLOBAL, capabilities
        );
        return Provider::Absent;
    }

    info!("wallet provider located with {:?}", capabilities);
    Provider::Present(ProviderHandle {
        provider: candidate,
        capabilities,
    })
}
