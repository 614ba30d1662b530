use sb_api_types::ErrorKind;
use sb_chain_client::GatewayError;
use sb_wallet_provider::ProviderError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no wallet provider found; install a compatible wallet extension")]
    ProviderAbsent,
    #[error("wallet request rejected: {0}")]
    UserRejected(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("faucet unavailable: {0}")]
    FaucetUnavailable(String),
    #[error("confirmation window expired for {0}")]
    ConfirmationExpired(String),
    #[error("transfer submission failed: {0}")]
    Submission(String),
    #[error("action not allowed: {0}")]
    InvalidAction(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::ProviderAbsent => ErrorKind::ProviderAbsent,
            SessionError::UserRejected(_) => ErrorKind::UserRejected,
            SessionError::Network(_) => ErrorKind::NetworkError,
            SessionError::FaucetUnavailable(_) => ErrorKind::FaucetUnavailable,
            SessionError::ConfirmationExpired(_) => ErrorKind::ConfirmationExpired,
            SessionError::Submission(_) => ErrorKind::SubmissionError,
            SessionError::InvalidAction(_) => ErrorKind::InvalidAction,
        }
    }
}

impl From<GatewayError> for SessionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Network(message) => SessionError::Network(message),
            GatewayError::FaucetUnavailable(message) => SessionError::FaucetUnavailable(message),
            GatewayError::ConfirmationExpired(signature) => {
                SessionError::ConfirmationExpired(signature.0)
            }
            GatewayError::Submission(message) => SessionError::Submission(message),
            GatewayError::InvalidResponse(message) => {
                SessionError::Network(format!("unexpected ledger response: {message}"))
            }
        }
    }
}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UserRejected(message) => SessionError::UserRejected(message),
            ProviderError::Unsupported(method) => {
                SessionError::InvalidAction(format!("wallet does not support {method}"))
            }
            other => SessionError::UserRejected(other.to_string()),
        }
    }
}

/// Applies the caller-side deadline the gateway contract asks for.
pub(crate) async fn timed<T>(
    limit: Duration,
    operation: &str,
    fut: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, SessionError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(SessionError::from),
        Err(_) => Err(SessionError::Network(format!(
            "{operation} timed out after {limit:?}"
        ))),
    }
}
