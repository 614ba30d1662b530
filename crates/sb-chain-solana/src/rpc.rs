use sb_api_types::Commitment;
use sb_chain_client::GatewayError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ── JSON-RPC 2.0 envelope ────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorObject {
    pub(crate) code: i64,
    pub(crate) message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WithContext<T> {
    pub(crate) value: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LatestBlockhash {
    pub(crate) blockhash: String,
    pub(crate) last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignatureStatus {
    pub(crate) confirmations: Option<u64>,
    pub(crate) err: Option<serde_json::Value>,
    pub(crate) confirmation_status: Option<Commitment>,
}

impl SignatureStatus {
    /// Nodes report `confirmations: null` without a level once a slot is rooted.
    pub(crate) fn level(&self) -> Option<Commitment> {
        self.confirmation_status
            .or_else(|| self.confirmations.is_none().then_some(Commitment::Finalized))
    }
}

/// Why a single RPC call failed, before the caller maps it onto its own
/// [`GatewayError`] variant.
#[derive(Debug)]
pub(crate) enum RpcFailure {
    Transport(String),
    Rejected { code: i64, message: String },
    Decode(String),
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcFailure::Transport(message) => write!(f, "transport: {message}"),
            RpcFailure::Rejected { code, message } => write!(f, "rpc error {code}: {message}"),
            RpcFailure::Decode(message) => write!(f, "decode: {message}"),
        }
    }
}

impl RpcFailure {
    /// Default mapping; operations with a dedicated error kind override `Rejected`.
    pub(crate) fn into_gateway(self, method: &str) -> GatewayError {
        match self {
            RpcFailure::Transport(message) => GatewayError::Network(format!("{method}: {message}")),
            RpcFailure::Rejected { code, message } => {
                GatewayError::InvalidResponse(format!("{method}: rpc error {code}: {message}"))
            }
            RpcFailure::Decode(message) => {
                GatewayError::InvalidResponse(format!("{method}: {message}"))
            }
        }
    }
}

pub(crate) struct RpcClient {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub(crate) fn new(endpoint: String, http: reqwest::Client) -> Self {
        Self {
            endpoint,
            http,
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcFailure> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| RpcFailure::Transport(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| RpcFailure::Transport(err.to_string()))?;

        let parsed = serde_json::from_str::<RpcResponse<T>>(&text);

        if !status.is_success() {
            // Rate limiters answer with a bare HTTP error, nodes with a JSON-RPC error body.
            if let Ok(RpcResponse {
                error: Some(error), ..
            }) = parsed
            {
                return Err(RpcFailure::Rejected {
                    code: error.code,
                    message: error.message,
                });
            }
            return Err(RpcFailure::Rejected {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        let parsed = parsed.map_err(|err| RpcFailure::Decode(format!("{err}: {text}")))?;

        if let Some(error) = parsed.error {
            return Err(RpcFailure::Rejected {
                code: error.code,
                message: error.message,
            });
        }

        parsed
            .result
            .ok_or_else(|| RpcFailure::Decode(format!("{method} returned no result")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_status_level_falls_back_to_finalized_when_rooted() {
        let rooted: SignatureStatus =
            serde_json::from_str(r#"{"slot":5,"confirmations":null,"err":null,"confirmationStatus":null}"#)
                .unwrap();
        assert_eq!(rooted.level(), Some(Commitment::Finalized));

        let pending: SignatureStatus = serde_json::from_str(
            r#"{"slot":5,"confirmations":0,"err":null,"confirmationStatus":"processed"}"#,
        )
        .unwrap();
        assert_eq!(pending.level(), Some(Commitment::Processed));
    }

    #[test]
    fn error_envelope_parses() {
        let parsed: RpcResponse<u64> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":429,"message":"Too many requests"}}"#,
        )
        .unwrap();
        assert!(parsed.result.is_none());
        assert_eq!(parsed.error.unwrap().code, 429);
    }
}
