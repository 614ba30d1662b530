use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sb_api_types::{ConfirmationStatus, TransferRecord, TxSignature, WalletAddress};
use sb_chain_client::{GatewayError, LedgerGateway};
use sb_chain_solana::{SolanaRpcConfig, SolanaRpcGateway, transaction};
use sb_crypto::{GeneratedAccount, Signer};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Minimal stand-in for a Solana RPC node.
struct StubNode {
    balance: u64,
    faucet_status: Option<StatusCode>,
    /// Status polls answered with `null` before the signature shows up as confirmed.
    polls_before_confirmed: Option<u64>,
    /// Answer `sendTransaction` with a preflight failure.
    reject_send: bool,
    /// Report the signature as landed but failed on chain.
    failed_on_chain: bool,
    polls: AtomicU64,
    block_height: AtomicU64,
    last_valid_block_height: AtomicU64,
    /// How far `lastValidBlockHeight` advances after each blockhash request.
    window_step: u64,
    blockhash_requests: AtomicU64,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl StubNode {
    fn new() -> Self {
        Self {
            balance: 2_000_000_000,
            faucet_status: None,
            polls_before_confirmed: Some(1),
            reject_send: false,
            failed_on_chain: false,
            polls: AtomicU64::new(0),
            block_height: AtomicU64::new(95),
            last_valid_block_height: AtomicU64::new(100),
            window_step: 0,
            blockhash_requests: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }
}

fn ok(id: &Value, result: Value) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })),
    )
}

fn with_context(id: &Value, value: Value) -> (StatusCode, Json<Value>) {
    ok(id, json!({ "context": { "slot": 1 }, "value": value }))
}

async fn handle(State(node): State<Arc<StubNode>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let id = body["id"].clone();
    match body["method"].as_str().unwrap_or_default() {
        "getBalance" => with_context(&id, json!(node.balance)),
        "requestAirdrop" => match node.faucet_status {
            Some(status) => (
                status,
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": 429, "message": "airdrop limit reached" }
                })),
            ),
            None => ok(&id, json!(bs58::encode([7_u8; 64]).into_string())),
        },
        "getLatestBlockhash" => {
            node.blockhash_requests.fetch_add(1, Ordering::SeqCst);
            let last_valid = node
                .last_valid_block_height
                .fetch_add(node.window_step, Ordering::SeqCst);
            with_context(
                &id,
                json!({
                    "blockhash": bs58::encode([3_u8; 32]).into_string(),
                    "lastValidBlockHeight": last_valid,
                }),
            )
        }
        "getBlockHeight" => ok(&id, json!(node.block_height.fetch_add(1, Ordering::SeqCst))),
        "getSignatureStatuses" => {
            let polls = node.polls.fetch_add(1, Ordering::SeqCst);
            let confirmed = node
                .polls_before_confirmed
                .is_some_and(|threshold| polls >= threshold);
            if node.failed_on_chain {
                with_context(
                    &id,
                    json!([{ "slot": 9, "confirmations": 0, "err": { "InstructionError": [0, { "Custom": 1 }] }, "confirmationStatus": "processed" }]),
                )
            } else if confirmed {
                with_context(
                    &id,
                    json!([{ "slot": 9, "confirmations": 1, "err": null, "confirmationStatus": "confirmed" }]),
                )
            } else {
                with_context(&id, json!([null]))
            }
        }
        "sendTransaction" if node.reject_send => (
            StatusCode::OK,
            Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": -32002,
                    "message": "Transaction simulation failed: Attempt to debit an account but found no record of a prior credit."
                }
            })),
        ),
        "sendTransaction" => {
            let encoded = body["params"][0].as_str().unwrap_or_default();
            let wire = STANDARD.decode(encoded).unwrap_or_default();
            let signature = transaction::split_wire_transaction(&wire)
                .map(|(signatures, _)| bs58::encode(&signatures[0]).into_string())
                .unwrap_or_default();
            node.sent.lock().unwrap().push(wire);
            ok(&id, json!(signature))
        }
        other => (
            StatusCode::OK,
            Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("method not found: {other}") }
            })),
        ),
    }
}

async fn spawn_node(node: Arc<StubNode>) -> anyhow::Result<SolanaRpcGateway> {
    let app = Router::new().route("/", post(handle)).with_state(node);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let config = SolanaRpcConfig {
        endpoint: format!("http://{addr}"),
        poll_interval: Duration::from_millis(5),
        request_timeout: Duration::from_secs(5),
        ..SolanaRpcConfig::default()
    };
    Ok(SolanaRpcGateway::new(config)?)
}

fn wallet(byte: u8) -> WalletAddress {
    WalletAddress::from_public_key(&[byte; 32])
}

#[tokio::test]
async fn balance_is_read_from_context_value() -> anyhow::Result<()> {
    let gateway = spawn_node(Arc::new(StubNode::new())).await?;
    assert_eq!(gateway.get_balance(&wallet(1)).await?, 2_000_000_000);
    Ok(())
}

#[tokio::test]
async fn airdrop_then_confirmation() -> anyhow::Result<()> {
    let gateway = spawn_node(Arc::new(StubNode::new())).await?;

    let request_id = gateway.request_funds(&wallet(1), 2_000_000_000).await?;
    assert!(!request_id.is_empty());

    let status = gateway.await_confirmation(&request_id).await?;
    assert_eq!(status, ConfirmationStatus::Confirmed);
    Ok(())
}

#[tokio::test]
async fn rate_limited_faucet_is_reported_as_unavailable() -> anyhow::Result<()> {
    for status in [StatusCode::TOO_MANY_REQUESTS, StatusCode::OK] {
        let mut node = StubNode::new();
        node.faucet_status = Some(status);
        let gateway = spawn_node(Arc::new(node)).await?;

        let err = gateway.request_funds(&wallet(1), 1).await.unwrap_err();
        assert!(
            matches!(err, GatewayError::FaucetUnavailable(_)),
            "unexpected error for {status}: {err}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn confirmation_polling_stops_when_the_window_lapses() -> anyhow::Result<()> {
    let mut node = StubNode::new();
    node.polls_before_confirmed = None;
    let node = Arc::new(node);
    let gateway = spawn_node(node.clone()).await?;

    let status = tokio::time::timeout(
        Duration::from_secs(5),
        gateway.await_confirmation(&TxSignature(bs58::encode([7_u8; 64]).into_string())),
    )
    .await?;

    assert_eq!(status?, ConfirmationStatus::Expired);
    // heights 95..=101 are observed; 101 is the first past the window
    assert_eq!(node.block_height.load(Ordering::SeqCst), 102);
    Ok(())
}

#[tokio::test]
async fn transfer_is_signed_by_the_generated_account() -> anyhow::Result<()> {
    let node = Arc::new(StubNode::new());
    let gateway = spawn_node(node.clone()).await?;

    let account = GeneratedAccount::generate();
    let destination = wallet(9);
    let record = TransferRecord::new(account.address(), destination.clone(), 2_000_000_000);

    let signature = gateway.submit_transfer(&record, &account).await?;
    assert!(!signature.is_empty());

    let sent = node.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let (signatures, message) = transaction::split_wire_transaction(&sent[0]).unwrap();
    assert_eq!(signatures.len(), 1);
    sb_crypto::verify(&account.address(), message, &signatures[0])?;
    assert_eq!(signature, TxSignature::from_bytes(&signatures[0]));

    let expected = transaction::transfer_message(
        &account.public_key_bytes(),
        &destination.to_public_key()?,
        2_000_000_000,
        &[3_u8; 32],
    );
    assert_eq!(message, expected.as_slice());
    Ok(())
}

#[tokio::test]
async fn transfer_with_foreign_signer_never_reaches_the_node() -> anyhow::Result<()> {
    let node = Arc::new(StubNode::new());
    let gateway = spawn_node(node.clone()).await?;

    let owner = GeneratedAccount::generate();
    let other = GeneratedAccount::generate();
    let record = TransferRecord::new(owner.address(), wallet(9), 10);

    let err = gateway.submit_transfer(&record, &other).await.unwrap_err();
    assert!(matches!(err, GatewayError::Submission(_)));
    assert!(node.sent.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn rejected_send_is_a_submission_error() -> anyhow::Result<()> {
    let mut node = StubNode::new();
    node.reject_send = true;
    let node = Arc::new(node);
    let gateway = spawn_node(node.clone()).await?;

    let account = GeneratedAccount::generate();
    let record = TransferRecord::new(account.address(), wallet(9), 2_000_000_000);

    let err = gateway.submit_transfer(&record, &account).await.unwrap_err();
    match err {
        GatewayError::Submission(message) => assert!(message.contains("-32002"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(node.polls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn transfer_outliving_its_blockhash_expires() -> anyhow::Result<()> {
    let mut node = StubNode::new();
    node.polls_before_confirmed = None;
    let node = Arc::new(node);
    let gateway = spawn_node(node.clone()).await?;

    let account = GeneratedAccount::generate();
    let record = TransferRecord::new(account.address(), wallet(9), 2_000_000_000);

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        gateway.submit_transfer(&record, &account),
    )
    .await?
    .unwrap_err();

    let signature = match err {
        GatewayError::ConfirmationExpired(signature) => signature,
        other => panic!("unexpected error: {other}"),
    };
    let sent = node.sent.lock().unwrap().clone();
    let (signatures, _) = transaction::split_wire_transaction(&sent[0]).unwrap();
    assert_eq!(signature, TxSignature::from_bytes(&signatures[0]));
    Ok(())
}

#[tokio::test]
async fn on_chain_failure_is_a_submission_error() -> anyhow::Result<()> {
    let mut node = StubNode::new();
    node.failed_on_chain = true;
    let gateway = spawn_node(Arc::new(node)).await?;

    let account = GeneratedAccount::generate();
    let record = TransferRecord::new(account.address(), wallet(9), 2_000_000_000);

    let err = gateway.submit_transfer(&record, &account).await.unwrap_err();
    match err {
        GatewayError::Submission(message) => assert!(message.contains("InstructionError"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn airdrop_expiry_uses_the_window_from_before_the_request() -> anyhow::Result<()> {
    let mut node = StubNode::new();
    node.polls_before_confirmed = None;
    node.window_step = 50;
    let node = Arc::new(node);
    let gateway = spawn_node(node.clone()).await?;

    let request_id = gateway.request_funds(&wallet(1), 1).await?;
    let status = tokio::time::timeout(
        Duration::from_secs(5),
        gateway.await_confirmation(&request_id),
    )
    .await??;

    assert_eq!(status, ConfirmationStatus::Expired);
    assert_eq!(node.blockhash_requests.load(Ordering::SeqCst), 1);
    // the first window ends at 100; a later one would run to 150
    assert_eq!(node.block_height.load(Ordering::SeqCst), 102);
    Ok(())
}
