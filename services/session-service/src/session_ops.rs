use axum::{Json, extract::State};
use sb_api_types::{
    AccountBalanceResponse, AccountFundResponse, SessionSnapshot, TransferResponse,
    WalletAddress, WalletConnectResponse, lamports_to_sol,
};
use sb_session_core::{FundingReport, Session, SessionError};

use crate::{ApiError, ApiResult, AppState, session_error};

/// Current session view. Applies pending wallet-side notices first when the
/// session is idle; otherwise serves the last published snapshot.
pub(crate) async fn session_snapshot(State(state): State<AppState>) -> Json<SessionSnapshot> {
    if let Ok(mut session) = state.acquire() {
        session.sync_provider();
        return Json(session.snapshot());
    }
    Json(state.latest_snapshot())
}

pub(crate) async fn wallet_connect(State(state): State<AppState>) -> ApiResult<WalletConnectResponse> {
    let mut session = state.acquire()?;
    let wallet_address = session.connect_wallet().await.map_err(session_error)?;

    Ok(Json(WalletConnectResponse {
        wallet_address,
        state: session.state(),
    }))
}

pub(crate) async fn wallet_disconnect(State(state): State<AppState>) -> ApiResult<SessionSnapshot> {
    let mut session = state.acquire()?;
    session.disconnect_wallet().await.map_err(session_error)?;
    Ok(Json(session.snapshot()))
}

pub(crate) async fn account_create(State(state): State<AppState>) -> ApiResult<AccountFundResponse> {
    let mut session = state.acquire()?;
    let report = session.create_account().await.map_err(session_error)?;
    fund_response(&session, report)
}

pub(crate) async fn account_fund(State(state): State<AppState>) -> ApiResult<AccountFundResponse> {
    let mut session = state.acquire()?;
    let report = session.fund_account().await.map_err(session_error)?;
    fund_response(&session, report)
}

pub(crate) async fn account_balance(State(state): State<AppState>) -> ApiResult<AccountBalanceResponse> {
    let mut session = state.acquire()?;
    let balance = session.refresh_balance().await.map_err(session_error)?;

    Ok(Json(AccountBalanceResponse {
        account_address: generated_account(&session)?,
        balance_lamports: balance,
        balance_sol: lamports_to_sol(balance),
    }))
}

pub(crate) async fn transfer(State(state): State<AppState>) -> ApiResult<TransferResponse> {
    let mut session = state.acquire()?;
    let record = session.transfer_to_wallet().await.map_err(session_error)?;

    Ok(Json(TransferResponse {
        transfer: record,
        state: session.state(),
    }))
}

fn fund_response(session: &Session, report: FundingReport) -> ApiResult<AccountFundResponse> {
    Ok(Json(AccountFundResponse {
        account_address: generated_account(session)?,
        request_id: report.request_id,
        balance_lamports: report.balance,
        balance_sol: lamports_to_sol(report.balance),
        state: session.state(),
    }))
}

fn generated_account(session: &Session) -> Result<WalletAddress, ApiError> {
    session
        .account_address()
        .ok_or_else(|| session_error(SessionError::InvalidAction("no generated account".to_owned())))
}
