use actix_web::{web, HttpResponse, Responder};
use dashmap::DashMap;
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger::account::Account;
use crate::ledger::{
    Address, Block, Ledger, LedgerError, MinedBlock, MiningOutcome, Transaction, Wallet,
    WalletBackup, WalletError,
};

/// Shared state behind every handler: the ledger and the wallets it serves.
///
/// Mining holds the chain lock for its whole nonce search, so every handler
/// that takes that lock runs on `web::block`. Balance reads are lock free.
#[derive(Debug)]
pub struct ApiState {
    pub ledger: Ledger,
    pub wallets: DashMap<Address, Wallet>,
}

impl ApiState {
    pub fn new(ledger: Ledger) -> Self {
        ApiState {
            ledger,
            wallets: DashMap::new(),
        }
    }

    fn wallet(&self, address: &str) -> Option<Wallet> {
        self.wallets
            .get(&Address(address.to_string()))
            .map(|entry| entry.value().clone())
    }
}

pub type ApiData = web::Data<ApiState>;

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

fn wallet_not_found(address: &str) -> HttpResponse {
    HttpResponse::NotFound().json(error_body(format!("Unknown wallet: {}", address)))
}

fn ledger_error_response(err: &LedgerError) -> HttpResponse {
    match err {
        LedgerError::TransactionError(_) => HttpResponse::BadRequest().json(error_body(err.to_string())),
        LedgerError::MiningError(_) => {
            HttpResponse::ServiceUnavailable().json(error_body(err.to_string()))
        }
        _ => {
            error!("Ledger failure: {}", err);
            HttpResponse::InternalServerError().json(error_body(err.to_string()))
        }
    }
}

fn wallet_error_response(err: &WalletError) -> HttpResponse {
    match err {
        WalletError::Ledger(err) => ledger_error_response(err),
        WalletError::Crypto(_) | WalletError::KeyMismatch { .. } => {
            HttpResponse::BadRequest().json(error_body(err.to_string()))
        }
        _ => {
            error!("Wallet failure: {}", err);
            HttpResponse::InternalServerError().json(error_body(err.to_string()))
        }
    }
}

fn blocking_failure() -> HttpResponse {
    HttpResponse::InternalServerError().json(error_body("Worker pool unavailable".to_string()))
}

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// Difficulty required of the next block
    pub difficulty: u32,

    /// Whether the chain is valid
    pub is_valid: bool,

    /// The blocks in the chain
    pub chain: Vec<Block>,
}

/// Get the full chain
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(state: ApiData) -> impl Responder {
    let ledger = state.ledger.clone();

    match web::block(move || ledger.snapshot()).await {
        Ok(snapshot) => HttpResponse::Ok().json(ChainResponse {
            length: snapshot.chain.len(),
            difficulty: snapshot.difficulty,
            is_valid: snapshot.validate().is_ok(),
            chain: snapshot.chain,
        }),
        Err(_) => blocking_failure(),
    }
}

/// Get all pending transactions, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(state: ApiData) -> impl Responder {
    let ledger = state.ledger.clone();

    match web::block(move || ledger.get_pending_transactions()).await {
        Ok(pending) => HttpResponse::Ok().json(pending),
        Err(_) => blocking_failure(),
    }
}

/// Response describing a wallet
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The wallet's address
    pub address: String,

    /// The wallet's balance
    pub balance: u64,
}

/// Create a new wallet
///
/// Generates a key pair held by the server and grants the starting balance
#[utoipa::path(
    post,
    path = "/api/v1/wallets",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_wallet(state: ApiData) -> impl Responder {
    let ledger = state.ledger.clone();

    match web::block(move || Wallet::new(&ledger)).await {
        Ok(Ok(wallet)) => {
            let response = WalletResponse {
                address: wallet.address().0.clone(),
                balance: wallet.balance(),
            };
            state.wallets.insert(wallet.address().clone(), wallet);

            HttpResponse::Created().json(response)
        }
        Ok(Err(err)) => wallet_error_response(&err),
        Err(_) => blocking_failure(),
    }
}

/// Request for the send endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SendRequest {
    /// The amount to transfer
    pub amount: u64,

    /// The recipient's address
    pub payee: String,
}

/// Response for the send endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SendResponse {
    pub message: String,

    /// The signed transaction that was sealed
    pub transaction: Transaction,

    /// The block sealing the transaction
    pub mined: MinedBlock,

    /// Blocks the sender mined first for transfers queued ahead of this one
    pub sealed_before: Vec<MinedBlock>,

    /// Sender balance afterwards
    pub balance: u64,
}

/// Send money from a wallet
///
/// Signs the transfer, submits it, and mines until it is sealed with the sender as miner
#[utoipa::path(
    post,
    path = "/api/v1/wallets/{address}/send",
    request_body = SendRequest,
    params(("address" = String, Path, description = "Sender wallet address")),
    responses(
        (status = 200, description = "Transfer accepted and mined", body = SendResponse),
        (status = 400, description = "Transfer rejected"),
        (status = 404, description = "Unknown wallet"),
        (status = 503, description = "Mining gave up; the transfer stays pending")
    )
)]
pub async fn send_money(
    state: ApiData,
    address: web::Path<String>,
    send_req: web::Json<SendRequest>,
) -> impl Responder {
    let Some(wallet) = state.wallet(&address) else {
        return wallet_not_found(&address);
    };

    let send_req = send_req.into_inner();
    let payee = Address(send_req.payee);
    let sender = wallet.clone();

    match web::block(move || sender.send_money(send_req.amount, &payee)).await {
        Ok(Ok(receipt)) => {
            let message = match receipt.sealed_before.len() {
                0 => format!("Transaction confirmed in block {}", receipt.block_index),
                earlier => format!(
                    "Transaction confirmed in block {} after sealing {} earlier pending transaction(s)",
                    receipt.block_index, earlier
                ),
            };

            HttpResponse::Ok().json(SendResponse {
                message,
                transaction: receipt.transaction,
                mined: receipt.mined,
                sealed_before: receipt.sealed_before,
                balance: wallet.balance(),
            })
        }
        Ok(Err(err)) => wallet_error_response(&err),
        Err(_) => blocking_failure(),
    }
}

/// Get a wallet's balance
#[utoipa::path(
    get,
    path = "/api/v1/wallets/{address}/balance",
    params(("address" = String, Path, description = "Wallet address")),
    responses(
        (status = 200, description = "Wallet balance retrieved successfully", body = WalletResponse),
        (status = 404, description = "Unknown wallet")
    )
)]
pub async fn get_wallet_balance(state: ApiData, address: web::Path<String>) -> impl Responder {
    match state.wallet(&address) {
        Some(wallet) => HttpResponse::Ok().json(WalletResponse {
            address: wallet.address().0.clone(),
            balance: wallet.balance(),
        }),
        None => wallet_not_found(&address),
    }
}

/// Get a wallet's transaction history
#[utoipa::path(
    get,
    path = "/api/v1/wallets/{address}/history",
    params(("address" = String, Path, description = "Wallet address")),
    responses(
        (status = 200, description = "History retrieved successfully", body = Vec<Block>),
        (status = 404, description = "Unknown wallet")
    )
)]
pub async fn get_wallet_history(state: ApiData, address: web::Path<String>) -> impl Responder {
    let Some(wallet) = state.wallet(&address) else {
        return wallet_not_found(&address);
    };

    match web::block(move || wallet.transaction_history()).await {
        Ok(history) => HttpResponse::Ok().json(history),
        Err(_) => blocking_failure(),
    }
}

/// Export a wallet's key material
#[utoipa::path(
    get,
    path = "/api/v1/wallets/{address}/backup",
    params(("address" = String, Path, description = "Wallet address")),
    responses(
        (status = 200, description = "Backup produced", body = WalletBackup),
        (status = 404, description = "Unknown wallet")
    )
)]
pub async fn backup_wallet(state: ApiData, address: web::Path<String>) -> impl Responder {
    match state.wallet(&address) {
        Some(wallet) => HttpResponse::Ok().json(wallet.to_backup()),
        None => wallet_not_found(&address),
    }
}

/// Restore a wallet from key material
///
/// No starting balance is granted to a restored wallet
#[utoipa::path(
    post,
    path = "/api/v1/wallets/restore",
    request_body = WalletBackup,
    responses(
        (status = 201, description = "Wallet restored", body = WalletResponse),
        (status = 400, description = "Invalid key material")
    )
)]
pub async fn restore_wallet(state: ApiData, backup: web::Json<WalletBackup>) -> impl Responder {
    match Wallet::from_backup(&backup, &state.ledger) {
        Ok(wallet) => {
            let response = WalletResponse {
                address: wallet.address().0.clone(),
                balance: wallet.balance(),
            };
            state.wallets.insert(wallet.address().clone(), wallet);

            HttpResponse::Created().json(response)
        }
        Err(err) => wallet_error_response(&err),
    }
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// The miner's address
    pub miner_address: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    pub message: String,

    /// False when nothing was pending
    pub mined: bool,

    /// The newly mined block
    pub block: Option<MinedBlock>,
}

/// Mine the oldest pending transaction
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Mining finished", body = MineResponse),
        (status = 503, description = "Mining gave up")
    )
)]
pub async fn mine_block(state: ApiData, mine_req: web::Json<MineRequest>) -> impl Responder {
    let ledger = state.ledger.clone();
    let miner = Address(mine_req.into_inner().miner_address);

    match web::block(move || ledger.mine_next_block(&miner)).await {
        Ok(Ok(MiningOutcome::Mined(mined))) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Mined".to_string(),
            mined: true,
            block: Some(mined),
        }),
        Ok(Ok(MiningOutcome::NothingToMine)) => HttpResponse::Ok().json(MineResponse {
            message: "No pending transactions".to_string(),
            mined: false,
            block: None,
        }),
        Ok(Err(err)) => ledger_error_response(&err),
        Err(_) => blocking_failure(),
    }
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
}

/// Get the balance of any identity
#[utoipa::path(
    get,
    path = "/api/v1/balances/{address}",
    params(("address" = String, Path, description = "Any ledger identity")),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_balance(state: ApiData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let balance = state.ledger.get_balance(&address);

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance,
    })
}

/// Get all accounts in the balance table
#[utoipa::path(
    get,
    path = "/api/v1/accounts",
    responses(
        (status = 200, description = "Accounts retrieved successfully", body = Vec<Account>)
    )
)]
pub async fn get_all_accounts(state: ApiData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.get_all_accounts())
}
