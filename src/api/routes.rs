use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/wallets", web::post().to(handlers::create_wallet))
            .route("/wallets/restore", web::post().to(handlers::restore_wallet))
            .route("/wallets/{address}/send", web::post().to(handlers::send_money))
            .route("/wallets/{address}/balance", web::get().to(handlers::get_wallet_balance))
            .route("/wallets/{address}/history", web::get().to(handlers::get_wallet_history))
            .route("/wallets/{address}/backup", web::get().to(handlers::backup_wallet))
            .route("/balances/{address}", web::get().to(handlers::get_balance))
            .route("/accounts", web::get().to(handlers::get_all_accounts))
    );
}
