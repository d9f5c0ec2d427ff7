use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use edu_ledger::api::{self, ApiState};
use edu_ledger::ledger::{self, AppConfig, Ledger};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_pending_transactions,
        api::handlers::create_wallet,
        api::handlers::send_money,
        api::handlers::get_wallet_balance,
        api::handlers::get_wallet_history,
        api::handlers::backup_wallet,
        api::handlers::restore_wallet,
        api::handlers::mine_block,
        api::handlers::get_balance,
        api::handlers::get_all_accounts
    ),
    components(
        schemas(
            ledger::Block,
            ledger::Transaction,
            ledger::MinedBlock,
            ledger::WalletBackup,
            ledger::crypto::Address,
            ledger::crypto::DigitalSignature,
            ledger::account::Account,
            api::handlers::ChainResponse,
            api::handlers::WalletResponse,
            api::handlers::SendRequest,
            api::handlers::SendResponse,
            api::handlers::MineRequest,
            api::handlers::MineResponse,
            api::handlers::BalanceResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger API endpoints")
    ),
    info(
        title = "Educational Ledger API",
        version = "0.1.0",
        description = "Signed transfers sealed one per block by proof of work",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::load().context("loading configuration")?;
    let ledger = Ledger::with_config(config.ledger.clone()).context("creating ledger")?;
    info!(
        "Ledger ready at difficulty {} with mining reward {}",
        ledger.difficulty(),
        ledger.config().mining_reward
    );

    let state = web::Data::new(ApiState::new(ledger));
    let bind = (config.server.host.clone(), config.server.port);

    info!("Starting HTTP server at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind(bind)
    .context("binding HTTP listener")?
    .run()
    .await
    .context("running HTTP server")
}
