// API module
//
// HTTP dispatcher in front of the ledger and the wallets it serves

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use handlers::ApiState;
pub use routes::configure_routes;
