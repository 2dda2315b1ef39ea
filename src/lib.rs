pub mod core;
pub mod metrics;
pub mod scheduling;
pub mod server;

pub use crate::core::config::AppConfig;
pub use crate::core::shared::state::AppState;
pub use crate::server::{build_router, run_server};
