pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod relay;
pub mod retry;
pub mod server;
pub mod sse;
pub mod translate;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use logging::SharedLogger;
pub use server::{build_router, AppState};
