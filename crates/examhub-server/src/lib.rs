pub mod blob;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod mailer;
pub mod response;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
