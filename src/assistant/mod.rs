pub mod context;
mod dto;
pub mod handlers;
pub mod runtime;

pub use runtime::{AdkClient, AgentRuntime};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::assistant_routes())
}
