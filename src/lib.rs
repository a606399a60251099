pub mod chats;
pub mod db;
pub mod error;
pub mod session;
pub mod users;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::chats::registry::ConnectionRegistry;

pub use error::{AppResult, ChatError};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub registry: ConnectionRegistry,
}
