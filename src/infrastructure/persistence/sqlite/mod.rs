//! SQLite Persistence - 持久会话后端

mod database;
mod session_repo;

pub use database::*;
pub use session_repo::*;
