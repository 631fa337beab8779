pub mod activities;
pub mod answers;
pub mod comments;
pub mod database;
pub mod error;
pub mod otps;
pub mod questions;
pub mod reset_tokens;
pub mod resources;
pub mod row_helpers;
pub mod schema;
pub mod scope;
pub mod sessions;
pub mod solve;
pub mod stories;
pub mod subjects;
pub mod uploads;
pub mod users;
pub mod votes;

#[cfg(test)]
mod test_support;

pub use database::Database;
pub use error::StoreError;
pub use votes::Toggle;
