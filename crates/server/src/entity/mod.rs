//! SeaORM entities backing the client registry and the code/token ledgers.

pub mod oauth2_authorization;
pub mod oauth2_client;
pub mod oauth2_token;
pub mod oauth2_user;
