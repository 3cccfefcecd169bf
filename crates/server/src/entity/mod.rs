//! sea-orm entities for the durable store.

pub mod api_server;
pub mod oauth2_authorization;
pub mod oauth2_token;
pub mod user_account;
