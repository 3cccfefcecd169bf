//! Federated identity and token issuance for a microservice mesh.
//!
//! Human users (signup, signin, signout) and backend services (`apiauth`) both
//! authenticate through one authorization-code + PKCE grant and end up holding a
//! signed, role-scoped access JWT plus a rotating refresh artifact.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod model;
pub mod services;
pub mod store;
pub mod ticket;
