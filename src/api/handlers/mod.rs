//! API handlers for konto: auth flows, account management, and health.

pub mod auth;
pub mod health;
pub mod root;
pub mod users;
