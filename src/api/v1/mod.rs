//! API Version 1 endpoints

pub mod channel;
pub mod login;
pub mod routes;
pub mod subscriptions;
pub mod user;
pub mod video;
