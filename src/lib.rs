pub mod admin;
pub mod bot;
pub mod config;
pub mod error;
pub mod ladder;
pub mod messages;
pub mod metrics;
pub mod predict;
pub mod record;
pub mod router;
pub mod session;
pub mod store;
pub mod telegram;
